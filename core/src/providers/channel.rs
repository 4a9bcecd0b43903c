//! Order message channel.

use crate::error::Result;
use crate::types::OrderMessage;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;

/// Stream of order messages.
///
/// Undecodable payloads surface as `Err(SeckillError::Serialization)` items;
/// the stream itself continues.
pub type OrderStream = Pin<Box<dyn Stream<Item = Result<OrderMessage>> + Send>>;

/// At-least-once transport between the dispatcher and the materializer.
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so it can be held as
/// `Arc<dyn OrderChannel>`.
pub trait OrderChannel: Send + Sync {
    /// Publish one message.
    ///
    /// A successful return means the channel accepted the message; it may
    /// still be delivered more than once.
    ///
    /// # Errors
    ///
    /// Returns `Channel` if the publish fails.
    fn publish(
        &self,
        message: &OrderMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Subscribe to the order stream.
    ///
    /// # Errors
    ///
    /// Returns `Channel` if the subscription cannot be established.
    fn subscribe(&self) -> Pin<Box<dyn Future<Output = Result<OrderStream>> + Send + '_>>;
}
