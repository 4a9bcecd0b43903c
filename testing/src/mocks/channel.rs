//! In-memory order channel.

use seckill_core::providers::{OrderChannel, OrderStream};
use seckill_core::{OrderMessage, Result, SeckillError};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

type Delivery = Result<OrderMessage>;

/// Single-subscriber channel that records everything published.
///
/// Published messages are queued until someone subscribes. Tests can
/// redeliver a message or inject an unreadable one to exercise
/// at-least-once handling.
#[derive(Debug)]
pub struct InMemoryOrderChannel {
    published: Mutex<Vec<OrderMessage>>,
    sender: mpsc::UnboundedSender<Delivery>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Delivery>>>,
    fail_publish: AtomicBool,
}

impl Default for InMemoryOrderChannel {
    fn default() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            published: Mutex::new(Vec::new()),
            sender,
            receiver: Mutex::new(Some(receiver)),
            fail_publish: AtomicBool::new(false),
        }
    }
}

impl InMemoryOrderChannel {
    /// Empty channel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `publish` fail with a `Channel` error.
    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Everything successfully published, in order.
    #[must_use]
    pub fn published(&self) -> Vec<OrderMessage> {
        self.published
            .lock()
            .map(|published| published.clone())
            .unwrap_or_default()
    }

    /// Deliver `message` again without recording a publish.
    pub fn redeliver(&self, message: &OrderMessage) {
        let _ = self.sender.send(Ok(message.clone()));
    }

    /// Deliver a payload that failed to decode.
    pub fn inject_unreadable(&self, detail: &str) {
        let _ = self
            .sender
            .send(Err(SeckillError::Serialization(detail.to_string())));
    }
}

impl OrderChannel for InMemoryOrderChannel {
    fn publish(
        &self,
        message: &OrderMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let message = message.clone();
        Box::pin(async move {
            if self.fail_publish.load(Ordering::SeqCst) {
                return Err(SeckillError::Channel("broker unavailable".to_string()));
            }
            self.published
                .lock()
                .map_err(|_| SeckillError::Channel("channel mutex poisoned".to_string()))?
                .push(message.clone());
            self.sender
                .send(Ok(message))
                .map_err(|e| SeckillError::Channel(format!("channel closed: {e}")))
        })
    }

    fn subscribe(&self) -> Pin<Box<dyn Future<Output = Result<OrderStream>> + Send + '_>> {
        Box::pin(async move {
            let mut receiver = self
                .receiver
                .lock()
                .map_err(|_| SeckillError::Channel("channel mutex poisoned".to_string()))?
                .take()
                .ok_or_else(|| SeckillError::Channel("already subscribed".to_string()))?;

            let stream: OrderStream = Box::pin(async_stream::stream! {
                while let Some(delivery) = receiver.recv().await {
                    yield delivery;
                }
            });
            Ok(stream)
        })
    }
}
