//! Order consumer: the subscribe-process-reconnect loop in front of the
//! materializer.
//!
//! ```text
//! loop {
//!     subscribe ── error ──► wait retry_delay, retry
//!     for each message:
//!         Ok(msg)  → handler.handle(msg)
//!                      retryable error → back off, handle msg again
//!                      other error     → log, continue
//!         Err(e)   → log (undecodable payload), continue
//!     stream ended → wait retry_delay, resubscribe
//! }   // exits on the shutdown broadcast
//! ```
//!
//! A message is never skipped while its failure is retryable: the stream is
//! not polled again until the handler settles it, so a channel that commits
//! on the next poll keeps the message until the store recovers.

use crate::materializer::OrderHandler;
use crate::metrics::MaterializerMetrics;
use crate::retry::RetryPolicy;
use futures::StreamExt;
use seckill_core::OrderMessage;
use seckill_core::providers::{OrderChannel, OrderStream};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Consumes order messages from an [`OrderChannel`].
pub struct OrderConsumer {
    name: String,
    channel: Arc<dyn OrderChannel>,
    handler: Arc<dyn OrderHandler>,
    shutdown: broadcast::Receiver<()>,
    retry_delay: Duration,
    redelivery: RetryPolicy,
}

impl OrderConsumer {
    /// Create a consumer with the default retry delay (5 seconds).
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        channel: Arc<dyn OrderChannel>,
        handler: Arc<dyn OrderHandler>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            name: name.into(),
            channel,
            handler,
            shutdown,
            retry_delay: Duration::from_secs(5),
            redelivery: RetryPolicy::builder()
                .initial_delay(Duration::from_millis(500))
                .max_delay(Duration::from_secs(30))
                .build(),
        }
    }

    /// Set the delay before resubscribing.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the backoff between attempts at a message whose handling failed
    /// with a retryable error. The delay grows from `initial` up to `max`
    /// and the message is retried until it settles or shutdown fires.
    #[must_use]
    pub fn with_redelivery_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.redelivery = RetryPolicy::builder()
            .initial_delay(initial)
            .max_delay(max)
            .build();
        self
    }

    /// Run the loop on a background task.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run until the shutdown signal fires.
    pub async fn run(&mut self) {
        info!(consumer = %self.name, "Order consumer started");

        loop {
            let subscription = tokio::select! {
                _ = self.shutdown.recv() => break,
                subscription = self.channel.subscribe() => subscription,
            };

            match subscription {
                Ok(mut stream) => {
                    info!(consumer = %self.name, "Subscribed to order channel");
                    if self.process_stream(&mut stream).await {
                        break;
                    }
                    warn!(consumer = %self.name, "Order stream ended, resubscribing in {:?}", self.retry_delay);
                }
                Err(e) => {
                    error!(
                        consumer = %self.name,
                        error = %e,
                        "Failed to subscribe, retrying in {:?}",
                        self.retry_delay
                    );
                }
            }

            tokio::select! {
                _ = self.shutdown.recv() => break,
                () = tokio::time::sleep(self.retry_delay) => {}
            }
        }

        info!(consumer = %self.name, "Order consumer stopped");
    }

    /// Returns `true` if shutdown was requested.
    async fn process_stream(&mut self, stream: &mut OrderStream) -> bool {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => return true,
                next = stream.next() => match next {
                    Some(Ok(message)) => {
                        if self.settle(&message).await {
                            return true;
                        }
                    }
                    Some(Err(e)) => {
                        MaterializerMetrics::record_consumer_error();
                        error!(consumer = %self.name, error = %e, "Skipping unreadable order message");
                    }
                    None => return false,
                },
            }
        }
    }

    /// Handle one message until it succeeds or fails for good.
    ///
    /// Returns `true` if shutdown was requested; the message is then left
    /// unacknowledged for the next subscriber.
    async fn settle(&mut self, message: &OrderMessage) -> bool {
        let mut attempt = 0;
        loop {
            match self.handler.handle(message).await {
                Ok(outcome) => {
                    debug!(consumer = %self.name, order_id = %message.order_id, ?outcome, "Order message handled");
                    return false;
                }
                Err(e) if e.is_retryable() => {
                    MaterializerMetrics::record_consumer_error();
                    let delay = self.redelivery.delay_for_attempt(attempt);
                    warn!(
                        consumer = %self.name,
                        order_id = %message.order_id,
                        attempt,
                        error = %e,
                        "Order message not handled, retrying in {delay:?}"
                    );
                    tokio::select! {
                        _ = self.shutdown.recv() => return true,
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => {
                    MaterializerMetrics::record_consumer_error();
                    error!(consumer = %self.name, order_id = %message.order_id, error = %e, "Dropping order message");
                    return false;
                }
            }
        }
    }
}
