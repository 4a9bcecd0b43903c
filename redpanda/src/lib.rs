//! Redpanda order channel for the seckill pipeline.
//!
//! Implements [`OrderChannel`] over rdkafka, so it works against Redpanda or
//! any other Kafka-compatible broker.
//!
//! # Delivery Semantics
//!
//! **At-least-once** with manual offset commits:
//! - A message's offset is committed only when the subscriber polls for the
//!   next message, i.e. after it finished handling this one
//! - A crash before the commit redelivers the message, so handlers must be
//!   idempotent (the order materializer is)
//! - Messages are keyed by voucher id, so orders for one voucher stay in one
//!   partition and keep their relative order
//!
//! Payloads are UTF-8 JSON [`OrderMessage`]s. A payload that fails to decode
//! is surfaced as a `Serialization` error item and committed so it is not
//! redelivered forever.
//!
//! # Example
//!
//! ```no_run
//! use futures::StreamExt;
//! use seckill_core::providers::OrderChannel;
//! use seckill_redpanda::RedpandaOrderChannel;
//!
//! # async fn example() -> seckill_core::Result<()> {
//! let channel = RedpandaOrderChannel::builder()
//!     .brokers("localhost:9092")
//!     .topic("seckill.order")
//!     .consumer_group("seckill-order-materializer")
//!     .build()?;
//!
//! let mut orders = channel.subscribe().await?;
//! while let Some(order) = orders.next().await {
//!     println!("{:?}", order?.order_id);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use seckill_core::providers::{OrderChannel, OrderStream};
use seckill_core::{OrderMessage, Result, SeckillError};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Default topic for order messages.
pub const DEFAULT_TOPIC: &str = "seckill.order";

/// Default consumer group for materializers.
pub const DEFAULT_CONSUMER_GROUP: &str = "seckill-order-materializer";

/// Redpanda-backed [`OrderChannel`].
///
/// # Example
///
/// ```no_run
/// use seckill_redpanda::RedpandaOrderChannel;
///
/// # fn example() -> seckill_core::Result<()> {
/// // Defaults: topic `seckill.order`, acks=all, earliest offset reset
/// let channel = RedpandaOrderChannel::new("localhost:9092")?;
///
/// let channel = RedpandaOrderChannel::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .compression("lz4")
///     .timeout(std::time::Duration::from_secs(10))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaOrderChannel {
    producer: FutureProducer,
    brokers: String,
    topic: String,
    timeout: Duration,
    consumer_group: String,
    auto_offset_reset: String,
}

impl RedpandaOrderChannel {
    /// Create a channel with default configuration.
    ///
    /// # Errors
    ///
    /// Returns `Channel` if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self> {
        Self::builder().brokers(brokers).build()
    }

    /// Start configuring a channel.
    #[must_use]
    pub fn builder() -> RedpandaOrderChannelBuilder {
        RedpandaOrderChannelBuilder::default()
    }

    /// Topic orders are published to and consumed from.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Broker list this channel connects to.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    fn create_consumer(&self) -> Result<StreamConsumer> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.consumer_group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| SeckillError::Channel(format!("Failed to create consumer: {e}")))?;

        consumer
            .subscribe(&[self.topic.as_str()])
            .map_err(|e| {
                SeckillError::Channel(format!("Failed to subscribe to {}: {e}", self.topic))
            })?;

        tracing::info!(
            topic = %self.topic,
            consumer_group = %self.consumer_group,
            auto_offset_reset = %self.auto_offset_reset,
            "Subscribed to order topic"
        );
        Ok(consumer)
    }
}

/// Builder for [`RedpandaOrderChannel`].
#[derive(Default)]
pub struct RedpandaOrderChannelBuilder {
    brokers: Option<String>,
    topic: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    auto_offset_reset: Option<String>,
}

impl RedpandaOrderChannelBuilder {
    /// Comma-separated bootstrap servers (required).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Order topic. Default: [`DEFAULT_TOPIC`].
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Producer acks: "0", "1" or "all". Default: "all", since a lost
    /// publish after a successful gate decision loses the order.
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Compression codec: "none", "gzip", "snappy", "lz4", "zstd".
    /// Default: "none".
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Producer send timeout. Default: 5 seconds.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Consumer group shared by every materializer instance.
    /// Default: [`DEFAULT_CONSUMER_GROUP`].
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Where a new consumer group starts reading. Default: "earliest", so
    /// orders published before the first materializer started are not lost.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the channel.
    ///
    /// # Errors
    ///
    /// Returns `Channel` if brokers are not set or the producer cannot be
    /// created.
    pub fn build(self) -> Result<RedpandaOrderChannel> {
        let brokers = self
            .brokers
            .ok_or_else(|| SeckillError::Channel("Brokers not configured".to_string()))?;
        let acks = self.producer_acks.unwrap_or_else(|| "all".to_string());
        let compression = self.compression.unwrap_or_else(|| "none".to_string());
        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", &acks)
            .set("compression.type", &compression)
            .create()
            .map_err(|e| SeckillError::Channel(format!("Failed to create producer: {e}")))?;

        let channel = RedpandaOrderChannel {
            producer,
            brokers,
            topic: self.topic.unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
            timeout,
            consumer_group: self
                .consumer_group
                .unwrap_or_else(|| DEFAULT_CONSUMER_GROUP.to_string()),
            auto_offset_reset: self
                .auto_offset_reset
                .unwrap_or_else(|| "earliest".to_string()),
        };

        tracing::info!(
            brokers = %channel.brokers,
            topic = %channel.topic,
            acks = %acks,
            compression = %compression,
            "RedpandaOrderChannel created"
        );
        Ok(channel)
    }
}

fn decode(message: &BorrowedMessage<'_>) -> Result<OrderMessage> {
    let payload = message
        .payload()
        .ok_or_else(|| SeckillError::Serialization("Message has no payload".to_string()))?;
    OrderMessage::from_json(payload)
}

impl OrderChannel for RedpandaOrderChannel {
    fn publish(
        &self,
        message: &OrderMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let message = message.clone();

        Box::pin(async move {
            let payload = message.to_json()?;
            let key = message.voucher_id.to_string();
            let record = FutureRecord::to(&self.topic).payload(&payload).key(key.as_bytes());

            match self.producer.send(record, Timeout::After(self.timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %self.topic,
                        partition,
                        offset,
                        order_id = %message.order_id,
                        "Order published"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %self.topic,
                        order_id = %message.order_id,
                        error = %kafka_error,
                        "Failed to publish order"
                    );
                    Err(SeckillError::Channel(format!(
                        "Failed to publish to {}: {kafka_error}",
                        self.topic
                    )))
                }
            }
        })
    }

    fn subscribe(&self) -> Pin<Box<dyn Future<Output = Result<OrderStream>> + Send + '_>> {
        Box::pin(async move {
            let consumer = self.create_consumer()?;

            let stream = async_stream::stream! {
                use futures::StreamExt;

                let mut messages = consumer.stream();
                while let Some(received) = messages.next().await {
                    match received {
                        Ok(message) => {
                            let decoded = decode(&message);
                            if let Err(e) = &decoded {
                                tracing::warn!(
                                    partition = message.partition(),
                                    offset = message.offset(),
                                    error = %e,
                                    "Undecodable order message"
                                );
                            }

                            yield decoded;

                            // Resumed: the subscriber is done with this message.
                            if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                                tracing::warn!(
                                    partition = message.partition(),
                                    offset = message.offset(),
                                    error = %e,
                                    "Failed to commit offset (message may be redelivered)"
                                );
                            }
                        }
                        Err(e) => {
                            yield Err(SeckillError::Channel(format!(
                                "Failed to receive message: {e}"
                            )));
                        }
                    }
                }

                tracing::debug!("Order stream ended");
            };

            Ok(Box::pin(stream) as OrderStream)
        })
    }
}
