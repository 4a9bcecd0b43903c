//! Integration tests for [`RedpandaOrderChannel`] against a real Kafka broker.
//!
//! Marked `#[ignore]`: they need Docker and take tens of seconds to start the
//! broker. Run with:
//!
//! ```bash
//! cargo test -p seckill-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use chrono::Utc;
use futures::StreamExt;
use seckill_core::providers::OrderChannel;
use seckill_core::{OrderId, OrderMessage, UserId, VoucherId};
use seckill_redpanda::RedpandaOrderChannel;
use std::collections::HashSet;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};

fn order(id: u64, user: i64) -> OrderMessage {
    OrderMessage {
        order_id: OrderId(id),
        user_id: UserId(user),
        voucher_id: VoucherId(1),
        created_at: Utc::now(),
    }
}

async fn start_kafka() -> (ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");

    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    (kafka, format!("{host}:{port}"))
}

/// Publish until the broker accepts, which also auto-creates the topic.
async fn publish_when_ready(channel: &RedpandaOrderChannel, message: &OrderMessage) {
    for attempt in 1..=60 {
        if channel.publish(message).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(attempt != 60, "Kafka failed to become ready");
    }
}

async fn collect(
    channel: &RedpandaOrderChannel,
    expected: usize,
) -> Vec<OrderMessage> {
    let mut stream = channel.subscribe().await.expect("Failed to subscribe");
    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(30), async {
        while received.len() < expected {
            if let Some(result) = stream.next().await {
                received.push(result.expect("Failed to receive order"));
            }
        }
    })
    .await
    .expect("Timeout waiting for orders");
    received
}

#[tokio::test]
#[ignore]
async fn test_published_orders_are_consumed_in_order() {
    let (_kafka, brokers) = start_kafka().await;
    let channel = RedpandaOrderChannel::builder()
        .brokers(&brokers)
        .topic("seckill.order.round-trip")
        .consumer_group("round-trip")
        .build()
        .expect("Failed to create channel");

    publish_when_ready(&channel, &order(1, 1)).await;
    for id in 2..=5 {
        channel.publish(&order(id, i64::try_from(id).unwrap_or(0))).await.expect("Failed to publish");
    }

    let received = collect(&channel, 5).await;

    let ids: Vec<u64> = received.iter().map(|m| m.order_id.get()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
#[ignore]
async fn test_unacknowledged_message_is_redelivered() {
    let (_kafka, brokers) = start_kafka().await;
    let build = || {
        RedpandaOrderChannel::builder()
            .brokers(&brokers)
            .topic("seckill.order.redelivery")
            .consumer_group("redelivery")
            .build()
            .expect("Failed to create channel")
    };
    let channel = build();
    publish_when_ready(&channel, &order(10, 1)).await;
    channel.publish(&order(11, 2)).await.expect("Failed to publish");

    {
        // Take the first message and drop the stream without polling again,
        // so its offset is never committed.
        let mut stream = channel.subscribe().await.expect("Failed to subscribe");
        let first = tokio::time::timeout(Duration::from_secs(30), stream.next())
            .await
            .expect("Timeout waiting for first order")
            .expect("Stream ended")
            .expect("Failed to receive order");
        assert_eq!(first.order_id, OrderId(10));
    }
    tokio::time::sleep(Duration::from_secs(7)).await;

    let received = collect(&build(), 2).await;
    let ids: HashSet<u64> = received.iter().map(|m| m.order_id.get()).collect();
    assert!(ids.contains(&10));
    assert!(ids.contains(&11));
}
