//! Prometheus metrics for the purchase path, cache guard and materializer.
//!
//! Components record through the small recorder structs below; the service
//! installs the exporter once with [`MetricsServer::start`].
//!
//! # Example
//!
//! ```rust,no_run
//! use seckill_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
}

/// Prometheus scrape endpoint.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a server that will listen on `addr`.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions, install the recorder and start the
    /// HTTP listener. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built. A recorder that is
    /// already installed is tolerated with a warning.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let (recorder, exporter) = builder
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;
        let handle = recorder.handle();
        match metrics::set_global_recorder(recorder) {
            Ok(()) => {
                self.handle = Some(handle);
                tokio::spawn(async move {
                    if exporter.await.is_err() {
                        tracing::error!("Metrics exporter stopped");
                    }
                });
                tracing::info!(addr = %self.addr, "Metrics available at http://{}/metrics", self.addr);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Metrics recorder already installed, skipping");
                Ok(())
            }
        }
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if the server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(
        "seckill_purchases_total",
        "Purchase attempts by outcome (admitted, out_of_stock, duplicate, rejected, error)"
    );
    describe_histogram!(
        "seckill_gate_duration_seconds",
        "Latency of the atomic stock/idempotency gate"
    );
    describe_counter!("seckill_ids_issued_total", "Ids issued by the distributed generator");
    describe_counter!(
        "seckill_reservations_released_total",
        "Gate reservations released after a dispatch failure"
    );
    describe_gauge!(
        "seckill_admission_available_permits",
        "Permits currently stored in the admission bucket"
    );

    describe_counter!("seckill_cache_hits_total", "Cache guard hits with a payload");
    describe_counter!("seckill_cache_tombstone_hits_total", "Cache guard hits on a tombstone");
    describe_counter!("seckill_cache_misses_total", "Cache guard misses that went to the store");
    describe_counter!("seckill_cache_rebuilds_total", "Logical-expiry background rebuilds");
    describe_counter!(
        "seckill_cache_lock_contention_total",
        "Reads that gave up waiting for a rebuild lock"
    );

    describe_counter!("seckill_orders_materialized_total", "Order messages by materializer outcome");
    describe_counter!(
        "seckill_materialization_conflicts_total",
        "Gate admissions the durable store refused"
    );
    describe_counter!("seckill_consumer_errors_total", "Order messages the consumer could not handle");
}

/// Purchase-path metrics.
pub struct PurchaseMetrics;

impl PurchaseMetrics {
    /// Record a purchase attempt's outcome.
    pub fn record_outcome(outcome: &'static str) {
        counter!("seckill_purchases_total", "outcome" => outcome).increment(1);
    }

    /// Record gate latency.
    pub fn record_gate(duration: Duration) {
        histogram!("seckill_gate_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record an issued id.
    pub fn record_id_issued(domain: &str) {
        counter!("seckill_ids_issued_total", "domain" => domain.to_string()).increment(1);
    }

    /// Record a compensating release.
    pub fn record_release() {
        counter!("seckill_reservations_released_total").increment(1);
    }

    /// Record the bucket level.
    pub fn record_available_permits(permits: f64) {
        gauge!("seckill_admission_available_permits").set(permits);
    }
}

/// Cache guard metrics.
pub struct CacheMetrics;

impl CacheMetrics {
    /// Payload hit.
    pub fn record_hit() {
        counter!("seckill_cache_hits_total").increment(1);
    }

    /// Tombstone hit.
    pub fn record_tombstone() {
        counter!("seckill_cache_tombstone_hits_total").increment(1);
    }

    /// Miss that loaded from the store.
    pub fn record_miss() {
        counter!("seckill_cache_misses_total").increment(1);
    }

    /// Background rebuild scheduled.
    pub fn record_rebuild() {
        counter!("seckill_cache_rebuilds_total").increment(1);
    }

    /// Lock retry budget exhausted.
    pub fn record_lock_contention() {
        counter!("seckill_cache_lock_contention_total").increment(1);
    }
}

/// Materializer and consumer metrics.
pub struct MaterializerMetrics;

impl MaterializerMetrics {
    /// Record a message outcome.
    pub fn record_outcome(outcome: &'static str) {
        counter!("seckill_orders_materialized_total", "outcome" => outcome).increment(1);
    }

    /// Record a two-tier divergence.
    pub fn record_conflict() {
        counter!("seckill_materialization_conflicts_total").increment(1);
    }

    /// Record a message the consumer failed to handle.
    pub fn record_consumer_error() {
        counter!("seckill_consumer_errors_total").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn started_server_renders_recorded_metrics() {
        let mut server = MetricsServer::new(SocketAddr::from(([127, 0, 0, 1], 0)));
        assert!(server.start().is_ok());

        MaterializerMetrics::record_consumer_error();

        let rendered = server.render().unwrap_or_default();
        assert!(rendered.contains("seckill_consumer_errors_total"));
    }
}
