//! Seckill service.
//!
//! This binary:
//! - Loads configuration from the environment (and `.env`)
//! - Starts the Prometheus exporter
//! - Connects Redis, `PostgreSQL` and Redpanda, running migrations
//! - Pre-warms hot shops and runs the order consumer until Ctrl+C / SIGTERM
//!
//! # Usage
//!
//! ```bash
//! docker compose up -d
//! cargo run -p seckill-service
//! ```

use seckill_runtime::metrics::MetricsServer;
use seckill_service::{SeckillApp, ServiceConfig};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let config = ServiceConfig::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting seckill service");
    info!(
        redis = %config.redis_url,
        redpanda = %config.redpanda.brokers,
        topic = %config.redpanda.topic,
        "Configuration loaded"
    );

    let mut metrics = MetricsServer::new(config.metrics_addr);
    metrics.start()?;

    let mut app = SeckillApp::new(config).await?;
    app.start().await?;
    info!("Seckill service is running, press Ctrl+C to shut down");

    shutdown_signal().await;
    app.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal, shutting down"),
        () = terminate => info!("Received SIGTERM signal, shutting down"),
    }
}
