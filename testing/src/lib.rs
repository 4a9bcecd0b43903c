//! # Seckill Testing
//!
//! In-memory implementations of every provider trait, deterministic clocks
//! and fixtures for exercising the pipeline without Redis, Postgres or
//! Redpanda.
//!
//! ## Example
//!
//! ```
//! use seckill_core::providers::StockGate;
//! use seckill_core::{GateOutcome, UserId, VoucherId};
//! use seckill_testing::InMemoryCoordinator;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let rt = tokio::runtime::Runtime::new()?;
//! rt.block_on(async {
//!     let gate = InMemoryCoordinator::new();
//!     gate.seed(VoucherId(1), 1).await?;
//!     assert_eq!(gate.try_purchase(VoucherId(1), UserId(7)).await?, GateOutcome::Admitted);
//!     assert_eq!(gate.try_purchase(VoucherId(1), UserId(8)).await?, GateOutcome::OutOfStock);
//!     Ok::<_, seckill_core::SeckillError>(())
//! })?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod fixtures;
pub mod mocks;

pub use mocks::{
    FixedClock, InMemoryCoordinator, InMemoryEntityRepository, InMemoryOrderChannel,
    InMemoryOrderLedger, ManualClock, test_clock,
};

/// Install a `tracing` subscriber for test output, honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
