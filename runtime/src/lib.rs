//! # Seckill Runtime
//!
//! The components of the flash-sale pipeline, generic over the provider
//! traits in [`seckill_core::providers`]:
//!
//! - [`IdGenerator`]: time-ordered distributed ids
//! - [`AdmissionController`]: process-wide token bucket
//! - [`OrderDispatcher`]: admission → gate → id → publish
//! - [`SaleOpener`]: persist a voucher and seed the gate
//! - [`OrderMaterializer`] and [`OrderConsumer`]: durable, redelivery-safe order writes
//! - [`CacheGuard`]: read-through cache with tombstones, rebuild locks and logical expiry
//!
//! Plus [`retry`] (exponential backoff) and [`metrics`] (Prometheus).

#![forbid(unsafe_code)]

pub mod admission;
pub mod cache;
pub mod consumer;
pub mod dispatcher;
pub mod id_generator;
pub mod materializer;
pub mod metrics;
pub mod retry;
pub mod sale;

pub use admission::AdmissionController;
pub use cache::{CacheGuard, LogicalEnvelope};
pub use consumer::OrderConsumer;
pub use dispatcher::OrderDispatcher;
pub use id_generator::IdGenerator;
pub use materializer::{MaterializeOutcome, OrderHandler, OrderMaterializer};
pub use sale::SaleOpener;
