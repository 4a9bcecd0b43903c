//! Seckill providers.
//!
//! Traits for every external collaborator of the pipeline. The runtime
//! depends only on these; Redis, Postgres and Redpanda crates provide the
//! production implementations and `seckill-testing` the in-memory ones.
//!
//! ```text
//! Coordination store (Redis)       Persistent store (Postgres)
//! ┌──────────────────────┐         ┌──────────────────────┐
//! │ StockGate            │         │ OrderLedger          │
//! │ SequenceCounter      │         │ VoucherCatalog       │
//! │ CacheStore           │         │ EntityRepository<T>  │
//! └──────────────────────┘         └──────────────────────┘
//!
//! Message channel (Redpanda)
//! ┌──────────────────────┐
//! │ OrderChannel         │  at-least-once, dyn-compatible
//! └──────────────────────┘
//! ```
//!
//! Store-backed traits return `impl Future + Send` and are used through
//! generics. [`OrderChannel`] returns boxed futures so it can be shared as
//! `Arc<dyn OrderChannel>` between the dispatcher and the consumer.

pub mod cache;
pub mod catalog;
pub mod channel;
pub mod counter;
pub mod gate;
pub mod ledger;
pub mod repository;

pub use cache::CacheStore;
pub use catalog::VoucherCatalog;
pub use channel::{OrderChannel, OrderStream};
pub use counter::SequenceCounter;
pub use gate::StockGate;
pub use ledger::{InsertOutcome, OrderLedger};
pub use repository::{Entity, EntityRepository};
