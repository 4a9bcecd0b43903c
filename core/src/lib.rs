//! # Seckill Core
//!
//! Domain types, provider traits and the error taxonomy for a flash-sale
//! ("seckill") purchasing pipeline.
//!
//! ## Pipeline
//!
//! ```text
//! client ──► Admission Controller ──► Atomic Gate (Redis script)
//!                                          │ admitted
//!                                          ▼
//!                                   Order Dispatcher ──► OrderChannel
//!                                                            │ at-least-once
//!                                                            ▼
//!                                                    Order Materializer ──► OrderLedger
//!                                                                           (source of truth)
//! ```
//!
//! The gate decides the stock winner cheaply; the materializer re-validates
//! against the durable store before inserting. Read paths for slow-changing
//! entities go through the cache guard, which protects the store from
//! penetration and breakdown.
//!
//! ## Crate layout
//!
//! - [`types`]: identifiers and entities (`OrderId`, `SeckillVoucher`, `VoucherOrder`, `Shop`)
//! - [`error`]: [`SeckillError`] taxonomy and the crate [`Result`] alias
//! - [`providers`]: traits for every external collaborator (coordination store,
//!   persistent store, message channel)
//! - [`environment`]: injectable [`Clock`](environment::Clock)
//! - [`keys`]: coordination-store key layout
//! - [`config`]: typed configuration with defaults

#![forbid(unsafe_code)]

pub mod config;
pub mod environment;
pub mod error;
pub mod keys;
pub mod providers;
pub mod types;

pub use error::{Result, SeckillError};
pub use types::{
    GateOutcome, OrderId, OrderMessage, OrderStatus, PayType, SeckillVoucher, Shop, ShopId,
    UserContext, UserId, VoucherId, VoucherOrder,
};
