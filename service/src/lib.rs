//! Seckill service process.
//!
//! [`ServiceConfig`] reads the environment, [`SeckillApp`] connects the
//! Redis, `PostgreSQL` and Redpanda backends and owns the purchase path and
//! the order consumer. The HTTP surface is left to the embedding service;
//! it calls [`SeckillApp::dispatcher`] per request.

pub mod app;
pub mod config;

pub use app::SeckillApp;
pub use config::ServiceConfig;
