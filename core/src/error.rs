//! Error taxonomy for the seckill pipeline.

use thiserror::Error;

/// Result type alias for seckill operations.
pub type Result<T> = std::result::Result<T, SeckillError>;

/// Every failure the pipeline can surface, grouped by where it originates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SeckillError {
    // ═══════════════════════════════════════════════════════════
    // Rejections (expected under load, reported to the caller)
    // ═══════════════════════════════════════════════════════════
    /// The admission controller could not grant a permit within the timeout.
    #[error("Admission rejected: no permit within timeout")]
    AdmissionRejected,

    /// The gate found no remaining stock, or the sale was never seeded.
    #[error("Voucher {voucher_id} is out of stock")]
    OutOfStock {
        /// Voucher requested
        voucher_id: i64,
    },

    /// The user already holds a unit of this voucher.
    #[error("User {user_id} already purchased voucher {voucher_id}")]
    DuplicatePurchase {
        /// Buyer
        user_id: i64,
        /// Voucher requested
        voucher_id: i64,
    },

    // ═══════════════════════════════════════════════════════════
    // Coordination and cache
    // ═══════════════════════════════════════════════════════════
    /// The coordination store could not be reached or gave an unusable reply.
    #[error("Coordination store unavailable: {0}")]
    CoordinationStoreUnavailable(String),

    /// A rebuild lock stayed held past the retry budget.
    #[error("Cache lock contention on {key}")]
    CacheLockContention {
        /// Lock key that could not be acquired
        key: String,
    },

    /// The ID generator could not issue an id.
    #[error("ID generation failed: {0}")]
    IdGeneration(String),

    // ═══════════════════════════════════════════════════════════
    // Persistence and messaging
    // ═══════════════════════════════════════════════════════════
    /// The gate admitted a purchase the durable store could not honor.
    #[error("Materialization conflict for order {order_id}: {reason}")]
    MaterializationConflict {
        /// Order that was dropped
        order_id: u64,
        /// What the durable store reported
        reason: String,
    },

    /// Persistent store failure.
    #[error("Database error: {0}")]
    Database(String),

    /// Message channel failure.
    #[error("Channel error: {0}")]
    Channel(String),

    /// Payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Caller supplied an invalid argument.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SeckillError {
    /// Returns `true` for the gate's business rejections.
    ///
    /// # Examples
    ///
    /// ```
    /// # use seckill_core::SeckillError;
    /// assert!(SeckillError::OutOfStock { voucher_id: 1 }.is_gate_rejection());
    /// assert!(!SeckillError::AdmissionRejected.is_gate_rejection());
    /// ```
    #[must_use]
    pub const fn is_gate_rejection(&self) -> bool {
        matches!(self, Self::OutOfStock { .. } | Self::DuplicatePurchase { .. })
    }

    /// Returns `true` if retrying the same operation may succeed.
    ///
    /// Conflicts and bad payloads are permanent; store and channel outages
    /// are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CoordinationStoreUnavailable(_)
                | Self::Database(_)
                | Self::Channel(_)
                | Self::CacheLockContention { .. }
        )
    }

    /// Message safe to show to the end user.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::AdmissionRejected => "System busy, please retry",
            Self::OutOfStock { .. } => "Insufficient stock",
            Self::DuplicatePurchase { .. } => "One order per user",
            _ => "Service unavailable, please retry later",
        }
    }
}
