//! Identifiers and entities for the seckill pipeline.
//!
//! Identifiers are thin newtypes over the integer columns used by the
//! persistent store. [`OrderId`] is the exception: it is a composed 64-bit
//! value (`seconds since epoch << 32 | daily sequence`) issued by the
//! distributed ID generator, never by the database.

use crate::error::{Result, SeckillError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Seckill voucher identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoucherId(pub i64);

impl VoucherId {
    /// Wrap a raw voucher id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Raw value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for VoucherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User identifier, supplied by the external session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// Wrap a raw user id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Raw value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shop identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShopId(pub i64);

impl ShopId {
    /// Wrap a raw shop id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Raw value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ShopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globally unique, time-ordered order identifier.
///
/// Layout:
///
/// ```text
///  63                              32 31                               0
/// ┌──────────────────────────────────┬──────────────────────────────────┐
/// │ seconds since the fixed epoch    │ per (domain, day) sequence       │
/// └──────────────────────────────────┴──────────────────────────────────┘
/// ```
///
/// # Example
///
/// ```
/// use seckill_core::OrderId;
///
/// let id = OrderId::compose(120, 7);
/// assert_eq!(id.timestamp_secs(), 120);
/// assert_eq!(id.sequence(), 7);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub u64);

impl OrderId {
    /// Number of low bits holding the daily sequence.
    pub const SEQUENCE_BITS: u32 = 32;

    /// Build an id from its timestamp and sequence halves.
    #[must_use]
    pub const fn compose(timestamp_secs: u64, sequence: u32) -> Self {
        Self((timestamp_secs << Self::SEQUENCE_BITS) | sequence as u64)
    }

    /// Seconds since the generator's fixed epoch.
    #[must_use]
    pub const fn timestamp_secs(self) -> u64 {
        self.0 >> Self::SEQUENCE_BITS
    }

    /// Daily sequence number.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Masked to 32 bits
    pub const fn sequence(self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }

    /// Raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Convert to the signed representation used by `BIGINT` columns.
    ///
    /// # Errors
    ///
    /// Returns [`SeckillError::InvalidInput`] if the id does not fit in an `i64`.
    pub fn to_i64(self) -> Result<i64> {
        i64::try_from(self.0)
            .map_err(|_| SeckillError::InvalidInput(format!("order id {} exceeds i64", self.0)))
    }

    /// Convert from a `BIGINT` column value.
    ///
    /// # Errors
    ///
    /// Returns [`SeckillError::InvalidInput`] for negative values.
    pub fn from_i64(value: i64) -> Result<Self> {
        u64::try_from(value)
            .map(Self)
            .map_err(|_| SeckillError::InvalidInput(format!("negative order id {value}")))
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller identity, passed explicitly through every purchase call.
///
/// The session layer that authenticates the caller is external; whatever it
/// hands over is trusted as given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    /// Authenticated user.
    pub user_id: UserId,
}

impl UserContext {
    /// Context for an authenticated user.
    #[must_use]
    pub const fn new(user_id: UserId) -> Self {
        Self { user_id }
    }
}

/// Result of the atomic stock/idempotency gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateOutcome {
    /// Stock decremented and user recorded.
    Admitted,
    /// No stock left (or the sale was never seeded).
    OutOfStock,
    /// User already holds a unit of this voucher.
    Duplicate,
}

impl GateOutcome {
    /// Script return code for this outcome.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Admitted => 0,
            Self::OutOfStock => 1,
            Self::Duplicate => 2,
        }
    }

    /// Decode a script return code.
    ///
    /// # Errors
    ///
    /// Returns [`SeckillError::CoordinationStoreUnavailable`] for unknown codes;
    /// an unexpected reply means the gate cannot be trusted.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Self::Admitted),
            1 => Ok(Self::OutOfStock),
            2 => Ok(Self::Duplicate),
            other => Err(SeckillError::CoordinationStoreUnavailable(format!(
                "unexpected gate script reply: {other}"
            ))),
        }
    }
}

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Created, awaiting payment.
    Unpaid,
    /// Paid.
    Paid,
    /// Redeemed.
    Used,
    /// Cancelled before payment.
    Cancelled,
    /// Refund in progress.
    Refunding,
    /// Refunded.
    Refunded,
}

impl OrderStatus {
    /// Column representation.
    #[must_use]
    pub const fn as_i16(self) -> i16 {
        match self {
            Self::Unpaid => 1,
            Self::Paid => 2,
            Self::Used => 3,
            Self::Cancelled => 4,
            Self::Refunding => 5,
            Self::Refunded => 6,
        }
    }

    /// Parse the column representation.
    ///
    /// # Errors
    ///
    /// Returns [`SeckillError::Database`] for unknown values.
    pub fn from_i16(value: i16) -> Result<Self> {
        match value {
            1 => Ok(Self::Unpaid),
            2 => Ok(Self::Paid),
            3 => Ok(Self::Used),
            4 => Ok(Self::Cancelled),
            5 => Ok(Self::Refunding),
            6 => Ok(Self::Refunded),
            other => Err(SeckillError::Database(format!("invalid order status: {other}"))),
        }
    }
}

/// Payment channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayType {
    /// Account balance.
    Balance,
    /// Alipay.
    Alipay,
    /// WeChat Pay.
    WeChat,
}

impl PayType {
    /// Column representation.
    #[must_use]
    pub const fn as_i16(self) -> i16 {
        match self {
            Self::Balance => 1,
            Self::Alipay => 2,
            Self::WeChat => 3,
        }
    }

    /// Parse the column representation.
    ///
    /// # Errors
    ///
    /// Returns [`SeckillError::Database`] for unknown values.
    pub fn from_i16(value: i16) -> Result<Self> {
        match value {
            1 => Ok(Self::Balance),
            2 => Ok(Self::Alipay),
            3 => Ok(Self::WeChat),
            other => Err(SeckillError::Database(format!("invalid pay type: {other}"))),
        }
    }
}

/// Limited-inventory voucher sold through the seckill flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeckillVoucher {
    /// Voucher id (shared with the base voucher row).
    pub voucher_id: VoucherId,
    /// Authoritative remaining stock. Never negative.
    pub stock: i32,
    /// Sale opens.
    pub begin_time: DateTime<Utc>,
    /// Sale closes.
    pub end_time: DateTime<Utc>,
    /// Row created.
    pub created_at: DateTime<Utc>,
    /// Row last updated.
    pub updated_at: DateTime<Utc>,
}

impl SeckillVoucher {
    /// New voucher with `stock` units sold between `begin_time` and `end_time`.
    #[must_use]
    pub fn new(
        voucher_id: VoucherId,
        stock: i32,
        begin_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            voucher_id,
            stock,
            begin_time,
            end_time,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check the invariants a voucher must satisfy before the sale opens.
    ///
    /// # Errors
    ///
    /// Returns [`SeckillError::InvalidInput`] for negative stock or an empty
    /// validity window.
    pub fn validate(&self) -> Result<()> {
        if self.stock < 0 {
            return Err(SeckillError::InvalidInput(format!(
                "voucher {} has negative stock {}",
                self.voucher_id, self.stock
            )));
        }
        if self.end_time <= self.begin_time {
            return Err(SeckillError::InvalidInput(format!(
                "voucher {} validity window is empty",
                self.voucher_id
            )));
        }
        Ok(())
    }

    /// Whether `now` falls inside the validity window.
    #[must_use]
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.begin_time <= now && now < self.end_time
    }
}

/// Order-creation message published by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderMessage {
    /// Pre-allocated order id.
    pub order_id: OrderId,
    /// Buyer.
    pub user_id: UserId,
    /// Voucher bought.
    pub voucher_id: VoucherId,
    /// When the gate admitted the purchase.
    pub created_at: DateTime<Utc>,
}

impl OrderMessage {
    /// Encode as JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SeckillError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| SeckillError::Serialization(e.to_string()))
    }

    /// Decode from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SeckillError::Serialization`] for malformed payloads.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| SeckillError::Serialization(e.to_string()))
    }
}

/// Persisted voucher order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherOrder {
    /// Generator-issued id.
    pub id: OrderId,
    /// Buyer.
    pub user_id: UserId,
    /// Voucher bought.
    pub voucher_id: VoucherId,
    /// Payment channel.
    pub pay_type: PayType,
    /// Lifecycle status.
    pub status: OrderStatus,
    /// Created.
    pub created_at: DateTime<Utc>,
    /// Paid.
    pub pay_time: Option<DateTime<Utc>>,
    /// Redeemed.
    pub use_time: Option<DateTime<Utc>>,
    /// Refunded.
    pub refund_time: Option<DateTime<Utc>>,
    /// Last updated.
    pub updated_at: DateTime<Utc>,
}

impl VoucherOrder {
    /// Unpaid order materialized from a dispatcher message.
    #[must_use]
    pub const fn from_message(message: &OrderMessage) -> Self {
        Self {
            id: message.order_id,
            user_id: message.user_id,
            voucher_id: message.voucher_id,
            pay_type: PayType::Balance,
            status: OrderStatus::Unpaid,
            created_at: message.created_at,
            pay_time: None,
            use_time: None,
            refund_time: None,
            updated_at: message.created_at,
        }
    }
}

/// Shop listing: the slow-changing entity served through the cache guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shop {
    /// Shop id.
    pub id: ShopId,
    /// Display name.
    pub name: String,
    /// Category id.
    pub type_id: i64,
    /// Comma-separated image URLs.
    pub images: String,
    /// Business district.
    pub area: Option<String>,
    /// Street address.
    pub address: String,
    /// Longitude.
    pub x: f64,
    /// Latitude.
    pub y: f64,
    /// Average price per person, in cents.
    pub avg_price: Option<i64>,
    /// Units sold.
    pub sold: i32,
    /// Number of reviews.
    pub comments: i32,
    /// Rating × 10.
    pub score: i32,
    /// Opening hours, free text.
    pub open_hours: Option<String>,
    /// Created.
    pub created_at: DateTime<Utc>,
    /// Last updated.
    pub updated_at: DateTime<Utc>,
}
