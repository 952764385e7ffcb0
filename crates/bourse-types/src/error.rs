//! Error types for the Bourse market engine.
//!
//! All errors use the `BRS_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Order / validation errors
//! - 2xx: Balance errors
//! - 3xx: Ledger lookup errors
//! - 5xx: Matching errors
//! - 6xx: Settlement errors
//! - 7xx: Actor errors
//! - 9xx: General / internal errors
//!
//! Callers that only care about the broad failure class use
//! [`BourseError::kind`].

use std::fmt;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{CityId, OrderId, RegionId, ResourceCode};

/// Central error enum for all Bourse operations.
#[derive(Debug, Error)]
pub enum BourseError {
    // =================================================================
    // Order / Validation Errors (1xx)
    // =================================================================
    /// The order failed validation (bad side, price, quantity, TIF).
    #[error("BRS_ERR_100: Invalid order: {reason}")]
    InvalidOrder { reason: String },

    /// The price lies outside the manipulation band around the reference.
    #[error(
        "BRS_ERR_101: Price {price} outside band [{min_price}, {max_price}] \
         (reference {reference_price})"
    )]
    PriceOutOfBand {
        price: Decimal,
        min_price: Decimal,
        max_price: Decimal,
        reference_price: Decimal,
    },

    /// No trades and no static reference: the price cannot be validated.
    #[error("BRS_ERR_102: No reference price available for {0}")]
    NoReferencePrice(ResourceCode),

    /// The requested order does not exist.
    #[error("BRS_ERR_103: Order not found: {0}")]
    OrderNotFound(OrderId),

    /// An order with this ID already exists.
    #[error("BRS_ERR_104: Order already exists: {0}")]
    DuplicateOrder(OrderId),

    /// The resource code is not a known market.
    #[error("BRS_ERR_105: Unknown resource: {0}")]
    UnknownResource(String),

    /// Quick buy/sell found nothing resting on the opposite side.
    #[error("BRS_ERR_106: No resting liquidity for {0}")]
    NoLiquidity(ResourceCode),

    // =================================================================
    // Balance Errors (2xx)
    // =================================================================
    /// Not enough currency to perform the operation.
    #[error("BRS_ERR_200: Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    /// Not enough of a resource to perform the operation.
    #[error("BRS_ERR_201: Insufficient {resource}: need {needed}, have {available}")]
    InsufficientResource {
        resource: ResourceCode,
        needed: u64,
        available: u64,
    },

    /// Destination storage cannot hold the incoming quantity.
    #[error("BRS_ERR_202: Capacity exceeded for {resource}: {requested} requested, {free} free")]
    CapacityExceeded {
        resource: ResourceCode,
        requested: u64,
        free: u64,
    },

    /// A balance operation would produce a negative value.
    #[error("BRS_ERR_203: Balance underflow")]
    BalanceUnderflow,

    // =================================================================
    // Ledger Lookup Errors (3xx)
    // =================================================================
    /// The city has no ledger account.
    #[error("BRS_ERR_300: City not found: {0}")]
    CityNotFound(CityId),

    /// The region is not registered.
    #[error("BRS_ERR_301: Region not found: {0}")]
    RegionNotFound(RegionId),

    /// A city with this ID already has an account.
    #[error("BRS_ERR_302: City already exists: {0}")]
    DuplicateCity(CityId),

    // =================================================================
    // Matching Errors (5xx)
    // =================================================================
    /// The matcher reached a state that should be impossible.
    #[error("BRS_ERR_500: Matching failed: {reason}")]
    MatchingFailed { reason: String },

    // =================================================================
    // Settlement Errors (6xx)
    // =================================================================
    /// The ledger diverged between escrow and settlement; the named order
    /// is the one whose precondition failed.
    #[error("BRS_ERR_600: Settlement inconsistent for order {order_id}: {reason}")]
    SettlementConsistency { order_id: OrderId, reason: String },

    /// A fill at or below the resource's settled sequence was presented
    /// again.
    #[error("BRS_ERR_601: Fill {sequence} on {resource} already settled (settled through {settled_through})")]
    FillAlreadySettled {
        resource: ResourceCode,
        sequence: u64,
        settled_through: u64,
    },

    /// Currency or resource supply is not conserved.
    #[error("BRS_ERR_602: Supply invariant violation: {reason}")]
    SupplyInvariantViolation { reason: String },

    // =================================================================
    // Actor Errors (7xx)
    // =================================================================
    /// The book actor for this resource is gone or not responding.
    #[error("BRS_ERR_700: Order book actor unavailable for {0}")]
    ActorUnavailable(ResourceCode),

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("BRS_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("BRS_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, out-of-range values).
    #[error("BRS_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk).
    #[error("BRS_ERR_903: I/O error: {0}")]
    Io(String),
}

/// Broad failure classes exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    InsufficientFunds,
    InsufficientResource,
    CapacityExceeded,
    SettlementConsistency,
    ActorUnavailable,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "VALIDATION",
            Self::NotFound => "NOT_FOUND",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::InsufficientResource => "INSUFFICIENT_RESOURCE",
            Self::CapacityExceeded => "CAPACITY_EXCEEDED",
            Self::SettlementConsistency => "SETTLEMENT_CONSISTENCY",
            Self::ActorUnavailable => "ACTOR_UNAVAILABLE",
            Self::Internal => "INTERNAL",
        };
        f.write_str(s)
    }
}

impl BourseError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidOrder { .. }
            | Self::PriceOutOfBand { .. }
            | Self::NoReferencePrice(_)
            | Self::DuplicateOrder(_)
            | Self::DuplicateCity(_)
            | Self::NoLiquidity(_)
            | Self::Configuration(_) => ErrorKind::Validation,
            Self::OrderNotFound(_)
            | Self::UnknownResource(_)
            | Self::CityNotFound(_)
            | Self::RegionNotFound(_) => ErrorKind::NotFound,
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::InsufficientResource { .. } => ErrorKind::InsufficientResource,
            Self::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Self::SettlementConsistency { .. } | Self::FillAlreadySettled { .. } => {
                ErrorKind::SettlementConsistency
            }
            Self::ActorUnavailable(_) => ErrorKind::ActorUnavailable,
            Self::BalanceUnderflow
            | Self::MatchingFailed { .. }
            | Self::SupplyInvariantViolation { .. }
            | Self::Internal(_)
            | Self::Serialization(_)
            | Self::Io(_) => ErrorKind::Internal,
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, BourseError>;

impl From<std::io::Error> for BourseError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BourseError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
