//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts, stock shortages). Infrastructure concerns belong
/// elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Requested quantity cannot be satisfied after a full rotation walk.
    /// Recoverable by the caller (backorder, alternate warehouse).
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    /// The lot does not belong to the given SKU/warehouse position.
    #[error("unknown lot: {0}")]
    UnknownLot(String),

    /// No stock exists for the given SKU (caller error, not retried).
    #[error("unknown sku: {0}")]
    UnknownSku(String),

    /// Applying the quantity delta would drive a lot's current or reserved
    /// quantity negative. Always a bug in the caller; fails loudly.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn insufficient_stock(requested: i64, available: i64) -> Self {
        Self::InsufficientStock { requested, available }
    }

    pub fn unknown_lot(msg: impl Into<String>) -> Self {
        Self::UnknownLot(msg.into())
    }

    pub fn unknown_sku(msg: impl Into<String>) -> Self {
        Self::UnknownSku(msg.into())
    }

    pub fn invalid_quantity(msg: impl Into<String>) -> Self {
        Self::InvalidQuantity(msg.into())
    }
}
