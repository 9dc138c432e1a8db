//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every business-rule violation is reported through this type before any
/// event is emitted, so a failed command never leaves a partial mutation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Missing or malformed input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The command is not legal in the aggregate's current state.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The named entity does not exist (or is soft-deleted).
    #[error("{0} not found")]
    NotFound(String),

    /// Stale version / duplicate creation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Role or ownership mismatch.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u64, available: u64 },

    #[error("insufficient balance: requested {requested}, balance {balance}")]
    InsufficientBalance { requested: u64, balance: u64 },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Payout payee missing, soft-deleted, or holding a different role.
    #[error("invalid payee: {0}")]
    InvalidPayee(String),
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

    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound(entity.into())
    }

    pub fn not_authorized(msg: impl Into<String>) -> Self {
        Self::NotAuthorized(msg.into())
    }

    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        Self::InvalidAmount(msg.into())
    }

    pub fn invalid_payee(msg: impl Into<String>) -> Self {
        Self::InvalidPayee(msg.into())
    }
}
