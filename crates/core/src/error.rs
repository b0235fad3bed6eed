//! Errors raised by invoice rules and value objects.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Failure of a business rule. Storage, gateway and signing failures are
/// reported by the submission layer, not here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Input rejected: amount precision, rate bounds, party identifiers,
    /// missing invoice number or lines.
    #[error("validation failed: {0}")]
    Validation(String),

    /// State that the aggregate should never reach, such as a submitted
    /// invoice without a signed document.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced part of an aggregate (an invoice line) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The stored invoice version differs from the one the write was based on.
    #[error("conflict: {0}")]
    Conflict(String),
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

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}
