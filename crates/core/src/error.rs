//! Errors raised by catalog and order values before anything is stored.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Rejected input or a broken catalog rule.
///
/// These never depend on database state; storage failures are reported by
/// the store's own error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Caller input is malformed: blank names, bad emails, non-positive prices.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A rule that must hold across stored data, such as non-negative stock.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),
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
}

/// Reject blank (empty or whitespace-only) text fields.
pub fn require_text(field: &str, value: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    Ok(())
}
