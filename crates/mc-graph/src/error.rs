//! Store-level errors.
//!
//! `StoreError` is what backends raise; the writer and coordinator convert
//! into `CatalogError` at the service boundary. `Conflict` is the one
//! retryable kind: it marks a unique-constraint race that a retry will
//! observe resolved.

use mc_core::CatalogError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique-constraint race, e.g. two writers inserting the same
    /// `(urn, aspect, version)`. Retryable.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Session pool exhaustion or connection loss.
    #[error("store unavailable: {message}")]
    Unavailable { message: String, transient: bool },

    /// The request deadline expired while the transaction was in flight.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// A structural constraint was violated (label clash, latest-pointer
    /// duplication). Not retryable.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    pub fn unavailable(message: impl Into<String>, transient: bool) -> Self {
        StoreError::Unavailable { message: message.into(), transient }
    }
}

impl From<StoreError> for CatalogError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(message) => CatalogError::StoreConflict { attempts: 1, message },
            StoreError::Unavailable { message, transient } => {
                CatalogError::StoreUnavailable { message, transient }
            }
            StoreError::DeadlineExceeded => CatalogError::StoreUnavailable {
                message: "deadline exceeded".to_string(),
                transient: false,
            },
            StoreError::ConstraintViolation(message) | StoreError::Internal(message) => {
                CatalogError::Internal(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflicts_are_retryable() {
        assert!(StoreError::Conflict("dup version".into()).is_retryable());
        assert!(!StoreError::DeadlineExceeded.is_retryable());
        assert!(!StoreError::unavailable("pool", true).is_retryable());
    }

    #[test]
    fn test_conversion_preserves_transience() {
        let err: CatalogError = StoreError::unavailable("pool timeout", true).into();
        assert!(err.is_transient());
        let err: CatalogError = StoreError::DeadlineExceeded.into();
        assert!(!err.is_transient());
    }
}
