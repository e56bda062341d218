//! # Information Base Errors

use thiserror::Error;

use super::transaction::TransactionKind;
use super::types::{Handle, StateCategory};

/// Result type for information base operations
pub type MdibResult<T> = Result<T, MdibError>;

/// Caller misuse of the transaction API. Nothing is mutated when raised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("{kind} transaction cannot write {category} state '{handle}'")]
    WrongCategory {
        kind: TransactionKind,
        category: StateCategory,
        handle: Handle,
    },

    #[error("A transaction is already open on this thread")]
    DoubleOpen,

    #[error("'{handle}' is not staged in this transaction")]
    NotStaged { handle: Handle },

    #[error("{action} is not allowed in a {kind} transaction")]
    NotAllowed {
        kind: TransactionKind,
        action: &'static str,
    },
}

/// Information base errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MdibError {
    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),

    #[error("Handle not found: {handle}")]
    NotFound { handle: Handle },

    #[error("Handle already exists: {handle}")]
    Duplicate { handle: Handle },

    #[error("Invalid structure: {0}")]
    InvalidStructure(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MdibError {
    pub fn not_found(handle: impl Into<Handle>) -> Self {
        MdibError::NotFound {
            handle: handle.into(),
        }
    }

    /// Only an unknown handle is recoverable (the caller may insert instead).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MdibError::NotFound { .. })
    }

    pub fn is_usage(&self) -> bool {
        matches!(self, MdibError::Usage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable() {
        assert!(MdibError::not_found("x").is_recoverable());
        assert!(!MdibError::from(UsageError::DoubleOpen).is_recoverable());
        assert!(!MdibError::InvalidStructure("cycle".into()).is_recoverable());
    }

    #[test]
    fn test_display() {
        let err = MdibError::from(UsageError::WrongCategory {
            kind: TransactionKind::Metric,
            category: StateCategory::Alert,
            handle: "AC1".into(),
        });
        assert_eq!(
            err.to_string(),
            "Usage error: metric transaction cannot write alert state 'AC1'"
        );
    }
}
