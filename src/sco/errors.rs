//! # Controller Errors

use thiserror::Error;

use crate::mdib::{Handle, MdibError};

/// Result type for controller operations
pub type ScoResult<T> = Result<T, ScoError>;

/// Controller and worker errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoError {
    #[error("Operation not found: {handle}")]
    NotFound { handle: Handle },

    #[error("Invocation queue full (capacity {capacity})")]
    Capacity { capacity: usize },

    #[error("Operation worker is stopped")]
    WorkerStopped,

    #[error("Operation worker already started")]
    WorkerAlreadyStarted,

    #[error(transparent)]
    Mdib(#[from] MdibError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScoError {
    pub fn not_found(handle: impl Into<Handle>) -> Self {
        ScoError::NotFound {
            handle: handle.into(),
        }
    }

    pub(crate) fn poisoned() -> Self {
        ScoError::Internal("Lock poisoned".into())
    }

    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScoError::Capacity { .. })
    }
}
