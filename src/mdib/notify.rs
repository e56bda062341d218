//! Change notification seam
//!
//! Sinks are invoked synchronously at the end of every committing
//! transaction, while the write gate is still held, so they observe
//! commits in mdib version order.

use thiserror::Error;

use super::result::TransactionResult;
use super::store::MdibVersionGroup;

/// Failure reported by a sink. Logged, never propagated to the writer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Sink '{sink}' failed: {message}")]
pub struct SinkError {
    pub sink: String,
    pub message: String,
}

impl SinkError {
    pub fn new(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            message: message.into(),
        }
    }
}

/// Receiver of committed change-sets.
pub trait ChangeSink: Send + Sync {
    fn on_commit(
        &self,
        result: &TransactionResult,
        version: &MdibVersionGroup,
    ) -> Result<(), SinkError>;
}
