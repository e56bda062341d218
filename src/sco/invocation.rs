//! Invocation vocabulary
//!
//! Every accepted request gets a `TransactionId` and then moves through
//! `Wait -> Start -> (Finished | Failed)`. Failures are data, reported
//! through the invocation report path, never raised across the worker.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mdib::{Handle, MdibVersionGroup, SinkError};

/// Identity of one accepted invocation, unique per id source.
///
/// Distinct from the mdib version: ids count requests, not commits.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct TransactionId(u64);

impl TransactionId {
    #[inline]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Shared counter handing out transaction ids.
///
/// Clones share one counter, so every worker built from clones of the same
/// source draws from one gapless sequence starting at 1. The counter is
/// only advanced once an invocation has actually been queued.
#[derive(Debug, Clone)]
pub struct TransactionIdSource {
    next: Arc<Mutex<u64>>,
}

impl Default for TransactionIdSource {
    fn default() -> Self {
        Self {
            next: Arc::new(Mutex::new(1)),
        }
    }
}

impl TransactionIdSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id the next accepted invocation will get.
    pub fn peek(&self) -> TransactionId {
        TransactionId::new(*self.lock())
    }

    /// Held while one enqueue decides whether to consume the next id.
    pub(crate) fn lock(&self) -> MutexGuard<'_, u64> {
        self.next.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvocationState {
    Wait,
    Start,
    Finished,
    Failed,
}

impl InvocationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvocationState::Finished | InvocationState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationState::Wait => "WAIT",
            InvocationState::Start => "START",
            InvocationState::Finished => "FINISHED",
            InvocationState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error kind carried by a FAILED invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvocationError {
    Unspecified,
    Unknown,
    InvalidValue,
    Other,
}

impl InvocationError {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationError::Unspecified => "Unspec",
            InvocationError::Unknown => "Unkn",
            InvocationError::InvalidValue => "Inv",
            InvocationError::Other => "Oth",
        }
    }
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bookkeeping record of an invocation that has not reached a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invocation {
    pub transaction_id: TransactionId,
    pub operation_handle: Handle,
    pub state: InvocationState,
    pub enqueued_at: DateTime<Utc>,
    pub caller: Option<String>,
}

/// Synchronous answer to an invocation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationResponse {
    /// `None` when the request was refused before enqueue.
    pub transaction_id: Option<TransactionId>,
    pub state: InvocationState,
    pub error: Option<InvocationError>,
    pub message: Option<String>,
    pub version: MdibVersionGroup,
}

impl InvocationResponse {
    /// Accepted and queued.
    pub fn waiting(transaction_id: TransactionId, version: MdibVersionGroup) -> Self {
        Self {
            transaction_id: Some(transaction_id),
            state: InvocationState::Wait,
            error: None,
            message: None,
            version,
        }
    }

    /// Refused before a transaction id was assigned.
    pub fn refused(
        error: InvocationError,
        message: impl Into<String>,
        version: MdibVersionGroup,
    ) -> Self {
        Self {
            transaction_id: None,
            state: InvocationState::Failed,
            error: Some(error),
            message: Some(message.into()),
            version,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.transaction_id.is_some()
    }
}

/// One invocation state notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationReport {
    /// Version group in effect when the notification was emitted.
    pub version: MdibVersionGroup,
    pub transaction_id: TransactionId,
    pub operation_handle: Handle,
    pub operation_target: Option<Handle>,
    pub state: InvocationState,
    pub error: Option<InvocationError>,
    pub error_message: Option<String>,
}

/// Receiver of invocation state notifications.
pub trait InvocationReportSink: Send + Sync {
    fn on_invocation(&self, report: &InvocationReport) -> Result<(), SinkError>;
}
