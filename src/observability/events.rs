//! Observable events
//!
//! Every line the logger writes names one of these events.

use std::fmt;

use super::logger::Severity;

/// Observable events of the information base and its controllers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    // Lifecycle
    /// Provider started its controllers
    ProviderStart,
    /// Provider stopped its controllers
    ProviderStop,
    /// Configuration loaded
    ConfigLoaded,

    // Transactions
    /// Write scope acquired
    TransactionBegin,
    /// Changes applied and the mdib version advanced
    TransactionCommit,
    /// Scope closed without changes
    TransactionNoop,
    /// Scope closed with an error, nothing applied
    TransactionAborted,
    /// Descriptor added to the tree
    DescriptorInserted,
    /// Descriptor subtree removed from the tree
    DescriptorRemoved,

    // Controller
    /// Operation bound to a controller
    OperationRegistered,
    /// Operation removed from a controller
    OperationUnregistered,
    /// Invocation accepted into the worker queue
    InvocationEnqueued,
    /// Invocation refused before enqueue
    InvocationRejected,
    /// Invocation ended in FINISHED
    InvocationFinished,
    /// Invocation ended in FAILED
    InvocationFailed,
    /// Worker thread started
    WorkerStart,
    /// Worker thread joined
    WorkerStop,

    // Collaborators
    /// A notification sink reported a failure
    SinkFailed,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ProviderStart => "PROVIDER_START",
            Event::ProviderStop => "PROVIDER_STOP",
            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::TransactionBegin => "TRANSACTION_BEGIN",
            Event::TransactionCommit => "TRANSACTION_COMMIT",
            Event::TransactionNoop => "TRANSACTION_NOOP",
            Event::TransactionAborted => "TRANSACTION_ABORTED",
            Event::DescriptorInserted => "DESCRIPTOR_INSERTED",
            Event::DescriptorRemoved => "DESCRIPTOR_REMOVED",

            Event::OperationRegistered => "OPERATION_REGISTERED",
            Event::OperationUnregistered => "OPERATION_UNREGISTERED",
            Event::InvocationEnqueued => "INVOCATION_ENQUEUED",
            Event::InvocationRejected => "INVOCATION_REJECTED",
            Event::InvocationFinished => "INVOCATION_FINISHED",
            Event::InvocationFailed => "INVOCATION_FAILED",
            Event::WorkerStart => "WORKER_START",
            Event::WorkerStop => "WORKER_STOP",

            Event::SinkFailed => "SINK_FAILED",
        }
    }

    /// Severity the event is logged at.
    pub fn severity(&self) -> Severity {
        match self {
            Event::TransactionBegin | Event::TransactionNoop | Event::InvocationEnqueued => {
                Severity::Trace
            }
            Event::TransactionAborted | Event::InvocationRejected | Event::InvocationFailed => {
                Severity::Warn
            }
            Event::SinkFailed => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
