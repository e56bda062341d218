//! # Service Control Object
//!
//! Remotely invocable operations and their execution:
//! - `OperationRegistry` - controller: register, resolve, route
//! - `OperationWorker` - bounded FIFO with one sequential consumer
//! - Built-in handlers for every operation kind
//!
//! Invocation failures never cross the worker as errors; they are
//! reported as FAILED invocation states.

pub mod errors;
pub mod handlers;
pub mod invocation;
pub mod operation;
pub mod registry;
pub mod worker;

pub use errors::{ScoError, ScoResult};
pub use handlers::{
    activate_fn, ActivateCallback, ActivateHandler, DefaultHandlers, HandlerProvider,
    SetAlertStateHandler, SetComponentStateHandler, SetContextStateHandler,
    SetMetricStateHandler, SetStringHandler, SetValueHandler,
};
pub use invocation::{
    Invocation, InvocationError, InvocationReport, InvocationReportSink, InvocationResponse,
    InvocationState, TransactionId, TransactionIdSource,
};
pub use operation::{
    handler_fn, HandlerContext, InvocationFailure, InvocationRequest, Operation,
    OperationArgument, OperationHandler, OperationKind,
};
pub use registry::OperationRegistry;
pub use worker::{OperationWorker, WorkerConfig};
