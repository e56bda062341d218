//! # Operations
//!
//! An operation is a remotely invocable handle bound to a handler body.
//! The set of operation kinds is closed; construction from a descriptor
//! dispatches on `NodeType`.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::errors::{ScoError, ScoResult};
use super::invocation::{InvocationError, TransactionId};
use crate::mdib::{
    Descriptor, EntityStore, Handle, MdibError, NodeType, OperatingMode, State,
    TransactionKind, TransactionManager,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OperationKind {
    SetValue,
    SetString,
    Activate,
    SetContextState,
    SetAlertState,
    SetComponentState,
    SetMetricState,
}

impl OperationKind {
    pub fn from_node_type(node_type: NodeType) -> Option<Self> {
        match node_type {
            NodeType::SetValueOperation => Some(OperationKind::SetValue),
            NodeType::SetStringOperation => Some(OperationKind::SetString),
            NodeType::ActivateOperation => Some(OperationKind::Activate),
            NodeType::SetContextStateOperation => Some(OperationKind::SetContextState),
            NodeType::SetAlertStateOperation => Some(OperationKind::SetAlertState),
            NodeType::SetComponentStateOperation => Some(OperationKind::SetComponentState),
            NodeType::SetMetricStateOperation => Some(OperationKind::SetMetricState),
            _ => None,
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            OperationKind::SetValue => NodeType::SetValueOperation,
            OperationKind::SetString => NodeType::SetStringOperation,
            OperationKind::Activate => NodeType::ActivateOperation,
            OperationKind::SetContextState => NodeType::SetContextStateOperation,
            OperationKind::SetAlertState => NodeType::SetAlertStateOperation,
            OperationKind::SetComponentState => NodeType::SetComponentStateOperation,
            OperationKind::SetMetricState => NodeType::SetMetricStateOperation,
        }
    }

    /// Transaction kind the built-in handler writes through. Activate has
    /// none; its effect is up to the callback.
    pub fn transaction_kind(&self) -> Option<TransactionKind> {
        match self {
            OperationKind::SetValue | OperationKind::SetString | OperationKind::SetMetricState => {
                Some(TransactionKind::Metric)
            }
            OperationKind::SetAlertState => Some(TransactionKind::Alert),
            OperationKind::SetComponentState => Some(TransactionKind::Component),
            OperationKind::SetContextState => Some(TransactionKind::Context),
            OperationKind::Activate => None,
        }
    }
}

/// Payload of an invocation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OperationArgument {
    None,
    Numeric(f64),
    Text(String),
    /// Activate arguments
    Arguments(Vec<String>),
    /// Proposed states for the set-*-state operations
    States(Vec<State>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationRequest {
    pub operation_handle: Handle,
    pub argument: OperationArgument,
    pub requested_at: DateTime<Utc>,
    pub caller: Option<String>,
}

impl InvocationRequest {
    pub fn new(operation_handle: impl Into<Handle>, argument: OperationArgument) -> Self {
        Self {
            operation_handle: operation_handle.into(),
            argument,
            requested_at: Utc::now(),
            caller: None,
        }
    }

    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }
}

/// Why a handler body failed. Becomes a FAILED report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationFailure {
    pub error: InvocationError,
    pub message: String,
}

impl InvocationFailure {
    pub fn new(error: InvocationError, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
        }
    }

    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::new(InvocationError::InvalidValue, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(InvocationError::Other, message)
    }
}

impl fmt::Display for InvocationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl From<MdibError> for InvocationFailure {
    fn from(err: MdibError) -> Self {
        InvocationFailure::other(err.to_string())
    }
}

/// Everything a handler body may use.
pub struct HandlerContext<'a> {
    pub operation: &'a Operation,
    pub request: &'a InvocationRequest,
    pub transactions: &'a TransactionManager,
    pub transaction_id: TransactionId,
}

/// Handler body of an operation. Runs on the controller's worker thread.
pub trait OperationHandler: Send + Sync {
    fn handle(&self, ctx: &HandlerContext<'_>) -> Result<(), InvocationFailure>;
}

impl<F> OperationHandler for F
where
    F: Fn(&HandlerContext<'_>) -> Result<(), InvocationFailure> + Send + Sync,
{
    fn handle(&self, ctx: &HandlerContext<'_>) -> Result<(), InvocationFailure> {
        self(ctx)
    }
}

/// Wrap a closure as a shareable handler.
pub fn handler_fn<F>(f: F) -> Arc<dyn OperationHandler>
where
    F: Fn(&HandlerContext<'_>) -> Result<(), InvocationFailure> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A registered, invocable operation.
#[derive(Clone)]
pub struct Operation {
    pub handle: Handle,
    pub target_handle: Handle,
    pub kind: OperationKind,
    pub handler: Arc<dyn OperationHandler>,
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("handle", &self.handle)
            .field("target_handle", &self.target_handle)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Operation {
    pub fn new(
        handle: impl Into<Handle>,
        target_handle: impl Into<Handle>,
        kind: OperationKind,
        handler: Arc<dyn OperationHandler>,
    ) -> Self {
        Self {
            handle: handle.into(),
            target_handle: target_handle.into(),
            kind,
            handler,
        }
    }

    /// Build from an operation descriptor.
    pub fn from_descriptor(
        descriptor: &Descriptor,
        handler: Arc<dyn OperationHandler>,
    ) -> ScoResult<Self> {
        let kind = OperationKind::from_node_type(descriptor.node_type).ok_or_else(|| {
            ScoError::Mdib(MdibError::InvalidStructure(format!(
                "'{}' is a {} descriptor, not an operation",
                descriptor.handle, descriptor.node_type
            )))
        })?;
        let target = descriptor.operation_target.clone().ok_or_else(|| {
            ScoError::Mdib(MdibError::InvalidStructure(format!(
                "operation '{}' has no target",
                descriptor.handle
            )))
        })?;
        Ok(Self::new(descriptor.handle.clone(), target, kind, handler))
    }

    /// Operating mode from the operational state; operations without one
    /// in the store count as enabled.
    pub fn operating_mode(&self, store: &EntityStore) -> OperatingMode {
        store
            .state(&self.handle)
            .ok()
            .and_then(|s| s.as_operational().map(|o| o.operating_mode))
            .unwrap_or(OperatingMode::Enabled)
    }
}
