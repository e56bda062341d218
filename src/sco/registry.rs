//! # Operation Registry
//!
//! The controller of one structural scope: owns the operations below its
//! SCO descriptor and the worker that executes them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::errors::{ScoError, ScoResult};
use super::handlers::HandlerProvider;
use super::invocation::{
    Invocation, InvocationError, InvocationReportSink, InvocationResponse, TransactionId,
};
use super::operation::{InvocationRequest, Operation, OperationKind};
use super::worker::{OperationWorker, WorkerConfig};
use crate::mdib::{Handle, MdibResult, NodeType, OperatingMode, TransactionManager};
use crate::observability::{log_event, Event, MetricsRegistry};

/// Registry of invocable operations
#[derive(Debug)]
pub struct OperationRegistry {
    /// Handle of the SCO descriptor this controller is rooted at
    sco_handle: Handle,

    /// Operations by handle
    operations: RwLock<HashMap<Handle, Operation>>,

    worker: OperationWorker,
    transactions: Arc<TransactionManager>,
    metrics: Arc<MetricsRegistry>,
}

impl OperationRegistry {
    /// Create a controller for an existing SCO handle
    pub fn new(
        sco_handle: impl Into<Handle>,
        transactions: Arc<TransactionManager>,
        metrics: Arc<MetricsRegistry>,
        worker_config: WorkerConfig,
    ) -> Self {
        let worker = OperationWorker::new(
            worker_config,
            Arc::clone(&transactions),
            Arc::clone(&metrics),
        );
        Self {
            sco_handle: sco_handle.into(),
            operations: RwLock::new(HashMap::new()),
            worker,
            transactions,
            metrics,
        }
    }

    /// Create a controller below `root_handle`, reusing its SCO descriptor
    /// or inserting `<root>.sco` if there is none.
    pub fn for_root(
        root_handle: &str,
        transactions: Arc<TransactionManager>,
        metrics: Arc<MetricsRegistry>,
        worker_config: WorkerConfig,
    ) -> ScoResult<Self> {
        let store = transactions.store();
        store.by_handle(root_handle)?;

        let existing = store
            .by_parent_handle(root_handle)
            .into_iter()
            .find(|e| e.node_type() == NodeType::Sco)
            .map(|e| e.handle().to_string());

        let sco_handle = match existing {
            Some(handle) => handle,
            None => {
                let handle = format!("{root_handle}.sco");
                transactions.descriptor_transaction(|tx| -> MdibResult<()> {
                    tx.insert_new(NodeType::Sco, &handle, Some(root_handle))
                })?;
                handle
            }
        };

        Ok(Self::new(sco_handle, transactions, metrics, worker_config))
    }

    pub fn sco_handle(&self) -> &str {
        &self.sco_handle
    }

    pub fn worker(&self) -> &OperationWorker {
        &self.worker
    }

    /// Register an operation, replacing any operation with the same handle
    pub fn register(&self, operation: Operation) -> ScoResult<()> {
        let handle = operation.handle.clone();
        let kind = format!("{:?}", operation.kind);
        {
            let mut operations = self.operations.write().map_err(|_| ScoError::poisoned())?;
            operations.insert(handle.clone(), operation);
        }
        log_event(
            Event::OperationRegistered,
            &[("operation", handle.as_str()), ("kind", kind.as_str())],
        );
        Ok(())
    }

    pub fn unregister(&self, handle: &str) -> ScoResult<Operation> {
        let removed = {
            let mut operations = self.operations.write().map_err(|_| ScoError::poisoned())?;
            operations.remove(handle)
        };
        let operation = removed.ok_or_else(|| ScoError::not_found(handle))?;
        log_event(Event::OperationUnregistered, &[("operation", handle)]);
        Ok(operation)
    }

    pub fn resolve(&self, handle: &str) -> Option<Operation> {
        self.operations
            .read()
            .ok()
            .and_then(|operations| operations.get(handle).cloned())
    }

    /// Resolve or fail with `NotFound`
    pub fn route(&self, handle: &str) -> ScoResult<Operation> {
        self.resolve(handle).ok_or_else(|| ScoError::not_found(handle))
    }

    /// All registered operations, by handle
    pub fn operations(&self) -> Vec<Operation> {
        let mut out: Vec<Operation> = match self.operations.read() {
            Ok(operations) => operations.values().cloned().collect(),
            Err(_) => Vec::new(),
        };
        out.sort_by(|a, b| a.handle.cmp(&b.handle));
        out
    }

    /// Register every operation descriptor below the SCO, using handlers
    /// chosen by `provider`. Returns the number registered.
    pub fn register_from_store(&self, provider: &dyn HandlerProvider) -> ScoResult<usize> {
        let snapshot = self.transactions.store().snapshot();
        snapshot.by_handle(&self.sco_handle)?;

        let mut count = 0;
        for handle in snapshot.subtree(&self.sco_handle) {
            let Some(entity) = snapshot.get(&handle) else {
                continue;
            };
            let Some(kind) = OperationKind::from_node_type(entity.node_type()) else {
                continue;
            };
            let Some(handler) = provider.handler(kind, entity.descriptor()) else {
                continue;
            };
            self.register(Operation::from_descriptor(entity.descriptor(), handler)?)?;
            count += 1;
        }
        Ok(count)
    }

    /// Queue an invocation of a registered operation
    pub fn enqueue(&self, request: InvocationRequest) -> ScoResult<TransactionId> {
        let operation = self.route(&request.operation_handle)?;
        self.worker.enqueue(operation, request)
    }

    /// Enqueue and answer synchronously.
    ///
    /// An unknown handle is answered FAILED / InvalidValue without a
    /// transaction id; a full queue FAILED / Other.
    pub fn invoke(&self, request: InvocationRequest) -> InvocationResponse {
        let operation_handle = request.operation_handle.clone();
        match self.enqueue(request) {
            Ok(transaction_id) => {
                InvocationResponse::waiting(transaction_id, self.transactions.store().version_group())
            }
            Err(err) => {
                let error = match err {
                    ScoError::NotFound { .. } => {
                        self.metrics.increment_invocations_rejected();
                        log_event(
                            Event::InvocationRejected,
                            &[
                                ("operation", operation_handle.as_str()),
                                ("error", "unknown operation"),
                            ],
                        );
                        InvocationError::InvalidValue
                    }
                    _ => InvocationError::Other,
                };
                InvocationResponse::refused(
                    error,
                    err.to_string(),
                    self.transactions.store().version_group(),
                )
            }
        }
    }

    /// Write the operating mode of an operation into its operational state
    pub fn set_operating_mode(&self, handle: &str, mode: OperatingMode) -> ScoResult<()> {
        self.transactions
            .operational_state_transaction(|tx| -> MdibResult<()> {
                if let Some(state) = tx.state_mut(handle)?.as_operational_mut() {
                    state.operating_mode = mode;
                }
                Ok(())
            })?;
        Ok(())
    }

    pub fn add_report_sink(&self, sink: Arc<dyn InvocationReportSink>) {
        self.worker.add_report_sink(sink);
    }

    pub fn invocation(&self, transaction_id: TransactionId) -> Option<Invocation> {
        self.worker.invocation(transaction_id)
    }

    pub fn start(&self) -> ScoResult<()> {
        self.worker.start()
    }

    pub fn stop(&self) -> ScoResult<()> {
        self.worker.stop()
    }
}
