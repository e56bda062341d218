//! Operation Worker - one sequential consumer per controller
//!
//! - `enqueue` never blocks: bounded queue, fails fast when full
//! - Transaction ids are assigned under the enqueue lock and only for
//!   requests that actually entered the queue (no gaps, no duplicates)
//! - Per invocation: WAIT, START, then exactly one terminal report
//! - Handler failures and panics fail only their own invocation
//! - `stop` sends a sentinel behind all queued work and joins the thread

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::{self, JoinHandle};

use super::errors::{ScoError, ScoResult};
use super::invocation::{
    Invocation, InvocationReport, InvocationReportSink, InvocationState, TransactionId,
    TransactionIdSource,
};
use super::operation::{HandlerContext, InvocationFailure, InvocationRequest, Operation};
use crate::mdib::{OperatingMode, TransactionManager};
use crate::observability::{log_event, Event, MetricsRegistry};

/// Queue sizing, thread naming and id source of a worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub queue_capacity: usize,
    pub thread_name: String,
    /// Workers sharing a store share this to keep ids unique across them.
    pub transaction_ids: TransactionIdSource,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            thread_name: "sco-worker".to_string(),
            transaction_ids: TransactionIdSource::new(),
        }
    }
}

struct Job {
    transaction_id: TransactionId,
    operation: Operation,
    request: InvocationRequest,
}

enum Message {
    Invoke(Job),
    Stop,
}

struct EnqueueSide {
    sender: SyncSender<Message>,
    stopped: bool,
}

/// State shared between callers and the worker thread.
struct Shared {
    transactions: Arc<TransactionManager>,
    sinks: RwLock<Vec<Arc<dyn InvocationReportSink>>>,
    pending: Mutex<BTreeMap<TransactionId, Invocation>>,
    metrics: Arc<MetricsRegistry>,
}

impl Shared {
    fn lock_pending(&self) -> MutexGuard<'_, BTreeMap<TransactionId, Invocation>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, id: TransactionId, state: InvocationState) {
        if state.is_terminal() {
            self.lock_pending().remove(&id);
        } else if let Some(invocation) = self.lock_pending().get_mut(&id) {
            invocation.state = state;
        }
    }

    fn emit(&self, job: &Job, state: InvocationState, failure: Option<&InvocationFailure>) {
        self.set_state(job.transaction_id, state);
        let report = InvocationReport {
            version: self.transactions.store().version_group(),
            transaction_id: job.transaction_id,
            operation_handle: job.operation.handle.clone(),
            operation_target: Some(job.operation.target_handle.clone()),
            state,
            error: failure.map(|f| f.error),
            error_message: failure.map(|f| f.message.clone()),
        };

        let sinks = self.sinks.read().unwrap_or_else(|e| e.into_inner()).clone();
        for sink in sinks {
            if let Err(e) = sink.on_invocation(&report) {
                log_event(
                    Event::SinkFailed,
                    &[("sink", e.sink.as_str()), ("message", e.message.as_str())],
                );
            }
        }
    }

    fn process(&self, job: Job) {
        self.emit(&job, InvocationState::Wait, None);
        self.emit(&job, InvocationState::Start, None);

        let outcome = match job.operation.operating_mode(self.transactions.store()) {
            OperatingMode::Enabled => self.run_handler(&job),
            mode => Err(InvocationFailure::invalid_value(format!(
                "operation '{}' is not enabled (mode {})",
                job.operation.handle, mode
            ))),
        };

        let id = job.transaction_id.to_string();
        match outcome {
            Ok(()) => {
                self.metrics.increment_invocations_finished();
                log_event(
                    Event::InvocationFinished,
                    &[
                        ("operation", job.operation.handle.as_str()),
                        ("transaction_id", id.as_str()),
                    ],
                );
                self.emit(&job, InvocationState::Finished, None);
            }
            Err(failure) => {
                self.metrics.increment_invocations_failed();
                log_event(
                    Event::InvocationFailed,
                    &[
                        ("operation", job.operation.handle.as_str()),
                        ("transaction_id", id.as_str()),
                        ("error", failure.error.as_str()),
                        ("message", failure.message.as_str()),
                    ],
                );
                self.emit(&job, InvocationState::Failed, Some(&failure));
            }
        }
    }

    fn run_handler(&self, job: &Job) -> Result<(), InvocationFailure> {
        let ctx = HandlerContext {
            operation: &job.operation,
            request: &job.request,
            transactions: &self.transactions,
            transaction_id: job.transaction_id,
        };
        match panic::catch_unwind(AssertUnwindSafe(|| job.operation.handler.handle(&ctx))) {
            Ok(result) => result,
            Err(payload) => Err(InvocationFailure::other(panic_message(payload.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}

/// Bounded FIFO of invocations drained by one dedicated thread.
pub struct OperationWorker {
    config: WorkerConfig,
    shared: Arc<Shared>,
    enqueue_side: Mutex<EnqueueSide>,
    receiver: Mutex<Option<Receiver<Message>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl fmt::Debug for OperationWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationWorker")
            .field("config", &self.config)
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl OperationWorker {
    pub fn new(
        config: WorkerConfig,
        transactions: Arc<TransactionManager>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let (sender, receiver) = mpsc::sync_channel(config.queue_capacity.max(1));
        Self {
            config,
            shared: Arc::new(Shared {
                transactions,
                sinks: RwLock::new(Vec::new()),
                pending: Mutex::new(BTreeMap::new()),
                metrics,
            }),
            enqueue_side: Mutex::new(EnqueueSide {
                sender,
                stopped: false,
            }),
            receiver: Mutex::new(Some(receiver)),
            thread: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn add_report_sink(&self, sink: Arc<dyn InvocationReportSink>) {
        self.shared
            .sinks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(sink);
    }

    /// Spawn the worker thread.
    pub fn start(&self) -> ScoResult<()> {
        if self.lock_enqueue_side()?.stopped {
            return Err(ScoError::WorkerStopped);
        }
        let receiver = self
            .receiver
            .lock()
            .map_err(|_| ScoError::poisoned())?
            .take()
            .ok_or(ScoError::WorkerAlreadyStarted)?;

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || {
                while let Ok(message) = receiver.recv() {
                    match message {
                        Message::Invoke(job) => shared.process(job),
                        Message::Stop => break,
                    }
                }
            })
            .map_err(|e| ScoError::Internal(format!("failed to spawn worker: {e}")))?;

        *self.thread.lock().map_err(|_| ScoError::poisoned())? = Some(handle);
        self.started.store(true, Ordering::SeqCst);
        log_event(Event::WorkerStart, &[("thread", self.config.thread_name.as_str())]);
        Ok(())
    }

    /// Stop accepting work, finish everything queued, join the thread.
    ///
    /// A worker that was never started processes its queue on the calling
    /// thread. Calling `stop` twice is a no-op.
    pub fn stop(&self) -> ScoResult<()> {
        let mut thread_slot = self.thread.lock().map_err(|_| ScoError::poisoned())?;
        if thread_slot
            .as_ref()
            .map_or(false, |h| h.thread().id() == thread::current().id())
        {
            return Err(ScoError::Internal(
                "worker cannot stop itself from a handler".into(),
            ));
        }

        let sender = {
            let mut side = self.lock_enqueue_side()?;
            if side.stopped {
                return Ok(());
            }
            side.stopped = true;
            side.sender.clone()
        };

        let handle = thread_slot.take();
        drop(thread_slot);
        match handle {
            Some(handle) => {
                // queued work is ahead of the sentinel
                sender
                    .send(Message::Stop)
                    .map_err(|_| ScoError::Internal("worker thread exited early".into()))?;
                handle
                    .join()
                    .map_err(|_| ScoError::Internal("worker thread panicked".into()))?;
            }
            None => {
                let receiver = self
                    .receiver
                    .lock()
                    .map_err(|_| ScoError::poisoned())?
                    .take();
                if let Some(receiver) = receiver {
                    loop {
                        match receiver.try_recv() {
                            Ok(Message::Invoke(job)) => self.shared.process(job),
                            Ok(Message::Stop) | Err(TryRecvError::Empty) => break,
                            Err(TryRecvError::Disconnected) => break,
                        }
                    }
                }
            }
        }

        self.started.store(false, Ordering::SeqCst);
        log_event(Event::WorkerStop, &[("thread", self.config.thread_name.as_str())]);
        Ok(())
    }

    /// Queue an invocation. Returns as soon as the request is queued.
    pub fn enqueue(
        &self,
        operation: Operation,
        request: InvocationRequest,
    ) -> ScoResult<TransactionId> {
        let mut side = self.lock_enqueue_side()?;
        if side.stopped {
            return Err(ScoError::WorkerStopped);
        }

        // held until the send outcome is known so a refused request never
        // consumes an id
        let mut next_id = self.config.transaction_ids.lock();
        let transaction_id = TransactionId::new(*next_id);
        let operation_handle = operation.handle.clone();
        self.shared.lock_pending().insert(
            transaction_id,
            Invocation {
                transaction_id,
                operation_handle: operation_handle.clone(),
                state: InvocationState::Wait,
                enqueued_at: request.requested_at,
                caller: request.caller.clone(),
            },
        );

        let job = Job {
            transaction_id,
            operation,
            request,
        };
        match side.sender.try_send(Message::Invoke(job)) {
            Ok(()) => {
                *next_id += 1;
                self.shared.metrics.increment_invocations_enqueued();
                log_event(
                    Event::InvocationEnqueued,
                    &[
                        ("operation", operation_handle.as_str()),
                        ("transaction_id", transaction_id.to_string().as_str()),
                    ],
                );
                Ok(transaction_id)
            }
            Err(e) => {
                self.shared.lock_pending().remove(&transaction_id);
                let err = match e {
                    TrySendError::Full(_) => ScoError::Capacity {
                        capacity: self.config.queue_capacity,
                    },
                    TrySendError::Disconnected(_) => ScoError::WorkerStopped,
                };
                self.shared.metrics.increment_invocations_refused();
                log_event(
                    Event::InvocationRejected,
                    &[
                        ("operation", operation_handle.as_str()),
                        ("error", err.to_string().as_str()),
                    ],
                );
                Err(err)
            }
        }
    }

    /// A not yet terminated invocation.
    pub fn invocation(&self, transaction_id: TransactionId) -> Option<Invocation> {
        self.shared.lock_pending().get(&transaction_id).cloned()
    }

    /// Invocations that have not reached a terminal state, in id order.
    pub fn pending_invocations(&self) -> Vec<Invocation> {
        self.shared.lock_pending().values().cloned().collect()
    }

    pub fn transactions(&self) -> &Arc<TransactionManager> {
        &self.shared.transactions
    }

    fn lock_enqueue_side(&self) -> ScoResult<MutexGuard<'_, EnqueueSide>> {
        self.enqueue_side.lock().map_err(|_| ScoError::poisoned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mdib::{MdibResult, NodeType, SinkError};
    use crate::sco::operation::{handler_fn, OperationArgument, OperationKind};
    use std::sync::mpsc::Sender;
    use std::time::Duration;

    struct ChannelSink(Mutex<Sender<(u64, InvocationState)>>);

    impl InvocationReportSink for ChannelSink {
        fn on_invocation(&self, report: &InvocationReport) -> Result<(), SinkError> {
            self.0
                .lock()
                .unwrap()
                .send((report.transaction_id.value(), report.state))
                .map_err(|e| SinkError::new("channel", e.to_string()))
        }
    }

    fn manager() -> Arc<TransactionManager> {
        let tm = TransactionManager::with_sequence_id("urn:uuid:worker");
        tm.descriptor_transaction(|tx| -> MdibResult<()> {
            tx.insert_new(NodeType::Mds, "mds", None)?;
            tx.insert_new(NodeType::Sco, "sco", Some("mds"))?;
            tx.insert_new(NodeType::ActivateOperation, "op", Some("sco"))
        })
        .unwrap();
        Arc::new(tm)
    }

    fn worker(capacity: usize) -> OperationWorker {
        OperationWorker::new(
            WorkerConfig {
                queue_capacity: capacity,
                thread_name: "sco-worker-test".into(),
                ..WorkerConfig::default()
            },
            manager(),
            Arc::new(MetricsRegistry::new()),
        )
    }

    fn operation(handler: Arc<dyn crate::sco::OperationHandler>) -> Operation {
        Operation::new("op", "mds", OperationKind::Activate, handler)
    }

    fn request() -> InvocationRequest {
        InvocationRequest::new("op", OperationArgument::None)
    }

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let w = worker(4);
        let op = operation(handler_fn(|_| Ok(())));
        assert_eq!(w.enqueue(op.clone(), request()).unwrap().value(), 1);
        assert_eq!(w.enqueue(op, request()).unwrap().value(), 2);
        assert_eq!(w.pending_invocations().len(), 2);
        w.stop().unwrap();
        assert!(w.pending_invocations().is_empty());
    }

    #[test]
    fn test_full_queue_fails_fast_without_consuming_id() {
        let w = worker(1);
        let op = operation(handler_fn(|_| Ok(())));
        assert_eq!(w.enqueue(op.clone(), request()).unwrap().value(), 1);
        assert_eq!(
            w.enqueue(op.clone(), request()),
            Err(ScoError::Capacity { capacity: 1 })
        );
        w.stop().unwrap();
        assert_eq!(w.enqueue(op, request()), Err(ScoError::WorkerStopped));
    }

    #[test]
    fn test_report_sequence_on_thread() {
        let (tx, rx) = mpsc::channel();
        let w = worker(4);
        w.add_report_sink(Arc::new(ChannelSink(Mutex::new(tx))));
        w.start().unwrap();
        assert_eq!(w.start(), Err(ScoError::WorkerAlreadyStarted));

        w.enqueue(operation(handler_fn(|_| Ok(()))), request()).unwrap();
        let seen: Vec<_> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(
            seen,
            vec![
                (1, InvocationState::Wait),
                (1, InvocationState::Start),
                (1, InvocationState::Finished)
            ]
        );
        w.stop().unwrap();
    }

    #[test]
    fn test_panicking_handler_fails_only_itself() {
        let (tx, rx) = mpsc::channel();
        let w = worker(4);
        w.add_report_sink(Arc::new(ChannelSink(Mutex::new(tx))));

        w.enqueue(operation(handler_fn(|_| panic!("boom"))), request())
            .unwrap();
        w.enqueue(operation(handler_fn(|_| Ok(()))), request()).unwrap();
        w.stop().unwrap();

        let terminal: Vec<_> = rx.try_iter().filter(|(_, s)| s.is_terminal()).collect();
        assert_eq!(
            terminal,
            vec![(1, InvocationState::Failed), (2, InvocationState::Finished)]
        );
    }

    #[test]
    fn test_workers_sharing_id_source_never_collide() {
        let ids = TransactionIdSource::new();
        let tm = manager();
        let config = |name: &str| WorkerConfig {
            queue_capacity: 1,
            thread_name: name.into(),
            transaction_ids: ids.clone(),
        };
        let metrics = Arc::new(MetricsRegistry::new());
        let a = OperationWorker::new(config("a"), Arc::clone(&tm), Arc::clone(&metrics));
        let b = OperationWorker::new(config("b"), tm, metrics);
        let op = operation(handler_fn(|_| Ok(())));

        assert_eq!(a.enqueue(op.clone(), request()).unwrap().value(), 1);
        assert_eq!(
            a.enqueue(op.clone(), request()),
            Err(ScoError::Capacity { capacity: 1 })
        );
        assert_eq!(b.enqueue(op, request()).unwrap().value(), 2);
        assert_eq!(ids.peek(), TransactionId::new(3));

        a.stop().unwrap();
        b.stop().unwrap();
    }

    #[test]
    fn test_stop_from_own_handler_leaves_worker_joinable() {
        let (tx, rx) = mpsc::channel();
        let w = Arc::new(worker(4));
        let slot: Arc<Mutex<Option<Arc<OperationWorker>>>> = Arc::new(Mutex::new(None));
        *slot.lock().unwrap() = Some(Arc::clone(&w));

        let handler_slot = Arc::clone(&slot);
        let tx = Mutex::new(tx);
        let op = operation(handler_fn(move |_| {
            let worker = handler_slot.lock().unwrap().clone().unwrap();
            tx.lock().unwrap().send(worker.stop()).unwrap();
            Ok(())
        }));

        w.start().unwrap();
        w.enqueue(op, request()).unwrap();
        let inner = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(inner, Err(ScoError::Internal(_))));
        assert!(w.is_running());

        w.stop().unwrap();
        assert!(!w.is_running());
        assert_eq!(
            w.enqueue(operation(handler_fn(|_| Ok(()))), request()),
            Err(ScoError::WorkerStopped)
        );
        slot.lock().unwrap().take();
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("bad");
        assert_eq!(panic_message(payload.as_ref()), "handler panicked: bad");
    }
}
