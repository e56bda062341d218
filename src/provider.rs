//! # Provider
//!
//! Device-side assembly: one store with its transaction manager, shared
//! metrics, a report broadcaster, and one controller per root descriptor.
//! All controllers funnel their writes through the same manager.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;

use crate::config::{ConfigResult, ProviderConfig};
use crate::mdib::{
    ChangeSink, DefaultEntityFactory, EntityFactory, EntityStore, TransactionManager,
};
use crate::observability::{log_event, Event, Logger, MetricsRegistry};
use crate::reports::{Report, ReportBroadcaster};
use crate::sco::{
    InvocationError, InvocationReportSink, InvocationRequest, InvocationResponse,
    OperationRegistry, ScoError, ScoResult, TransactionIdSource, WorkerConfig,
};

pub struct Provider {
    config: ProviderConfig,
    metrics: Arc<MetricsRegistry>,
    transactions: Arc<TransactionManager>,
    reports: ReportBroadcaster,
    controllers: RwLock<Vec<Arc<OperationRegistry>>>,
    invocation_sinks: RwLock<Vec<Arc<dyn InvocationReportSink>>>,
    /// One id sequence for every controller of this provider
    transaction_ids: TransactionIdSource,
    running: AtomicBool,
}

impl Provider {
    pub fn new(config: ProviderConfig) -> ConfigResult<Self> {
        Self::with_factory(config, Arc::new(DefaultEntityFactory))
    }

    /// Provider whose descriptors and states are shaped by `factory`.
    pub fn with_factory(
        config: ProviderConfig,
        factory: Arc<dyn EntityFactory>,
    ) -> ConfigResult<Self> {
        config.validate()?;
        Logger::set_min_severity(config.log_level);

        let metrics = Arc::new(MetricsRegistry::new());
        let store = Arc::new(EntityStore::new(
            config.resolve_sequence_id(),
            config.instance_id,
        ));
        let transactions = Arc::new(TransactionManager::new(
            store,
            factory,
            Arc::clone(&metrics),
        ));
        let reports = ReportBroadcaster::new(config.report_channel_capacity);
        transactions.add_change_sink(Arc::new(reports.clone()));

        Ok(Self {
            config,
            metrics,
            transactions,
            reports,
            controllers: RwLock::new(Vec::new()),
            invocation_sinks: RwLock::new(Vec::new()),
            transaction_ids: TransactionIdSource::new(),
            running: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn transactions(&self) -> &Arc<TransactionManager> {
        &self.transactions
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        self.transactions.store()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Add a controller below `root_handle` (see `OperationRegistry::for_root`).
    /// Started right away when the provider is running.
    pub fn add_controller(&self, root_handle: &str) -> ScoResult<Arc<OperationRegistry>> {
        let worker_config = WorkerConfig {
            queue_capacity: self.config.worker_queue_capacity,
            thread_name: format!("{}-{}", self.config.worker_thread_prefix, root_handle),
            transaction_ids: self.transaction_ids.clone(),
        };
        let controller = Arc::new(OperationRegistry::for_root(
            root_handle,
            Arc::clone(&self.transactions),
            Arc::clone(&self.metrics),
            worker_config,
        )?);

        controller.add_report_sink(Arc::new(self.reports.clone()));
        {
            let sinks = self
                .invocation_sinks
                .read()
                .map_err(|_| ScoError::poisoned())?;
            for sink in sinks.iter() {
                controller.add_report_sink(Arc::clone(sink));
            }
        }
        if self.is_running() {
            controller.start()?;
        }

        self.controllers
            .write()
            .map_err(|_| ScoError::poisoned())?
            .push(Arc::clone(&controller));
        Ok(controller)
    }

    /// Controller by its SCO handle.
    pub fn controller(&self, sco_handle: &str) -> Option<Arc<OperationRegistry>> {
        self.controllers
            .read()
            .ok()?
            .iter()
            .find(|c| c.sco_handle() == sco_handle)
            .cloned()
    }

    pub fn controllers(&self) -> Vec<Arc<OperationRegistry>> {
        self.controllers
            .read()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Start every controller's worker that is not running yet.
    pub fn start(&self) -> ScoResult<()> {
        for controller in self.controllers() {
            if !controller.worker().is_running() {
                controller.start()?;
            }
        }
        self.running.store(true, Ordering::SeqCst);
        log_event(
            Event::ProviderStart,
            &[
                ("sequence_id", self.store().sequence_id().as_str()),
                ("controllers", self.controllers().len().to_string().as_str()),
            ],
        );
        Ok(())
    }

    /// Stop every worker after its queued work is done.
    pub fn stop(&self) -> ScoResult<()> {
        self.running.store(false, Ordering::SeqCst);
        for controller in self.controllers() {
            controller.stop()?;
        }
        log_event(
            Event::ProviderStop,
            &[("mdib_version", self.store().mdib_version().to_string().as_str())],
        );
        Ok(())
    }

    /// Route a request to the controller that knows its operation.
    pub fn invoke(&self, request: InvocationRequest) -> InvocationResponse {
        let controller = self
            .controllers()
            .into_iter()
            .find(|c| c.resolve(&request.operation_handle).is_some());

        match controller {
            Some(controller) => controller.invoke(request),
            None => {
                self.metrics.increment_invocations_rejected();
                log_event(
                    Event::InvocationRejected,
                    &[
                        ("operation", request.operation_handle.as_str()),
                        ("error", "unknown operation"),
                    ],
                );
                InvocationResponse::refused(
                    InvocationError::InvalidValue,
                    ScoError::not_found(request.operation_handle).to_string(),
                    self.store().version_group(),
                )
            }
        }
    }

    /// Async stream of every report this provider emits.
    pub fn subscribe_reports(&self) -> broadcast::Receiver<Report> {
        self.reports.subscribe()
    }

    pub fn add_change_sink(&self, sink: Arc<dyn ChangeSink>) {
        self.transactions.add_change_sink(sink);
    }

    /// Attach an invocation sink to current and future controllers.
    pub fn add_invocation_sink(&self, sink: Arc<dyn InvocationReportSink>) -> ScoResult<()> {
        for controller in self.controllers() {
            controller.add_report_sink(Arc::clone(&sink));
        }
        self.invocation_sinks
            .write()
            .map_err(|_| ScoError::poisoned())?
            .push(sink);
        Ok(())
    }
}
