//! # Reports
//!
//! Maps committed change-sets and invocation notifications onto the report
//! families an eventing layer publishes, and fans them out to async
//! subscribers over a `tokio` broadcast channel.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::mdib::{
    ChangeSink, Descriptor, MdibVersionGroup, SinkError, State, StateCategory, TransactionResult,
};
use crate::sco::{InvocationReport, InvocationReportSink};

/// One outbound report, stamped with the version group it describes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Report {
    DescriptionModification {
        version: MdibVersionGroup,
        created: Vec<Descriptor>,
        updated: Vec<Descriptor>,
        deleted: Vec<Descriptor>,
        /// States of created and updated descriptors
        states: Vec<State>,
    },
    EpisodicMetric {
        version: MdibVersionGroup,
        states: Vec<State>,
    },
    EpisodicAlert {
        version: MdibVersionGroup,
        states: Vec<State>,
    },
    EpisodicComponent {
        version: MdibVersionGroup,
        states: Vec<State>,
    },
    EpisodicContext {
        version: MdibVersionGroup,
        states: Vec<State>,
    },
    EpisodicOperationalState {
        version: MdibVersionGroup,
        states: Vec<State>,
    },
    WaveformStream {
        version: MdibVersionGroup,
        states: Vec<State>,
    },
    OperationInvoked {
        report: InvocationReport,
    },
}

const EPISODIC_ORDER: [StateCategory; 6] = [
    StateCategory::Metric,
    StateCategory::Alert,
    StateCategory::Component,
    StateCategory::Context,
    StateCategory::Operational,
    StateCategory::RealTimeSample,
];

impl Report {
    pub fn version(&self) -> &MdibVersionGroup {
        match self {
            Report::DescriptionModification { version, .. }
            | Report::EpisodicMetric { version, .. }
            | Report::EpisodicAlert { version, .. }
            | Report::EpisodicComponent { version, .. }
            | Report::EpisodicContext { version, .. }
            | Report::EpisodicOperationalState { version, .. }
            | Report::WaveformStream { version, .. } => version,
            Report::OperationInvoked { report } => &report.version,
        }
    }

    fn episodic(category: StateCategory, version: MdibVersionGroup, states: Vec<State>) -> Self {
        match category {
            StateCategory::Metric => Report::EpisodicMetric { version, states },
            StateCategory::Alert => Report::EpisodicAlert { version, states },
            StateCategory::Component => Report::EpisodicComponent { version, states },
            StateCategory::Context => Report::EpisodicContext { version, states },
            StateCategory::Operational => Report::EpisodicOperationalState { version, states },
            StateCategory::RealTimeSample => Report::WaveformStream { version, states },
        }
    }

    /// Reports for one committed transaction.
    ///
    /// Structural changes become a single description modification report
    /// carrying the affected states; otherwise one episodic report per
    /// non-empty state category.
    pub fn from_transaction(result: &TransactionResult, version: &MdibVersionGroup) -> Vec<Report> {
        if result.has_descriptor_updates() {
            return vec![Report::DescriptionModification {
                version: version.clone(),
                created: result.descr_created.clone(),
                updated: result.descr_updated.clone(),
                deleted: result.descr_deleted.clone(),
                states: result.all_states().cloned().collect(),
            }];
        }

        EPISODIC_ORDER
            .iter()
            .filter(|category| !result.states(**category).is_empty())
            .map(|category| {
                Report::episodic(*category, version.clone(), result.states(*category).to_vec())
            })
            .collect()
    }
}

/// Fan-out of reports to any number of async receivers.
///
/// Publishing never blocks and never fails for lack of receivers; slow
/// receivers observe `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct ReportBroadcaster {
    sender: broadcast::Sender<Report>,
}

impl ReportBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Report> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish one report; returns the number of receivers reached.
    pub fn publish(&self, report: Report) -> usize {
        self.sender.send(report).unwrap_or(0)
    }
}

impl ChangeSink for ReportBroadcaster {
    fn on_commit(
        &self,
        result: &TransactionResult,
        version: &MdibVersionGroup,
    ) -> Result<(), SinkError> {
        for report in Report::from_transaction(result, version) {
            self.publish(report);
        }
        Ok(())
    }
}

impl InvocationReportSink for ReportBroadcaster {
    fn on_invocation(&self, report: &InvocationReport) -> Result<(), SinkError> {
        self.publish(Report::OperationInvoked {
            report: report.clone(),
        });
        Ok(())
    }
}
