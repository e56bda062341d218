//! Descriptor and state vocabulary
//!
//! Descriptors are structural nodes of the information base; states carry
//! their live values. Both are plain data: the tree is an arena keyed by
//! handle, and parent links are handles, never references.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unique, immutable name of a descriptor or of a context state.
pub type Handle = String;

/// Default coding system (ISO/IEEE 11073-10101 nomenclature).
pub const DEFAULT_CODING_SYSTEM: &str = "urn:oid:1.2.840.10004.1.1.1.0.0.1";

/// State category of a node type.
///
/// A transaction kind may only write states of its own category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateCategory {
    Component,
    Metric,
    RealTimeSample,
    Alert,
    Context,
    Operational,
}

impl StateCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateCategory::Component => "component",
            StateCategory::Metric => "metric",
            StateCategory::RealTimeSample => "rt_sample",
            StateCategory::Alert => "alert",
            StateCategory::Context => "context",
            StateCategory::Operational => "operational",
        }
    }
}

impl fmt::Display for StateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain subtype of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeType {
    // Components
    Mds,
    Vmd,
    Channel,
    Sco,
    SystemContext,
    Battery,
    Clock,
    // Metrics
    NumericMetric,
    StringMetric,
    EnumStringMetric,
    RealTimeSampleArrayMetric,
    // Alerts
    AlertSystem,
    AlertCondition,
    LimitAlertCondition,
    AlertSignal,
    // Contexts
    PatientContext,
    LocationContext,
    EnsembleContext,
    WorkflowContext,
    OperatorContext,
    MeansContext,
    // Operations
    SetValueOperation,
    SetStringOperation,
    ActivateOperation,
    SetContextStateOperation,
    SetAlertStateOperation,
    SetComponentStateOperation,
    SetMetricStateOperation,
}

impl NodeType {
    /// Category of the states this node type owns.
    pub fn category(&self) -> StateCategory {
        use NodeType::*;
        match self {
            Mds | Vmd | Channel | Sco | SystemContext | Battery | Clock => StateCategory::Component,
            NumericMetric | StringMetric | EnumStringMetric => StateCategory::Metric,
            RealTimeSampleArrayMetric => StateCategory::RealTimeSample,
            AlertSystem | AlertCondition | LimitAlertCondition | AlertSignal => StateCategory::Alert,
            PatientContext | LocationContext | EnsembleContext | WorkflowContext
            | OperatorContext | MeansContext => StateCategory::Context,
            SetValueOperation
            | SetStringOperation
            | ActivateOperation
            | SetContextStateOperation
            | SetAlertStateOperation
            | SetComponentStateOperation
            | SetMetricStateOperation => StateCategory::Operational,
        }
    }

    /// Context descriptors own zero or more states, each with its own handle.
    pub fn is_multi_state(&self) -> bool {
        self.category() == StateCategory::Context
    }

    pub fn is_operation(&self) -> bool {
        self.category() == StateCategory::Operational
    }

    pub fn is_alert_condition(&self) -> bool {
        matches!(self, NodeType::AlertCondition | NodeType::LimitAlertCondition)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Coded value identifying what a descriptor represents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coding {
    pub code: String,
    pub coding_system: String,
}

impl Coding {
    /// Code in the default coding system.
    pub fn new(code: impl Into<String>) -> Self {
        Self::with_system(code, DEFAULT_CODING_SYSTEM)
    }

    pub fn with_system(code: impl Into<String>, coding_system: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            coding_system: coding_system.into(),
        }
    }
}

/// Structural node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub handle: Handle,
    pub parent_handle: Option<Handle>,
    pub node_type: NodeType,
    pub descriptor_version: u64,
    pub coding: Option<Coding>,
    /// Entity an operation acts on (operation descriptors only).
    pub operation_target: Option<Handle>,
    /// Type-specific fields owned by the external codec.
    #[serde(default)]
    pub extension: BTreeMap<String, Value>,
}

impl Descriptor {
    pub fn new(node_type: NodeType, handle: impl Into<Handle>, parent_handle: Option<&str>) -> Self {
        Self {
            handle: handle.into(),
            parent_handle: parent_handle.map(str::to_string),
            node_type,
            descriptor_version: 0,
            coding: None,
            operation_target: None,
            extension: BTreeMap::new(),
        }
    }

    pub fn with_coding(mut self, coding: Coding) -> Self {
        self.coding = Some(coding);
        self
    }

    pub fn with_operation_target(mut self, target: impl Into<Handle>) -> Self {
        self.operation_target = Some(target.into());
        self
    }

    pub fn category(&self) -> StateCategory {
        self.node_type.category()
    }
}

/// Activation of components and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentActivation {
    On,
    NotReady,
    StandBy,
    Off,
    Shutdown,
    Failure,
}

/// Activation of alert systems, conditions and signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertActivation {
    On,
    Off,
    Paused,
}

/// Whether an operation can currently be invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatingMode {
    Enabled,
    Disabled,
    NotAvailable,
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperatingMode::Enabled => "En",
            OperatingMode::Disabled => "Dis",
            OperatingMode::NotAvailable => "NA",
        };
        f.write_str(name)
    }
}

/// Association of a context state with its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContextAssociation {
    NotAssociated,
    PreAssociated,
    Associated,
    Disassociated,
}

/// Observed value of a metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetricValue {
    Numeric(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricState {
    pub activation: ComponentActivation,
    pub value: Option<MetricValue>,
    pub determination_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealTimeSampleState {
    pub activation: ComponentActivation,
    pub samples: Vec<f64>,
    pub determination_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertState {
    pub activation: AlertActivation,
    /// Condition / signal presence; absent for alert systems.
    pub presence: Option<bool>,
    pub determination_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentState {
    pub activation: ComponentActivation,
    pub operating_hours: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextState {
    pub association: ContextAssociation,
    pub identification: Vec<String>,
    pub binding_mdib_version: Option<u64>,
    pub unbinding_mdib_version: Option<u64>,
    pub binding_start_time: Option<DateTime<Utc>>,
    pub binding_end_time: Option<DateTime<Utc>>,
}

impl ContextState {
    pub fn is_associated(&self) -> bool {
        self.association == ContextAssociation::Associated
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationalState {
    pub operating_mode: OperatingMode,
}

/// Category-specific payload of a state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateBody {
    Metric(MetricState),
    RealTimeSample(RealTimeSampleState),
    Alert(AlertState),
    Component(ComponentState),
    Context(ContextState),
    Operational(OperationalState),
}

impl StateBody {
    pub fn category(&self) -> StateCategory {
        match self {
            StateBody::Metric(_) => StateCategory::Metric,
            StateBody::RealTimeSample(_) => StateCategory::RealTimeSample,
            StateBody::Alert(_) => StateCategory::Alert,
            StateBody::Component(_) => StateCategory::Component,
            StateBody::Context(_) => StateCategory::Context,
            StateBody::Operational(_) => StateCategory::Operational,
        }
    }
}

/// Value node.
///
/// Single-state categories use `handle == None` and are addressed by
/// `descriptor_handle`; context states carry their own handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub descriptor_handle: Handle,
    pub handle: Option<Handle>,
    pub state_version: u64,
    pub descriptor_version: u64,
    pub body: StateBody,
}

impl State {
    pub fn new(descriptor_handle: impl Into<Handle>, body: StateBody) -> Self {
        Self {
            descriptor_handle: descriptor_handle.into(),
            handle: None,
            state_version: 0,
            descriptor_version: 0,
            body,
        }
    }

    pub fn with_handle(mut self, handle: impl Into<Handle>) -> Self {
        self.handle = Some(handle.into());
        self
    }

    /// Handle the store addresses this state by.
    pub fn key(&self) -> &str {
        self.handle.as_deref().unwrap_or(&self.descriptor_handle)
    }

    pub fn category(&self) -> StateCategory {
        self.body.category()
    }

    pub fn as_metric(&self) -> Option<&MetricState> {
        match &self.body {
            StateBody::Metric(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_metric_mut(&mut self) -> Option<&mut MetricState> {
        match &mut self.body {
            StateBody::Metric(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_alert(&self) -> Option<&AlertState> {
        match &self.body {
            StateBody::Alert(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_alert_mut(&mut self) -> Option<&mut AlertState> {
        match &mut self.body {
            StateBody::Alert(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_component_mut(&mut self) -> Option<&mut ComponentState> {
        match &mut self.body {
            StateBody::Component(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_context(&self) -> Option<&ContextState> {
        match &self.body {
            StateBody::Context(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_context_mut(&mut self) -> Option<&mut ContextState> {
        match &mut self.body {
            StateBody::Context(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_operational(&self) -> Option<&OperationalState> {
        match &self.body {
            StateBody::Operational(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_operational_mut(&mut self) -> Option<&mut OperationalState> {
        match &mut self.body {
            StateBody::Operational(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_rt_sample_mut(&mut self) -> Option<&mut RealTimeSampleState> {
        match &mut self.body {
            StateBody::RealTimeSample(s) => Some(s),
            _ => None,
        }
    }
}
