//! Descriptor / state construction keyed by node type

use super::entity::Entity;
use super::types::{
    AlertActivation, AlertState, ComponentActivation, ComponentState, ContextAssociation,
    ContextState, Descriptor, MetricState, NodeType, OperatingMode, OperationalState,
    RealTimeSampleState, State, StateBody, StateCategory,
};

/// Builds descriptors and states of the right shape for a node type.
///
/// Wire-schema knowledge lives with the implementor; the transaction
/// manager only asks for fresh shapes (e.g. a new context state).
pub trait EntityFactory: Send + Sync {
    fn descriptor(&self, node_type: NodeType, handle: &str, parent_handle: Option<&str>)
        -> Descriptor;

    /// A fresh state for `descriptor`. `state_handle` is only used for
    /// multi-state descriptors.
    fn state(&self, descriptor: &Descriptor, state_handle: Option<&str>) -> State;

    /// Descriptor plus its initial state (none for context descriptors).
    fn entity(&self, node_type: NodeType, handle: &str, parent_handle: Option<&str>) -> Entity {
        let descriptor = self.descriptor(node_type, handle, parent_handle);
        if node_type.is_multi_state() {
            Entity::multi(descriptor, Vec::new())
        } else {
            let state = self.state(&descriptor, None);
            Entity::single(descriptor, state)
        }
    }
}

/// Factory producing neutral default values for every category.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEntityFactory;

impl EntityFactory for DefaultEntityFactory {
    fn descriptor(
        &self,
        node_type: NodeType,
        handle: &str,
        parent_handle: Option<&str>,
    ) -> Descriptor {
        Descriptor::new(node_type, handle, parent_handle)
    }

    fn state(&self, descriptor: &Descriptor, state_handle: Option<&str>) -> State {
        let body = match descriptor.category() {
            StateCategory::Component => StateBody::Component(ComponentState {
                activation: ComponentActivation::On,
                operating_hours: None,
            }),
            StateCategory::Metric => StateBody::Metric(MetricState {
                activation: ComponentActivation::On,
                value: None,
                determination_time: None,
            }),
            StateCategory::RealTimeSample => StateBody::RealTimeSample(RealTimeSampleState {
                activation: ComponentActivation::On,
                samples: Vec::new(),
                determination_time: None,
            }),
            StateCategory::Alert => StateBody::Alert(AlertState {
                activation: AlertActivation::On,
                presence: (descriptor.node_type != NodeType::AlertSystem).then_some(false),
                determination_time: None,
            }),
            StateCategory::Context => StateBody::Context(ContextState {
                association: ContextAssociation::NotAssociated,
                identification: Vec::new(),
                binding_mdib_version: None,
                unbinding_mdib_version: None,
                binding_start_time: None,
                binding_end_time: None,
            }),
            StateCategory::Operational => StateBody::Operational(OperationalState {
                operating_mode: OperatingMode::Enabled,
            }),
        };

        let mut state = State::new(descriptor.handle.clone(), body);
        state.descriptor_version = descriptor.descriptor_version;
        if descriptor.node_type.is_multi_state() {
            state.handle = state_handle.map(str::to_string);
        }
        state
    }
}
