//! Descriptor + state pairing handed out by lookups

use std::collections::BTreeMap;

use serde::Serialize;

use super::types::{Descriptor, Handle, NodeType, State};

/// A descriptor together with its state(s).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Entity {
    /// Descriptor with exactly one state (1:1).
    Single { descriptor: Descriptor, state: State },
    /// Context descriptor with zero or more states keyed by state handle (0:N).
    Multi {
        descriptor: Descriptor,
        states: BTreeMap<Handle, State>,
    },
}

impl Entity {
    pub fn single(descriptor: Descriptor, state: State) -> Self {
        Entity::Single { descriptor, state }
    }

    pub fn multi(descriptor: Descriptor, states: impl IntoIterator<Item = State>) -> Self {
        let states = states
            .into_iter()
            .map(|s| (s.key().to_string(), s))
            .collect();
        Entity::Multi { descriptor, states }
    }

    pub fn descriptor(&self) -> &Descriptor {
        match self {
            Entity::Single { descriptor, .. } | Entity::Multi { descriptor, .. } => descriptor,
        }
    }

    pub(crate) fn descriptor_mut(&mut self) -> &mut Descriptor {
        match self {
            Entity::Single { descriptor, .. } | Entity::Multi { descriptor, .. } => descriptor,
        }
    }

    pub fn handle(&self) -> &str {
        &self.descriptor().handle
    }

    pub fn node_type(&self) -> NodeType {
        self.descriptor().node_type
    }

    pub fn parent_handle(&self) -> Option<&str> {
        self.descriptor().parent_handle.as_deref()
    }

    pub fn is_multi_state(&self) -> bool {
        matches!(self, Entity::Multi { .. })
    }

    /// The single state, if this is a single-state entity.
    pub fn state(&self) -> Option<&State> {
        match self {
            Entity::Single { state, .. } => Some(state),
            Entity::Multi { .. } => None,
        }
    }

    /// A context state by its own handle.
    pub fn context_state(&self, handle: &str) -> Option<&State> {
        match self {
            Entity::Multi { states, .. } => states.get(handle),
            Entity::Single { .. } => None,
        }
    }

    /// All states, in handle order for multi-state entities.
    pub fn states(&self) -> Vec<&State> {
        match self {
            Entity::Single { state, .. } => vec![state],
            Entity::Multi { states, .. } => states.values().collect(),
        }
    }

    pub(crate) fn states_mut(&mut self) -> Vec<&mut State> {
        match self {
            Entity::Single { state, .. } => vec![state],
            Entity::Multi { states, .. } => states.values_mut().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mdib::factory::{DefaultEntityFactory, EntityFactory};

    #[test]
    fn test_single_entity_accessors() {
        let factory = DefaultEntityFactory;
        let entity = factory.entity(NodeType::NumericMetric, "hr", Some("ch"));

        assert_eq!(entity.handle(), "hr");
        assert_eq!(entity.parent_handle(), Some("ch"));
        assert!(!entity.is_multi_state());
        assert_eq!(entity.state().unwrap().descriptor_handle, "hr");
        assert_eq!(entity.states().len(), 1);
    }

    #[test]
    fn test_multi_entity_accessors() {
        let factory = DefaultEntityFactory;
        let descriptor = factory.descriptor(NodeType::PatientContext, "pat", Some("sc"));
        let s1 = factory.state(&descriptor, Some("pat.b"));
        let s2 = factory.state(&descriptor, Some("pat.a"));
        let entity = Entity::multi(descriptor, vec![s1, s2]);

        assert!(entity.is_multi_state());
        assert!(entity.state().is_none());
        assert!(entity.context_state("pat.a").is_some());
        let keys: Vec<_> = entity.states().iter().map(|s| s.key().to_string()).collect();
        assert_eq!(keys, vec!["pat.a", "pat.b"]);
    }
}
