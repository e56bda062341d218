//! Categorised change-set of one committed transaction

use serde::Serialize;

use super::transaction::TransactionKind;
use super::types::{Descriptor, State, StateCategory};

/// What a committed transaction changed.
///
/// All entries carry their post-commit versions. States of created or
/// updated descriptors are listed in their category lists as well.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionResult {
    pub kind: TransactionKind,
    pub descr_created: Vec<Descriptor>,
    pub descr_updated: Vec<Descriptor>,
    pub descr_deleted: Vec<Descriptor>,
    pub metric_updates: Vec<State>,
    pub alert_updates: Vec<State>,
    pub comp_updates: Vec<State>,
    pub ctxt_updates: Vec<State>,
    pub op_updates: Vec<State>,
    pub rt_updates: Vec<State>,
}

impl TransactionResult {
    pub fn new(kind: TransactionKind) -> Self {
        Self {
            kind,
            descr_created: Vec::new(),
            descr_updated: Vec::new(),
            descr_deleted: Vec::new(),
            metric_updates: Vec::new(),
            alert_updates: Vec::new(),
            comp_updates: Vec::new(),
            ctxt_updates: Vec::new(),
            op_updates: Vec::new(),
            rt_updates: Vec::new(),
        }
    }

    /// Append a state to the list of its category.
    pub fn push_state(&mut self, state: State) {
        self.states_mut(state.category()).push(state);
    }

    pub fn states(&self, category: StateCategory) -> &[State] {
        match category {
            StateCategory::Metric => &self.metric_updates,
            StateCategory::Alert => &self.alert_updates,
            StateCategory::Component => &self.comp_updates,
            StateCategory::Context => &self.ctxt_updates,
            StateCategory::Operational => &self.op_updates,
            StateCategory::RealTimeSample => &self.rt_updates,
        }
    }

    fn states_mut(&mut self, category: StateCategory) -> &mut Vec<State> {
        match category {
            StateCategory::Metric => &mut self.metric_updates,
            StateCategory::Alert => &mut self.alert_updates,
            StateCategory::Component => &mut self.comp_updates,
            StateCategory::Context => &mut self.ctxt_updates,
            StateCategory::Operational => &mut self.op_updates,
            StateCategory::RealTimeSample => &mut self.rt_updates,
        }
    }

    /// Every updated state, grouped by category.
    pub fn all_states(&self) -> impl Iterator<Item = &State> {
        self.metric_updates
            .iter()
            .chain(&self.alert_updates)
            .chain(&self.comp_updates)
            .chain(&self.ctxt_updates)
            .chain(&self.op_updates)
            .chain(&self.rt_updates)
    }

    pub fn has_descriptor_updates(&self) -> bool {
        !(self.descr_created.is_empty()
            && self.descr_updated.is_empty()
            && self.descr_deleted.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        !self.has_descriptor_updates() && self.all_states().next().is_none()
    }

    /// Number of entries across all lists.
    pub fn change_count(&self) -> usize {
        self.descr_created.len()
            + self.descr_updated.len()
            + self.descr_deleted.len()
            + self.all_states().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mdib::factory::{DefaultEntityFactory, EntityFactory};
    use crate::mdib::types::NodeType;

    #[test]
    fn test_push_state_routes_by_category() {
        let f = DefaultEntityFactory;
        let mut result = TransactionResult::new(TransactionKind::Descriptor);
        assert!(result.is_empty());

        for node_type in [NodeType::AlertCondition, NodeType::NumericMetric, NodeType::Sco] {
            let e = f.entity(node_type, "h", None);
            result.push_state(e.state().unwrap().clone());
        }

        assert_eq!(result.alert_updates.len(), 1);
        assert_eq!(result.metric_updates.len(), 1);
        assert_eq!(result.comp_updates.len(), 1);
        assert_eq!(result.states(StateCategory::Context).len(), 0);
        assert_eq!(result.change_count(), 3);
        assert!(!result.has_descriptor_updates());
    }
}
