//! Entity Store - versioned, concurrently readable descriptor/state arena
//!
//! - Readers clone an `Arc` of the current snapshot under a brief read lock
//!   and then query it without holding any lock
//! - Writers (only the transaction manager) publish a complete new snapshot
//! - No lookup mutates

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use super::entity::Entity;
use super::errors::{MdibError, MdibResult};
use super::types::{Coding, Handle, NodeType, State};

/// Global consistency stamp of the information base.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MdibVersionGroup {
    pub mdib_version: u64,
    pub sequence_id: String,
    pub instance_id: Option<u64>,
}

impl MdibVersionGroup {
    pub fn new(sequence_id: impl Into<String>, instance_id: Option<u64>) -> Self {
        Self {
            mdib_version: 0,
            sequence_id: sequence_id.into(),
            instance_id,
        }
    }

    /// Same group, one version later.
    pub fn next(&self) -> Self {
        Self {
            mdib_version: self.mdib_version + 1,
            ..self.clone()
        }
    }
}

/// Immutable view of the whole information base at one mdib version.
#[derive(Debug, Clone, PartialEq)]
pub struct MdibSnapshot {
    pub(crate) entities: BTreeMap<Handle, Arc<Entity>>,
    /// Context state handle -> owning descriptor handle
    pub(crate) context_index: HashMap<Handle, Handle>,
    pub(crate) version: MdibVersionGroup,
}

impl MdibSnapshot {
    pub fn empty(version: MdibVersionGroup) -> Self {
        Self {
            entities: BTreeMap::new(),
            context_index: HashMap::new(),
            version,
        }
    }

    pub fn version(&self) -> &MdibVersionGroup {
        &self.version
    }

    pub fn mdib_version(&self) -> u64 {
        self.version.mdib_version
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.entities.contains_key(handle)
    }

    /// Whether `handle` names a descriptor or a context state.
    pub fn is_known_handle(&self, handle: &str) -> bool {
        self.entities.contains_key(handle) || self.context_index.contains_key(handle)
    }

    pub fn get(&self, handle: &str) -> Option<&Arc<Entity>> {
        self.entities.get(handle)
    }

    pub fn by_handle(&self, handle: &str) -> MdibResult<Arc<Entity>> {
        self.entities
            .get(handle)
            .cloned()
            .ok_or_else(|| MdibError::not_found(handle))
    }

    pub fn by_node_type(&self, node_type: NodeType) -> Vec<Arc<Entity>> {
        self.entities
            .values()
            .filter(|e| e.node_type() == node_type)
            .cloned()
            .collect()
    }

    pub fn by_parent_handle(&self, parent_handle: &str) -> Vec<Arc<Entity>> {
        self.entities
            .values()
            .filter(|e| e.parent_handle() == Some(parent_handle))
            .cloned()
            .collect()
    }

    pub fn by_coding(&self, coding: &Coding) -> Vec<Arc<Entity>> {
        self.entities
            .values()
            .filter(|e| e.descriptor().coding.as_ref() == Some(coding))
            .cloned()
            .collect()
    }

    /// Descriptors without a parent.
    pub fn roots(&self) -> Vec<Arc<Entity>> {
        self.entities
            .values()
            .filter(|e| e.parent_handle().is_none())
            .cloned()
            .collect()
    }

    /// Descriptor handle owning a context state.
    pub fn context_owner(&self, state_handle: &str) -> Option<&str> {
        self.context_index.get(state_handle).map(String::as_str)
    }

    pub fn context_state(&self, state_handle: &str) -> MdibResult<State> {
        self.context_owner(state_handle)
            .and_then(|owner| self.entities.get(owner))
            .and_then(|e| e.context_state(state_handle))
            .cloned()
            .ok_or_else(|| MdibError::not_found(state_handle))
    }

    /// State by key: descriptor handle for single states, own handle for
    /// context states.
    pub fn state(&self, key: &str) -> MdibResult<State> {
        if let Some(state) = self.entities.get(key).and_then(|e| e.state()) {
            return Ok(state.clone());
        }
        self.context_state(key)
    }

    /// Handles of `root` and all its descendants, parents before children.
    pub fn subtree(&self, root: &str) -> Vec<Handle> {
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        for entity in self.entities.values() {
            if let Some(parent) = entity.parent_handle() {
                children.entry(parent).or_default().push(entity.handle());
            }
        }

        let mut out = Vec::new();
        if !self.entities.contains_key(root) {
            return out;
        }
        let mut stack = vec![root];
        while let Some(handle) = stack.pop() {
            out.push(handle.to_string());
            if let Some(kids) = children.get(handle) {
                // reversed so that siblings come out in handle order
                stack.extend(kids.iter().rev());
            }
        }
        out
    }

    pub fn entities(&self) -> impl Iterator<Item = &Arc<Entity>> {
        self.entities.values()
    }
}

/// Holder of the current snapshot.
#[derive(Debug)]
pub struct EntityStore {
    current: RwLock<Arc<MdibSnapshot>>,
}

impl EntityStore {
    /// Empty store at mdib version 0.
    pub fn new(sequence_id: impl Into<String>, instance_id: Option<u64>) -> Self {
        let version = MdibVersionGroup::new(sequence_id, instance_id);
        Self {
            current: RwLock::new(Arc::new(MdibSnapshot::empty(version))),
        }
    }

    /// The current snapshot. Holds the read lock only for the `Arc` clone.
    pub fn snapshot(&self) -> Arc<MdibSnapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn version_group(&self) -> MdibVersionGroup {
        self.snapshot().version.clone()
    }

    pub fn mdib_version(&self) -> u64 {
        self.snapshot().version.mdib_version
    }

    pub fn sequence_id(&self) -> String {
        self.snapshot().version.sequence_id.clone()
    }

    pub fn by_handle(&self, handle: &str) -> MdibResult<Arc<Entity>> {
        self.snapshot().by_handle(handle)
    }

    pub fn by_node_type(&self, node_type: NodeType) -> Vec<Arc<Entity>> {
        self.snapshot().by_node_type(node_type)
    }

    pub fn by_parent_handle(&self, parent_handle: &str) -> Vec<Arc<Entity>> {
        self.snapshot().by_parent_handle(parent_handle)
    }

    pub fn by_coding(&self, coding: &Coding) -> Vec<Arc<Entity>> {
        self.snapshot().by_coding(coding)
    }

    pub fn context_state(&self, state_handle: &str) -> MdibResult<State> {
        self.snapshot().context_state(state_handle)
    }

    pub fn state(&self, key: &str) -> MdibResult<State> {
        self.snapshot().state(key)
    }

    /// Publish a fully built snapshot. Only the transaction manager calls
    /// this, while it holds the write gate.
    pub(crate) fn commit(&self, next: MdibSnapshot) -> Arc<MdibSnapshot> {
        let next = Arc::new(next);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::clone(&next);
        next
    }
}
