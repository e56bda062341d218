//! Transaction Manager - scoped, single-writer mutation of the store
//!
//! State machine of one scope:
//!
//! ```text
//! Idle -> Open -> (staging)* -> Committing -> Idle
//!           \-> Aborted -> Idle        (scope returned Err or panicked)
//! ```
//!
//! - Only one scope is open at a time across all threads (write gate)
//! - Staging works on copies; nothing is visible before commit
//! - A scope without changes does not advance the mdib version
//! - Each kind may only write states of its own category

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock};
use std::thread::{self, ThreadId};
use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

use super::entity::Entity;
use super::errors::{MdibError, MdibResult, UsageError};
use super::factory::{DefaultEntityFactory, EntityFactory};
use super::notify::ChangeSink;
use super::result::TransactionResult;
use super::store::{EntityStore, MdibSnapshot, MdibVersionGroup};
use super::types::{Descriptor, Handle, NodeType, State, StateCategory};
use super::version_ledger::{LedgerEntry, VersionLedger};
use crate::observability::{log_event, Event, MetricsRegistry};

/// Kind of a transaction scope; restricts the writable state categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Structural: any descriptor and its paired states
    Descriptor,
    Alert,
    Metric,
    Component,
    Context,
    Operational,
    RtSample,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Descriptor => "descriptor",
            TransactionKind::Alert => "alert",
            TransactionKind::Metric => "metric",
            TransactionKind::Component => "component",
            TransactionKind::Context => "context",
            TransactionKind::Operational => "operational",
            TransactionKind::RtSample => "rt_sample",
        }
    }

    /// State category written by a state transaction (`None` for descriptor).
    pub fn category(&self) -> Option<StateCategory> {
        match self {
            TransactionKind::Descriptor => None,
            TransactionKind::Alert => Some(StateCategory::Alert),
            TransactionKind::Metric => Some(StateCategory::Metric),
            TransactionKind::Component => Some(StateCategory::Component),
            TransactionKind::Context => Some(StateCategory::Context),
            TransactionKind::Operational => Some(StateCategory::Operational),
            TransactionKind::RtSample => Some(StateCategory::RealTimeSample),
        }
    }

    pub fn allows(&self, category: StateCategory) -> bool {
        self.category().map_or(true, |c| c == category)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Global write serialisation. Remembers the owning thread so that a
/// nested open is reported instead of deadlocking.
#[derive(Debug, Default)]
struct WriteGate {
    owner: Mutex<Option<ThreadId>>,
    released: Condvar,
}

impl WriteGate {
    fn acquire(&self) -> MdibResult<GateGuard<'_>> {
        let me = thread::current().id();
        let mut owner = self.owner.lock().unwrap_or_else(|e| e.into_inner());
        if *owner == Some(me) {
            return Err(UsageError::DoubleOpen.into());
        }
        while owner.is_some() {
            owner = self
                .released
                .wait(owner)
                .unwrap_or_else(|e| e.into_inner());
        }
        *owner = Some(me);
        Ok(GateGuard { gate: self })
    }
}

struct GateGuard<'a> {
    gate: &'a WriteGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let mut owner = self.gate.owner.lock().unwrap_or_else(|e| e.into_inner());
        *owner = None;
        self.gate.released.notify_one();
    }
}

#[derive(Debug)]
enum LedgerRecord {
    Descriptor(Handle, u64),
    State(Handle, u64),
}

/// Output of a successful build, applied by the manager.
struct PreparedCommit {
    snapshot: MdibSnapshot,
    result: TransactionResult,
    ledger_records: Vec<LedgerRecord>,
}

/// Writer handed to a transaction scope. Valid only inside the scope.
pub struct Transaction<'a> {
    kind: TransactionKind,
    base: Arc<MdibSnapshot>,
    factory: &'a dyn EntityFactory,
    descriptor_updates: BTreeMap<Handle, Descriptor>,
    /// Copies of existing states, keyed by state key
    state_updates: BTreeMap<Handle, State>,
    /// New context states, keyed by their handle
    context_inserts: BTreeMap<Handle, State>,
    /// New entities in insertion order (parents before children)
    inserts: Vec<Entity>,
    /// Descriptor and context state handles introduced by `inserts`
    inserted: HashSet<Handle>,
    removals: Vec<Handle>,
    /// Every descriptor handle in a removed subtree
    removed: HashSet<Handle>,
}

impl<'a> Transaction<'a> {
    fn new(kind: TransactionKind, base: Arc<MdibSnapshot>, factory: &'a dyn EntityFactory) -> Self {
        Self {
            kind,
            base,
            factory,
            descriptor_updates: BTreeMap::new(),
            state_updates: BTreeMap::new(),
            context_inserts: BTreeMap::new(),
            inserts: Vec::new(),
            inserted: HashSet::new(),
            removals: Vec::new(),
            removed: HashSet::new(),
        }
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    /// The snapshot the scope started from (the version in effect).
    pub fn snapshot(&self) -> &MdibSnapshot {
        &self.base
    }

    /// Mdib version in effect; a commit with changes publishes this + 1.
    pub fn mdib_version(&self) -> u64 {
        self.base.mdib_version()
    }

    pub fn has_changes(&self) -> bool {
        !(self.descriptor_updates.is_empty()
            && self.state_updates.is_empty()
            && self.context_inserts.is_empty()
            && self.inserts.is_empty()
            && self.removals.is_empty())
    }

    /// Committed entity, ignoring anything staged in this scope.
    pub fn current(&self, handle: &str) -> MdibResult<Arc<Entity>> {
        self.base.by_handle(handle)
    }

    fn ensure_category(&self, category: StateCategory, handle: &str) -> MdibResult<()> {
        if self.kind.allows(category) {
            Ok(())
        } else {
            Err(UsageError::WrongCategory {
                kind: self.kind,
                category,
                handle: handle.to_string(),
            }
            .into())
        }
    }

    fn ensure_structural(&self, action: &'static str) -> MdibResult<()> {
        if self.kind == TransactionKind::Descriptor {
            Ok(())
        } else {
            Err(UsageError::NotAllowed {
                kind: self.kind,
                action,
            }
            .into())
        }
    }

    fn is_removed(&self, key: &str) -> bool {
        if self.removed.contains(key) {
            return true;
        }
        self.base
            .context_owner(key)
            .map_or(false, |owner| self.removed.contains(owner))
    }

    fn descriptor_exists(&self, handle: &str) -> bool {
        (self.base.contains(handle) && !self.removed.contains(handle))
            || self.inserts.iter().any(|e| e.handle() == handle)
    }

    fn inserted_state_mut(&mut self, key: &str) -> Option<&mut State> {
        self.inserts
            .iter_mut()
            .flat_map(|e| e.states_mut())
            .find(|s| s.key() == key)
    }

    /// Request a state for modification (copy-on-write).
    ///
    /// `key` is the descriptor handle of a single state or the handle of a
    /// context state. Fails with a usage error if the state's category is
    /// not writable by this transaction kind.
    pub fn state_mut(&mut self, key: &str) -> MdibResult<&mut State> {
        if self.state_updates.contains_key(key) {
            return self
                .state_updates
                .get_mut(key)
                .ok_or_else(|| MdibError::Internal("staged state vanished".into()));
        }
        if self.context_inserts.contains_key(key) {
            return self
                .context_inserts
                .get_mut(key)
                .ok_or_else(|| MdibError::Internal("staged state vanished".into()));
        }
        if self.inserted.contains(key) {
            return self
                .inserted_state_mut(key)
                .ok_or_else(|| MdibError::not_found(key));
        }
        if self.is_removed(key) {
            return Err(MdibError::not_found(key));
        }

        let state = self.base.state(key)?;
        self.ensure_category(state.category(), key)?;
        Ok(self.state_updates.entry(key.to_string()).or_insert(state))
    }

    /// Replace the body of an existing state with the body of `state`.
    /// Versions are assigned at commit.
    pub fn update_state(&mut self, state: State) -> MdibResult<()> {
        self.ensure_category(state.category(), state.key())?;
        let target = self.state_mut(state.key())?;
        if target.descriptor_handle != state.descriptor_handle || target.category() != state.category() {
            return Err(MdibError::InvalidStructure(format!(
                "state '{}' does not belong to descriptor '{}'",
                state.key(),
                state.descriptor_handle
            )));
        }
        target.body = state.body;
        Ok(())
    }

    /// Staged view of a state, falling back to the committed one.
    pub fn get_state(&self, key: &str) -> MdibResult<State> {
        if let Ok(staged) = self.staged_state(key) {
            return Ok(staged.clone());
        }
        if self.is_removed(key) {
            return Err(MdibError::not_found(key));
        }
        self.base.state(key)
    }

    /// A state already requested in this scope.
    pub fn staged_state(&self, key: &str) -> MdibResult<&State> {
        self.state_updates
            .get(key)
            .or_else(|| self.context_inserts.get(key))
            .or_else(|| {
                self.inserts
                    .iter()
                    .flat_map(|e| e.states())
                    .find(|s| s.key() == key)
            })
            .ok_or_else(|| {
                UsageError::NotStaged {
                    handle: key.to_string(),
                }
                .into()
            })
    }

    /// Committed context states of a context descriptor, staged copies
    /// taking precedence. New context states of this scope are included.
    pub fn context_states(&self, descriptor_handle: &str) -> MdibResult<Vec<State>> {
        let mut out = Vec::new();
        if let Some(entity) = self.base.get(descriptor_handle) {
            if !self.removed.contains(descriptor_handle) {
                for state in entity.states() {
                    let key = state.key();
                    out.push(self.state_updates.get(key).unwrap_or(state).clone());
                }
            }
        } else if let Some(entity) = self.inserts.iter().find(|e| e.handle() == descriptor_handle) {
            out.extend(entity.states().into_iter().cloned());
        } else {
            return Err(MdibError::not_found(descriptor_handle));
        }
        out.extend(
            self.context_inserts
                .values()
                .filter(|s| s.descriptor_handle == descriptor_handle)
                .cloned(),
        );
        Ok(out)
    }

    /// Create a context state under an existing context descriptor.
    ///
    /// Without an explicit handle a unique one is generated.
    pub fn new_context_state(
        &mut self,
        descriptor_handle: &str,
        state_handle: Option<&str>,
    ) -> MdibResult<&mut State> {
        self.ensure_category(StateCategory::Context, descriptor_handle)?;
        if !self.descriptor_exists(descriptor_handle) {
            return Err(MdibError::not_found(descriptor_handle));
        }

        let descriptor = match self.base.get(descriptor_handle) {
            Some(entity) => entity.descriptor().clone(),
            None => self
                .inserts
                .iter()
                .find(|e| e.handle() == descriptor_handle)
                .map(|e| e.descriptor().clone())
                .ok_or_else(|| MdibError::not_found(descriptor_handle))?,
        };
        if !descriptor.node_type.is_multi_state() {
            return Err(MdibError::InvalidStructure(format!(
                "'{}' is a {} descriptor, not a context descriptor",
                descriptor_handle, descriptor.node_type
            )));
        }

        let handle = match state_handle {
            Some(h) => h.to_string(),
            None => format!("{}.{}", descriptor_handle, Uuid::new_v4().simple()),
        };
        if self.base.is_known_handle(&handle)
            || self.inserted.contains(&handle)
            || self.context_inserts.contains_key(&handle)
        {
            return Err(MdibError::Duplicate { handle });
        }

        let state = self.factory.state(&descriptor, Some(&handle));
        Ok(self.context_inserts.entry(handle).or_insert(state))
    }

    /// Request a descriptor for modification. Handle, parent and node type
    /// must stay unchanged.
    pub fn descriptor_mut(&mut self, handle: &str) -> MdibResult<&mut Descriptor> {
        self.ensure_structural("descriptor update")?;

        if self.inserted.contains(handle) {
            return self
                .inserts
                .iter_mut()
                .find(|e| e.handle() == handle)
                .map(|e| e.descriptor_mut())
                .ok_or_else(|| MdibError::not_found(handle));
        }
        if self.removed.contains(handle) {
            return Err(MdibError::not_found(handle));
        }
        if !self.descriptor_updates.contains_key(handle) {
            let descriptor = self.base.by_handle(handle)?.descriptor().clone();
            self.descriptor_updates.insert(handle.to_string(), descriptor);
        }
        self.descriptor_updates
            .get_mut(handle)
            .ok_or_else(|| MdibError::Internal("staged descriptor vanished".into()))
    }

    /// Stage a new descriptor with its state(s).
    pub fn insert(&mut self, entity: Entity) -> MdibResult<()> {
        self.ensure_structural("insert")?;

        let handle = entity.handle().to_string();
        if self.base.is_known_handle(&handle) || self.inserted.contains(&handle) {
            return Err(MdibError::Duplicate { handle });
        }
        if let Some(parent) = entity.parent_handle() {
            if !self.descriptor_exists(parent) {
                return Err(MdibError::not_found(parent));
            }
        }

        let descriptor = entity.descriptor();
        let mut state_handles = Vec::new();
        match &entity {
            Entity::Single { state, .. } => {
                if descriptor.node_type.is_multi_state() {
                    return Err(MdibError::InvalidStructure(format!(
                        "context descriptor '{}' needs a multi-state entity",
                        handle
                    )));
                }
                if state.handle.is_some() {
                    return Err(MdibError::InvalidStructure(format!(
                        "single state of '{}' must not carry its own handle",
                        handle
                    )));
                }
            }
            Entity::Multi { states, .. } => {
                if !descriptor.node_type.is_multi_state() {
                    return Err(MdibError::InvalidStructure(format!(
                        "{} descriptor '{}' needs exactly one state",
                        descriptor.node_type, handle
                    )));
                }
                for key in states.keys() {
                    if key == &handle
                        || self.base.is_known_handle(key)
                        || self.inserted.contains(key)
                        || self.context_inserts.contains_key(key)
                    {
                        return Err(MdibError::Duplicate {
                            handle: key.clone(),
                        });
                    }
                    state_handles.push(key.clone());
                }
            }
        }
        for state in entity.states() {
            if state.descriptor_handle != handle || state.category() != descriptor.category() {
                return Err(MdibError::InvalidStructure(format!(
                    "state '{}' does not match descriptor '{}'",
                    state.key(),
                    handle
                )));
            }
        }

        self.inserted.insert(handle);
        self.inserted.extend(state_handles);
        self.inserts.push(entity);
        Ok(())
    }

    /// Stage a new descriptor with default state(s) from the factory.
    pub fn insert_new(
        &mut self,
        node_type: NodeType,
        handle: &str,
        parent_handle: Option<&str>,
    ) -> MdibResult<()> {
        let entity = self.factory.entity(node_type, handle, parent_handle);
        self.insert(entity)
    }

    /// Stage removal of a descriptor and its whole subtree.
    pub fn remove(&mut self, handle: &str) -> MdibResult<()> {
        self.ensure_structural("remove")?;

        if self.inserted.contains(handle) {
            return Err(MdibError::InvalidStructure(format!(
                "'{}' was inserted in this transaction",
                handle
            )));
        }
        if self.removed.contains(handle) || !self.base.contains(handle) {
            return Err(MdibError::not_found(handle));
        }

        let subtree = self.base.subtree(handle);
        if let Some(orphan) = self
            .inserts
            .iter()
            .find(|e| e.parent_handle().map_or(false, |p| subtree.iter().any(|h| h == p)))
        {
            return Err(MdibError::InvalidStructure(format!(
                "'{}' was inserted below '{}' in this transaction",
                orphan.handle(),
                handle
            )));
        }

        self.removed.extend(subtree);
        self.removals.push(handle.to_string());
        Ok(())
    }

    /// Turn staged work into the next snapshot. Pure: nothing is published.
    fn build(self, ledger: &VersionLedger) -> MdibResult<Option<PreparedCommit>> {
        if !self.has_changes() {
            return Ok(None);
        }

        let Transaction {
            kind,
            base,
            descriptor_updates,
            mut state_updates,
            context_inserts,
            inserts,
            removals,
            ..
        } = self;

        let mut entities = base.entities.clone();
        let mut context_index = base.context_index.clone();
        let mut result = TransactionResult::new(kind);
        let mut ledger_records = Vec::new();
        let mut bump_parents: BTreeSet<Handle> = BTreeSet::new();
        let mut touched: HashSet<Handle> = HashSet::new();

        for root in &removals {
            for handle in base.subtree(root) {
                if let Some(entity) = entities.remove(&handle) {
                    ledger_records.push(LedgerRecord::Descriptor(
                        handle.clone(),
                        entity.descriptor().descriptor_version,
                    ));
                    for state in entity.states() {
                        ledger_records
                            .push(LedgerRecord::State(state.key().to_string(), state.state_version));
                        if let Some(h) = &state.handle {
                            context_index.remove(h);
                        }
                    }
                    result.descr_deleted.push(entity.descriptor().clone());
                    touched.insert(handle);
                }
            }
            if let Some(parent) = base.get(root).and_then(|e| e.parent_handle()) {
                bump_parents.insert(parent.to_string());
            }
        }

        for mut entity in inserts {
            let handle = entity.handle().to_string();
            let descriptor_version = ledger.next_descriptor_version(&handle);
            entity.descriptor_mut().descriptor_version = descriptor_version;
            for state in entity.states_mut() {
                state.state_version = ledger.next_state_version(state.key());
                state.descriptor_version = descriptor_version;
                if let Some(h) = &state.handle {
                    context_index.insert(h.clone(), handle.clone());
                }
            }
            if let Some(parent) = entity.parent_handle() {
                bump_parents.insert(parent.to_string());
            }
            result.descr_created.push(entity.descriptor().clone());
            for state in entity.states() {
                result.push_state(state.clone());
            }
            touched.insert(handle.clone());
            entities.insert(handle, Arc::new(entity));
        }

        for (handle, descriptor) in descriptor_updates {
            if touched.contains(&handle) {
                continue;
            }
            let Some(slot) = entities.get_mut(&handle) else {
                continue;
            };
            let entity = Arc::make_mut(slot);
            let old = entity.descriptor();
            if descriptor.handle != old.handle
                || descriptor.parent_handle != old.parent_handle
                || descriptor.node_type != old.node_type
            {
                return Err(MdibError::InvalidStructure(format!(
                    "handle, parent and node type of '{}' are immutable",
                    handle
                )));
            }
            let descriptor_version = old.descriptor_version + 1;
            *entity.descriptor_mut() = Descriptor {
                descriptor_version,
                ..descriptor
            };
            bump_states(entity, descriptor_version, &mut state_updates);
            result.descr_updated.push(entity.descriptor().clone());
            for state in entity.states() {
                result.push_state(state.clone());
            }
            touched.insert(handle);
        }

        for parent in bump_parents {
            if touched.contains(&parent) {
                continue;
            }
            let Some(slot) = entities.get_mut(&parent) else {
                continue;
            };
            let entity = Arc::make_mut(slot);
            let descriptor_version = entity.descriptor().descriptor_version + 1;
            entity.descriptor_mut().descriptor_version = descriptor_version;
            bump_states(entity, descriptor_version, &mut state_updates);
            result.descr_updated.push(entity.descriptor().clone());
            for state in entity.states() {
                result.push_state(state.clone());
            }
            touched.insert(parent);
        }

        for (key, staged) in state_updates {
            let owner = if entities.get(&key).map_or(false, |e| !e.is_multi_state()) {
                key.clone()
            } else if let Some(owner) = context_index.get(&key) {
                owner.clone()
            } else {
                // removed in this scope
                continue;
            };
            let Some(slot) = entities.get_mut(&owner) else {
                continue;
            };
            let entity = Arc::make_mut(slot);
            let descriptor_version = entity.descriptor().descriptor_version;
            let target = match entity {
                Entity::Single { state, .. } => Some(state),
                Entity::Multi { states, .. } => states.get_mut(&key),
            };
            let Some(target) = target else {
                continue;
            };
            target.body = staged.body;
            target.state_version += 1;
            target.descriptor_version = descriptor_version;
            result.push_state(target.clone());
        }

        for (handle, mut state) in context_inserts {
            let owner = state.descriptor_handle.clone();
            let Some(slot) = entities.get_mut(&owner) else {
                continue;
            };
            let entity = Arc::make_mut(slot);
            state.state_version = ledger.next_state_version(&handle);
            state.descriptor_version = entity.descriptor().descriptor_version;
            match entity {
                Entity::Multi { states, .. } => {
                    states.insert(handle.clone(), state.clone());
                }
                Entity::Single { .. } => {
                    return Err(MdibError::Internal(format!(
                        "context state '{}' staged under single-state '{}'",
                        handle, owner
                    )));
                }
            }
            context_index.insert(handle, owner);
            result.ctxt_updates.push(state);
        }

        if result.is_empty() {
            return Ok(None);
        }

        Ok(Some(PreparedCommit {
            snapshot: MdibSnapshot {
                entities,
                context_index,
                version: base.version.next(),
            },
            result,
            ledger_records,
        }))
    }
}

/// Rewrite every state of a structurally changed entity: new descriptor
/// version, state version + 1, staged bodies merged in.
fn bump_states(
    entity: &mut Entity,
    descriptor_version: u64,
    staged: &mut BTreeMap<Handle, State>,
) {
    for state in entity.states_mut() {
        if let Some(update) = staged.remove(state.key()) {
            state.body = update.body;
        }
        state.state_version += 1;
        state.descriptor_version = descriptor_version;
    }
}

/// Value returned by a committed (or no-op) scope.
#[derive(Debug, Clone)]
pub struct TransactionOutcome<R> {
    pub value: R,
    /// `None` when the scope made no changes.
    pub result: Option<Arc<TransactionResult>>,
    /// Version group in effect after the scope.
    pub version: MdibVersionGroup,
}

impl<R> TransactionOutcome<R> {
    pub fn is_noop(&self) -> bool {
        self.result.is_none()
    }
}

/// Owner of the entity store's write path.
pub struct TransactionManager {
    store: Arc<EntityStore>,
    ledger: Mutex<VersionLedger>,
    gate: WriteGate,
    factory: Arc<dyn EntityFactory>,
    sinks: RwLock<Vec<Arc<dyn ChangeSink>>>,
    metrics: Arc<MetricsRegistry>,
    last_result: Mutex<Option<Arc<TransactionResult>>>,
}

impl fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionManager")
            .field("store", &self.store)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

macro_rules! kind_transaction {
    ($(#[$doc:meta])* $name:ident, $kind:expr) => {
        $(#[$doc])*
        pub fn $name<R, E, F>(&self, body: F) -> Result<TransactionOutcome<R>, E>
        where
            F: FnOnce(&mut Transaction<'_>) -> Result<R, E>,
            E: From<MdibError>,
        {
            self.transaction($kind, body)
        }
    };
}

impl TransactionManager {
    pub fn new(
        store: Arc<EntityStore>,
        factory: Arc<dyn EntityFactory>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            store,
            ledger: Mutex::new(VersionLedger::new()),
            gate: WriteGate::default(),
            factory,
            sinks: RwLock::new(Vec::new()),
            metrics,
            last_result: Mutex::new(None),
        }
    }

    /// Empty store, default factory, private metrics.
    pub fn with_sequence_id(sequence_id: impl Into<String>) -> Self {
        Self::new(
            Arc::new(EntityStore::new(sequence_id, None)),
            Arc::new(DefaultEntityFactory),
            Arc::new(MetricsRegistry::new()),
        )
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn factory(&self) -> &dyn EntityFactory {
        self.factory.as_ref()
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn add_change_sink(&self, sink: Arc<dyn ChangeSink>) {
        self.sinks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(sink);
    }

    /// Result of the most recent committing transaction.
    pub fn last_result(&self) -> Option<Arc<TransactionResult>> {
        self.last_result
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Ledger entry of a deleted handle.
    pub fn ledger_entry(&self, handle: &str) -> Option<LedgerEntry> {
        self.lock_ledger().get(handle)
    }

    fn lock_ledger(&self) -> MutexGuard<'_, VersionLedger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `body` inside a scope of the given kind.
    ///
    /// Blocks until every earlier scope has committed or aborted. If `body`
    /// returns `Err` (or panics) nothing is applied.
    pub fn transaction<R, E, F>(
        &self,
        kind: TransactionKind,
        body: F,
    ) -> Result<TransactionOutcome<R>, E>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<R, E>,
        E: From<MdibError>,
    {
        let _gate = self.gate.acquire()?;
        log_event(Event::TransactionBegin, &[("kind", kind.as_str())]);
        let started = Instant::now();

        let mut tx = Transaction::new(kind, self.store.snapshot(), self.factory.as_ref());
        let value = match body(&mut tx) {
            Ok(value) => value,
            Err(e) => {
                self.aborted(kind, "scope returned an error");
                return Err(e);
            }
        };

        let prepared = {
            let ledger = self.lock_ledger();
            tx.build(&ledger)
        };
        let prepared = match prepared {
            Ok(Some(prepared)) => prepared,
            Ok(None) => {
                self.metrics.increment_transactions_noop();
                log_event(Event::TransactionNoop, &[("kind", kind.as_str())]);
                return Ok(TransactionOutcome {
                    value,
                    result: None,
                    version: self.store.version_group(),
                });
            }
            Err(e) => {
                self.aborted(kind, &e.to_string());
                return Err(e.into());
            }
        };

        let PreparedCommit {
            snapshot,
            result,
            ledger_records,
        } = prepared;

        let published = self.store.commit(snapshot);
        {
            let mut ledger = self.lock_ledger();
            for record in ledger_records {
                match record {
                    LedgerRecord::Descriptor(h, v) => ledger.record_descriptor(&h, v),
                    LedgerRecord::State(h, v) => ledger.record_state(&h, v),
                }
            }
        }

        let result = Arc::new(result);
        *self.last_result.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&result));
        self.record_commit(&result, published.version(), started);
        self.notify(&result, published.version());

        Ok(TransactionOutcome {
            value,
            result: Some(result),
            version: published.version().clone(),
        })
    }

    kind_transaction!(
        /// Structural scope: insert, update and remove descriptors.
        descriptor_transaction,
        TransactionKind::Descriptor
    );
    kind_transaction!(alert_state_transaction, TransactionKind::Alert);
    kind_transaction!(metric_state_transaction, TransactionKind::Metric);
    kind_transaction!(component_state_transaction, TransactionKind::Component);
    kind_transaction!(
        /// Multi-state scope. Does not enforce "one associated state per
        /// descriptor"; that policy belongs to the caller.
        context_state_transaction,
        TransactionKind::Context
    );
    kind_transaction!(operational_state_transaction, TransactionKind::Operational);
    kind_transaction!(rt_sample_state_transaction, TransactionKind::RtSample);

    fn aborted(&self, kind: TransactionKind, reason: &str) {
        self.metrics.increment_transactions_aborted();
        log_event(
            Event::TransactionAborted,
            &[("kind", kind.as_str()), ("reason", reason)],
        );
    }

    fn record_commit(
        &self,
        result: &TransactionResult,
        version: &MdibVersionGroup,
        started: Instant,
    ) {
        self.metrics.increment_transactions_committed();
        self.metrics.add_descriptors_inserted(result.descr_created.len() as u64);
        self.metrics.add_descriptors_removed(result.descr_deleted.len() as u64);
        self.metrics.add_states_updated(result.all_states().count() as u64);

        for descriptor in &result.descr_created {
            log_event(
                Event::DescriptorInserted,
                &[
                    ("handle", descriptor.handle.as_str()),
                    ("node_type", descriptor.node_type.to_string().as_str()),
                ],
            );
        }
        for descriptor in &result.descr_deleted {
            log_event(Event::DescriptorRemoved, &[("handle", descriptor.handle.as_str())]);
        }

        log_event(
            Event::TransactionCommit,
            &[
                ("kind", result.kind.as_str()),
                ("mdib_version", version.mdib_version.to_string().as_str()),
                ("changes", result.change_count().to_string().as_str()),
                ("duration_us", started.elapsed().as_micros().to_string().as_str()),
            ],
        );
    }

    fn notify(&self, result: &TransactionResult, version: &MdibVersionGroup) {
        let sinks = self
            .sinks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for sink in sinks {
            if let Err(e) = sink.on_commit(result, version) {
                log_event(
                    Event::SinkFailed,
                    &[("sink", e.sink.as_str()), ("message", e.message.as_str())],
                );
            }
        }
    }
}
