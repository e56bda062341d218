//! Version Ledger - last known versions of deleted handles
//!
//! - Populated on every delete
//! - Consulted on every create to seed versions above the previous life
//! - Append-only: entries are never removed and never lowered

use std::collections::HashMap;

use super::types::Handle;

/// Last recorded versions of one handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerEntry {
    pub descriptor_version: Option<u64>,
    pub state_version: Option<u64>,
}

/// Per-handle version memory that survives deletion.
#[derive(Debug, Default)]
pub struct VersionLedger {
    entries: HashMap<Handle, LedgerEntry>,
}

impl VersionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the descriptor version of a deleted descriptor.
    pub fn record_descriptor(&mut self, handle: &str, version: u64) {
        let entry = self.entries.entry(handle.to_string()).or_default();
        entry.descriptor_version = Some(entry.descriptor_version.map_or(version, |v| v.max(version)));
    }

    /// Remember the state version of a deleted state (keyed by state key).
    pub fn record_state(&mut self, handle: &str, version: u64) {
        let entry = self.entries.entry(handle.to_string()).or_default();
        entry.state_version = Some(entry.state_version.map_or(version, |v| v.max(version)));
    }

    /// First descriptor version for a (re)created handle.
    pub fn next_descriptor_version(&self, handle: &str) -> u64 {
        self.entries
            .get(handle)
            .and_then(|e| e.descriptor_version)
            .map_or(0, |v| v + 1)
    }

    /// First state version for a (re)created state key.
    pub fn next_state_version(&self, handle: &str) -> u64 {
        self.entries
            .get(handle)
            .and_then(|e| e.state_version)
            .map_or(0, |v| v + 1)
    }

    pub fn get(&self, handle: &str) -> Option<LedgerEntry> {
        self.entries.get(handle).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
