//! Metrics registry
//!
//! - Counters only
//! - Monotonic increase, reset only on process start
//! - Shared by the transaction manager and every operation worker

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters of one provider.
///
/// All counters use `Relaxed` ordering; values are exact once the
/// incrementing threads have been joined.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    transactions_committed: AtomicU64,
    transactions_aborted: AtomicU64,
    transactions_noop: AtomicU64,
    descriptors_inserted: AtomicU64,
    descriptors_removed: AtomicU64,
    states_updated: AtomicU64,
    invocations_enqueued: AtomicU64,
    invocations_finished: AtomicU64,
    invocations_failed: AtomicU64,
    invocations_rejected: AtomicU64,
    invocations_refused: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    // Transactions

    pub fn increment_transactions_committed(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_transactions_aborted(&self) {
        self.transactions_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_transactions_noop(&self) {
        self.transactions_noop.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_descriptors_inserted(&self, count: u64) {
        self.descriptors_inserted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_descriptors_removed(&self, count: u64) {
        self.descriptors_removed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_states_updated(&self, count: u64) {
        self.states_updated.fetch_add(count, Ordering::Relaxed);
    }

    // Invocations

    pub fn increment_invocations_enqueued(&self) {
        self.invocations_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_invocations_finished(&self) {
        self.invocations_finished.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_invocations_failed(&self) {
        self.invocations_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Unknown operation handle, rejected before enqueue.
    pub fn increment_invocations_rejected(&self) {
        self.invocations_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Queue full, refused at enqueue.
    pub fn increment_invocations_refused(&self) {
        self.invocations_refused.fetch_add(1, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            transactions_aborted: self.transactions_aborted.load(Ordering::Relaxed),
            transactions_noop: self.transactions_noop.load(Ordering::Relaxed),
            descriptors_inserted: self.descriptors_inserted.load(Ordering::Relaxed),
            descriptors_removed: self.descriptors_removed.load(Ordering::Relaxed),
            states_updated: self.states_updated.load(Ordering::Relaxed),
            invocations_enqueued: self.invocations_enqueued.load(Ordering::Relaxed),
            invocations_finished: self.invocations_finished.load(Ordering::Relaxed),
            invocations_failed: self.invocations_failed.load(Ordering::Relaxed),
            invocations_rejected: self.invocations_rejected.load(Ordering::Relaxed),
            invocations_refused: self.invocations_refused.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub transactions_committed: u64,
    pub transactions_aborted: u64,
    pub transactions_noop: u64,
    pub descriptors_inserted: u64,
    pub descriptors_removed: u64,
    pub states_updated: u64,
    pub invocations_enqueued: u64,
    pub invocations_finished: u64,
    pub invocations_failed: u64,
    pub invocations_rejected: u64,
    pub invocations_refused: u64,
}

impl MetricsSnapshot {
    /// Render as a JSON object.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_is_zero() {
        let registry = MetricsRegistry::new();
        assert_eq!(registry.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_increment_counters() {
        let registry = MetricsRegistry::new();

        registry.increment_transactions_committed();
        registry.increment_transactions_committed();
        registry.increment_transactions_aborted();
        registry.add_states_updated(3);
        registry.increment_invocations_enqueued();
        registry.increment_invocations_refused();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.transactions_committed, 2);
        assert_eq!(snapshot.transactions_aborted, 1);
        assert_eq!(snapshot.states_updated, 3);
        assert_eq!(snapshot.invocations_enqueued, 1);
        assert_eq!(snapshot.invocations_refused, 1);
    }

    #[test]
    fn test_to_json() {
        let registry = MetricsRegistry::new();
        registry.increment_invocations_failed();

        let parsed: serde_json::Value =
            serde_json::from_str(&registry.snapshot().to_json()).unwrap();
        assert_eq!(parsed["invocations_failed"], 1);
        assert_eq!(parsed["transactions_committed"], 0);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(MetricsRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..100 {
                        reg.increment_transactions_committed();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.snapshot().transactions_committed, 800);
    }
}
