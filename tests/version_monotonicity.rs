//! Version Monotonicity Tests
//!
//! Tests for version bookkeeping across the entity lifecycle:
//! - MDIB version advances by exactly one per committing scope
//! - Descriptor and state versions never repeat, even across delete/recreate
//! - Subtree removal and parent descriptor bumps

use sdc_mdib::mdib::{MdibError, MdibResult, NodeType, TransactionManager};

fn manager() -> TransactionManager {
    let tm = TransactionManager::with_sequence_id("urn:uuid:versions");
    tm.descriptor_transaction(|tx| -> MdibResult<()> {
        tx.insert_new(NodeType::Mds, "mds", None)?;
        tx.insert_new(NodeType::Vmd, "vmd", Some("mds"))?;
        tx.insert_new(NodeType::Channel, "ch", Some("vmd"))?;
        tx.insert_new(NodeType::NumericMetric, "hr", Some("ch"))
    })
    .unwrap();
    tm
}

// =============================================================================
// MDIB Version Tests
// =============================================================================

/// Each committing scope advances the MDIB version by one, whatever its size.
#[test]
fn test_mdib_version_steps_by_one() {
    let tm = manager();
    assert_eq!(tm.store().mdib_version(), 1);

    let outcome = tm
        .descriptor_transaction(|tx| -> MdibResult<()> {
            tx.insert_new(NodeType::NumericMetric, "rr", Some("ch"))?;
            tx.insert_new(NodeType::NumericMetric, "etco2", Some("ch"))?;
            tx.insert_new(NodeType::StringMetric, "mode", Some("ch"))
        })
        .unwrap();

    assert_eq!(outcome.version.mdib_version, 2);
    assert_eq!(tm.store().mdib_version(), 2);
    assert_eq!(tm.store().version_group().sequence_id, "urn:uuid:versions");
}

// =============================================================================
// Delete / Recreate Tests
// =============================================================================

/// A recreated handle continues above the versions of its previous life.
#[test]
fn test_recreate_continues_versions() {
    let tm = manager();
    tm.descriptor_transaction(|tx| -> MdibResult<()> {
        tx.descriptor_mut("hr")?;
        Ok(())
    })
    .unwrap();
    let old = tm.store().by_handle("hr").unwrap();
    let old_descriptor_version = old.descriptor().descriptor_version;
    let old_state_version = old.state().unwrap().state_version;
    assert_eq!(old_descriptor_version, 1);

    tm.descriptor_transaction(|tx| -> MdibResult<()> { tx.remove("hr") })
        .unwrap();
    assert!(tm.store().by_handle("hr").is_err());
    let entry = tm.ledger_entry("hr").unwrap();
    assert_eq!(entry.descriptor_version, Some(old_descriptor_version));
    assert_eq!(entry.state_version, Some(old_state_version));

    tm.descriptor_transaction(|tx| -> MdibResult<()> {
        tx.insert_new(NodeType::NumericMetric, "hr", Some("ch"))
    })
    .unwrap();

    let recreated = tm.store().by_handle("hr").unwrap();
    assert_eq!(recreated.descriptor().descriptor_version, old_descriptor_version + 1);
    assert_eq!(recreated.state().unwrap().state_version, old_state_version + 1);
    assert_eq!(
        recreated.state().unwrap().descriptor_version,
        recreated.descriptor().descriptor_version
    );
}

/// Deleting and recreating one handle inside a single scope is rejected.
#[test]
fn test_delete_and_recreate_in_one_scope() {
    let tm = manager();
    let err = tm
        .descriptor_transaction(|tx| -> MdibResult<()> {
            tx.remove("hr")?;
            tx.insert_new(NodeType::NumericMetric, "hr", Some("ch"))
        })
        .unwrap_err();
    assert!(matches!(err, MdibError::Duplicate { ref handle } if handle == "hr"));
    assert!(tm.store().by_handle("hr").is_ok());
}

// =============================================================================
// Structure Tests
// =============================================================================

/// Removing a descriptor removes its whole subtree and bumps the parent.
#[test]
fn test_subtree_removal_bumps_parent() {
    let tm = manager();
    let vmd_version = tm.store().by_handle("vmd").unwrap().descriptor().descriptor_version;

    tm.descriptor_transaction(|tx| -> MdibResult<()> { tx.remove("ch") })
        .unwrap();

    let store = tm.store();
    assert!(store.by_handle("ch").is_err());
    assert!(store.by_handle("hr").is_err());
    assert!(tm.ledger_entry("hr").is_some());

    let result = tm.last_result().unwrap();
    let mut deleted: Vec<&str> = result.descr_deleted.iter().map(|d| d.handle.as_str()).collect();
    deleted.sort_unstable();
    assert_eq!(deleted, vec!["ch", "hr"]);

    let vmd = store.by_handle("vmd").unwrap();
    assert_eq!(vmd.descriptor().descriptor_version, vmd_version + 1);
    assert!(result.descr_updated.iter().any(|d| d.handle == "vmd"));
}

/// Inserting a child bumps the parent's descriptor and state versions.
#[test]
fn test_insert_bumps_parent_once() {
    let tm = manager();
    let ch = tm.store().by_handle("ch").unwrap();
    let descriptor_version = ch.descriptor().descriptor_version;
    let state_version = ch.state().unwrap().state_version;

    tm.descriptor_transaction(|tx| -> MdibResult<()> {
        tx.insert_new(NodeType::NumericMetric, "rr", Some("ch"))?;
        tx.insert_new(NodeType::NumericMetric, "etco2", Some("ch"))
    })
    .unwrap();

    let ch = tm.store().by_handle("ch").unwrap();
    assert_eq!(ch.descriptor().descriptor_version, descriptor_version + 1);
    assert_eq!(ch.state().unwrap().state_version, state_version + 1);
    assert_eq!(ch.state().unwrap().descriptor_version, descriptor_version + 1);
}

/// Inserting below an unknown parent fails without side effects.
#[test]
fn test_insert_with_unknown_parent() {
    let tm = manager();
    let err = tm
        .descriptor_transaction(|tx| -> MdibResult<()> {
            tx.insert_new(NodeType::NumericMetric, "rr", Some("ghost"))
        })
        .unwrap_err();
    assert!(matches!(err, MdibError::NotFound { .. } | MdibError::InvalidStructure(_)));
    assert_eq!(tm.store().mdib_version(), 1);
}
