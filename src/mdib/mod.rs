//! Medical Device Information Base
//!
//! This module provides:
//! - `EntityStore` - Versioned descriptor/state arena with snapshot reads
//! - `VersionLedger` - Version memory of deleted handles
//! - `TransactionManager` - Scoped, serialised writes
//! - `TransactionResult` - Categorised change-set of a commit
//! - `ChangeSink` - Synchronous commit notification seam
//!
//! # Invariants
//!
//! - The mdib version advances by exactly one per committing transaction
//! - Descriptor and state versions never decrease, not even across a
//!   delete and re-create of the same handle
//! - Readers never observe a partially applied transaction

mod entity;
mod errors;
mod factory;
mod notify;
mod result;
mod store;
mod transaction;
mod types;
mod version_ledger;

pub use entity::Entity;
pub use errors::{MdibError, MdibResult, UsageError};
pub use factory::{DefaultEntityFactory, EntityFactory};
pub use notify::{ChangeSink, SinkError};
pub use result::TransactionResult;
pub use store::{EntityStore, MdibSnapshot, MdibVersionGroup};
pub use transaction::{Transaction, TransactionKind, TransactionManager, TransactionOutcome};
pub use types::{
    AlertActivation, AlertState, Coding, ComponentActivation, ComponentState,
    ContextAssociation, ContextState, Descriptor, Handle, MetricState, MetricValue, NodeType,
    OperatingMode, OperationalState, RealTimeSampleState, State, StateBody, StateCategory,
    DEFAULT_CODING_SYSTEM,
};
pub use version_ledger::{LedgerEntry, VersionLedger};
