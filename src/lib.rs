//! sdc-mdib - Device-side medical device information base
//!
//! Versioned descriptor/state store with serialised transactions, and
//! per-controller operation execution with ordered invocation reports.

pub mod config;
pub mod mdib;
pub mod observability;
pub mod provider;
pub mod reports;
pub mod sco;

pub use config::{ConfigError, ConfigResult, ProviderConfig};
pub use provider::Provider;
pub use reports::{Report, ReportBroadcaster};
