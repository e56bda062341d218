//! Observability subsystem
//!
//! - Structured logging (one JSON object per line)
//! - Typed lifecycle events
//! - Atomic counters
//!
//! Observability is read-only: nothing here changes control flow.
//!
//! # Usage
//!
//! ```ignore
//! use sdc_mdib::observability::{log_event, Event};
//!
//! log_event(Event::TransactionCommit, &[("mdib_version", "7")]);
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

/// Log a typed event at its default severity.
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_does_not_panic() {
        log_event(Event::ProviderStart, &[]);
        log_event(Event::InvocationFailed, &[("message", "boom")]);
    }
}
