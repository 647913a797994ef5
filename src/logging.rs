//! Diagnostic logging
//!
//! The crate reports through `tracing`; this is a convenience initializer
//! for host applications that do not bring their own subscriber. The
//! `RUST_LOG` environment variable controls the filter.

use tracing_subscriber::EnvFilter;

/// Install a formatted `tracing` subscriber. Safe to call more than once;
/// later calls are no-ops when a subscriber is already set.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
