//! Log subscriber setup.
//!
//! The runtime only emits `tracing` events; installing a subscriber is left to
//! the host. [`init`] installs the fmt subscriber at the configured level.

use tracing::Level;

use super::config::RtsConfig;

/// Install a global fmt subscriber honouring `config.log_level`.
///
/// Returns `false` when a global subscriber was already installed, which is
/// the normal case when several tests call this.
pub fn init(config: &RtsConfig) -> bool {
    let level = config.log_level.parse::<Level>().unwrap_or(Level::WARN);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}

/// Subscriber for test binaries: output is captured per test.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::TRACE)
        .with_test_writer()
        .try_init();
}
