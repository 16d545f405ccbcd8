//! Monitor Configuration Module
//!
//! Provides process-wide configuration loaded from TOML files, covering the
//! anomaly engine, plume simulation, and estimation tunables.
//!
//! ## Loading Order
//!
//! 1. `AEGIR_CONFIG` environment variable (path to TOML file)
//! 2. `monitor_config.toml` in the current working directory
//! 3. Built-in defaults (matching commissioning values)
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! // In the embedding process:
//! config::init(MonitorConfig::load());
//!
//! // Anywhere in the pipeline:
//! let w = config::get().anomaly_detection.window_size;
//! ```
//!
//! Pipeline components additionally accept their config section explicitly in
//! constructors, so tests can run them side by side with different tunables
//! without touching the global.

mod monitor_config;

pub use monitor_config::*;

use std::sync::OnceLock;

/// Global monitor configuration, initialized once at startup.
static MONITOR_CONFIG: OnceLock<MonitorConfig> = OnceLock::new();

/// Initialize the global monitor configuration.
///
/// Must be called exactly once before any calls to `get()`.
pub fn init(config: MonitorConfig) {
    if MONITOR_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
    }
}

/// Get a reference to the global monitor configuration.
///
/// Panics if `init()` has not been called. A missing config is a fatal
/// startup error, not a recoverable condition.
pub fn get() -> &'static MonitorConfig {
    MONITOR_CONFIG
        .get()
        .expect("config::get() called before config::init() — this is a startup bug")
}

/// Check whether the config has been initialized.
///
/// Useful for tests and optional config paths.
pub fn is_initialized() -> bool {
    MONITOR_CONFIG.get().is_some()
}
