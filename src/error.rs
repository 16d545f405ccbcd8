//! Crate-wide error taxonomy.
//!
//! Recovery policy (enforced by the orchestrator):
//! - `NotEnoughHistory` — recoverable; the anomaly engine emits UNDEFINED
//!   instead, baseline selection raises it and the caller skips the cycle.
//! - `Unprocessable` — the offending sample/anomaly is dropped, the pipeline
//!   continues.
//! - `NotImplemented` — closed-template simulation; the anomaly is dropped.
//! - `Upstream` — source/sink fault; the task backs off and retries on a
//!   bounded schedule.
//! - `Fatal` — inconsistent internal state; the sensor's matrix profile is
//!   rebuilt from its initial baseline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Not enough history: have {have} samples, need {need}")]
    NotEnoughHistory { have: usize, need: usize },

    #[error("Unprocessable input: {0}")]
    Unprocessable(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Fatal internal inconsistency: {0}")]
    Fatal(String),
}

impl MonitorError {
    /// Whether the orchestrator may keep the sensor task running after this.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, MonitorError::Fatal(_))
    }
}
