//! AEGIR-OS: Subsea Methane Leak Monitoring
//!
//! Streaming detection and localization of methane leaks on subsea
//! templates from point-sensor concentration data.
//!
//! ## Architecture
//!
//! - **Anomaly Engine**: Matrix-profile scoring of every sample against a
//!   per-sensor baseline, with operator feedback absorption
//! - **Baseline Selection**: Offline discord-cleaned reseeding of sensors
//! - **Plume Physics**: Bent-over Gaussian regression and a full 2-D
//!   Lagrangian integrator for concentration-at-sensor hypotheses
//! - **Estimation**: Cross-correlation + DTW consensus over the hypothesis
//!   set, yielding a confirmed leak index or an external-cause verdict
//! - **Pipeline**: One tokio task per sensor, a bounded drop-oldest
//!   simulation queue, and debounced event fan-out

pub mod anomaly;
pub mod config;
pub mod error;
pub mod estimation;
pub mod events;
pub mod io;
pub mod matrix_profile;
pub mod pipeline;
pub mod plume;
pub mod simulation;
pub mod types;

// Re-export monitor configuration
pub use config::MonitorConfig;

// Re-export commonly used types
pub use types::{
    Current, Deviation, EstimationResult, EstimationSummary, Hypothesis, Leak, Platform, Position,
    Sample, Sensor, SensorConfig, SensorEvent, SensorEventType, SystemEvent, SystemSeverity,
    Template, TemplateEvent, Wave,
};

// Re-export the error taxonomy
pub use error::MonitorError;

// Re-export core engines
pub use anomaly::{AnomalyEngine, ProfileStore};
pub use estimation::{Correlator, Estimator};
pub use events::EventDispatcher;
pub use matrix_profile::StreamingProfile;
pub use pipeline::{Orchestrator, ReplaySource, RuntimeState};
pub use simulation::SimulationDriver;

/// Install the process-wide tracing subscriber. Honors `RUST_LOG`,
/// defaulting to `info`. Call once at startup; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .try_init();
}
