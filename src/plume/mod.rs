// ============================================================================
// Plume Physics — concentration-at-sensor models for catalogued leaks
// ============================================================================
//
// Two model fidelities share one contract:
//   - `regression::concentration` — the production path: a calibrated
//     bent-over Gaussian plume, cheap enough to run per leak per anomaly.
//   - `integrator::PlumeIntegrator` — a full 2-D Lagrangian plume march
//     used for calibration and cross-checks.
//
// Both return exactly 0.0 for zero current or an upstream sensor, and both
// are pure functions of their inputs.

pub mod integrator;
pub mod regression;
pub mod wave_current;

pub use integrator::{sensor_response, IntegratorConfig, PlumeIntegrator};
pub use regression::concentration;
pub use wave_current::corrected_drag;
