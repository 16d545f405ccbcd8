//! Anomaly detection — streaming matrix-profile scoring per sensor.
//!
//! - [`store`]: per-sensor matrix-profile state, created lazily from opaque
//!   baseline blobs
//! - [`engine`]: the online OK / WARNING / CRITICAL classifier with the
//!   interactive-feedback side mode
//! - [`baseline_selection`]: the offline best-seed-baseline subroutine

pub mod baseline_selection;
pub mod engine;
pub mod store;

pub use baseline_selection::{select_baseline, SeedBaseline, SelectionOutcome};
pub use engine::{AnomalyEngine, FeedbackMode};
pub use store::{decode_baseline, encode_baseline, ProfileStore, SensorProfile};
