// ============================================================================
// Estimation — hypothesis scoring and the final leak verdict
// ============================================================================
//
// `correlator` scores hypothesis curves against the measured window
// (cross-correlation + FastDTW consensus), `estimator` turns the scores
// into an `EstimationSummary`, `legacy` keeps the pre-canonical
// three-metric policy replayable.

pub mod correlator;
pub mod dtw;
pub mod estimator;
pub mod legacy;

pub use correlator::{CorrelationPeak, Correlator, CorrelatorOutput};
pub use estimator::Estimator;
pub use legacy::{correlate_with_policy, MetricPolicy};
