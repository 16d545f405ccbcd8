// ============================================================================
// Pipeline — sources, sinks, runtime state, and the orchestrator
// ============================================================================

pub mod orchestrator;
pub mod sink;
pub mod source;
pub mod state;

pub use orchestrator::{Orchestrator, PipelineStats, SimQueue, SimRequest, SIM_QUEUE_CAPACITY};
pub use sink::{CapturingSink, EstimationSink, EventSink};
pub use source::{ReplaySource, SampleEvent, SampleSource};
pub use state::RuntimeState;
