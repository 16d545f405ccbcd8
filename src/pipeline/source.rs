//! Sample source abstraction for concentration data ingestion.
//!
//! A unified trait for reading sensor samples from different origins: file
//! replay for commissioning and tests, and live feeds in production. The
//! orchestrator calls [`SampleSource::next_sample`] in a select! with
//! cancellation.

use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::Sample;

/// Events produced by a sample source.
pub enum SampleEvent {
    /// A valid concentration sample was read.
    Sample(Sample),
    /// Source reached end of data (EOF for files, permanent disconnect
    /// for live feeds).
    Eof,
}

/// Trait abstracting where concentration samples come from.
///
/// Implementations own parsing, pacing, reconnection, and transient-fault
/// retry internally. An `Err` from `next_sample` is terminal: the
/// orchestrator drains in-flight work and ends the run, it does not retry
/// the source. A recoverable live-feed hiccup must therefore be absorbed
/// inside the implementation, never surfaced as `Err`.
#[async_trait]
pub trait SampleSource: Send + 'static {
    /// Read the next sample from the source.
    ///
    /// Returns `SampleEvent::Eof` when no more data is available.
    /// Returns `Err` only on unrecoverable errors.
    async fn next_sample(&mut self) -> Result<SampleEvent>;

    /// Human-readable name for logging (e.g. "replay", "live").
    fn source_name(&self) -> &str;
}

// ============================================================================
// Replay Source (file / synthetic replay)
// ============================================================================

/// Replays pre-loaded samples with optional inter-sample delay.
///
/// Enforces the ingest contract as it replays: timestamps must be strictly
/// increasing per sensor. A regression means the replay data is corrupt,
/// which is terminal for a file source.
pub struct ReplaySource {
    samples: std::vec::IntoIter<Sample>,
    delay_ms: u64,
    yielded_first: bool,
    last_seen: HashMap<String, DateTime<Utc>>,
}

impl ReplaySource {
    pub fn new(samples: Vec<Sample>, delay_ms: u64) -> Self {
        Self {
            samples: samples.into_iter(),
            delay_ms,
            yielded_first: false,
            last_seen: HashMap::new(),
        }
    }
}

#[async_trait]
impl SampleSource for ReplaySource {
    async fn next_sample(&mut self) -> Result<SampleEvent> {
        // No delay before the first sample
        if self.yielded_first && self.delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.delay_ms)).await;
        }
        match self.samples.next() {
            Some(s) => {
                if let Some(prev) = self.last_seen.get(&s.sensor_id) {
                    if s.timestamp <= *prev {
                        bail!(
                            "out-of-order sample for {}: {} after {}",
                            s.sensor_id,
                            s.timestamp,
                            prev
                        );
                    }
                }
                self.last_seen.insert(s.sensor_id.clone(), s.timestamp);
                self.yielded_first = true;
                Ok(SampleEvent::Sample(s))
            }
            None => Ok(SampleEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}
