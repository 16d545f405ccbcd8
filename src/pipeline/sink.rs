//! Output sinks for events and estimation summaries.
//!
//! Sinks absorb the externally visible products of the pipeline. Delivery
//! is at-least-once: the orchestrator may re-push after a retried anomaly,
//! so sinks deduplicate on `(sensor_id, timestamp)`.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::types::{EstimationSummary, SensorEvent, SystemEvent, TemplateEvent};

/// Consumer of debounced sensor, template, and system events.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    async fn publish_sensor_event(&self, event: SensorEvent) -> Result<()>;
    async fn publish_template_event(&self, event: TemplateEvent) -> Result<()>;
    async fn publish_system_event(&self, event: SystemEvent) -> Result<()>;
}

/// Consumer of final estimation verdicts.
#[async_trait]
pub trait EstimationSink: Send + Sync + 'static {
    /// Persist one summary. Re-delivery of the same `(sensor_id,
    /// timestamp)` pair must be a no-op.
    async fn publish_summary(&self, summary: EstimationSummary) -> Result<()>;
}

// ============================================================================
// In-memory capturing sinks
// ============================================================================

/// Captures everything in memory. Used by the integration harness and as
/// the reference implementation of the idempotence contract.
#[derive(Default)]
pub struct CapturingSink {
    pub sensor_events: Arc<Mutex<Vec<SensorEvent>>>,
    pub template_events: Arc<Mutex<Vec<TemplateEvent>>>,
    pub system_events: Arc<Mutex<Vec<SystemEvent>>>,
    pub summaries: Arc<Mutex<Vec<EstimationSummary>>>,
    seen: Arc<Mutex<HashSet<(String, i64)>>>,
}

impl CapturingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventSink for CapturingSink {
    async fn publish_sensor_event(&self, event: SensorEvent) -> Result<()> {
        self.sensor_events.lock().await.push(event);
        Ok(())
    }

    async fn publish_template_event(&self, event: TemplateEvent) -> Result<()> {
        self.template_events.lock().await.push(event);
        Ok(())
    }

    async fn publish_system_event(&self, event: SystemEvent) -> Result<()> {
        self.system_events.lock().await.push(event);
        Ok(())
    }
}

#[async_trait]
impl EstimationSink for CapturingSink {
    async fn publish_summary(&self, summary: EstimationSummary) -> Result<()> {
        let key = (
            summary.sensor_id.clone(),
            summary.anomaly.timestamp.timestamp_millis(),
        );
        if !self.seen.lock().await.insert(key) {
            debug!(sensor = %summary.sensor_id, "duplicate summary dropped");
            return Ok(());
        }
        self.summaries.lock().await.push(summary);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EstimationResult, Sample};
    use chrono::{TimeZone, Utc};

    fn summary(minute: u32) -> EstimationSummary {
        let ts = Utc.with_ymd_and_hms(2024, 3, 5, 12, minute, 0).unwrap();
        EstimationSummary {
            result: EstimationResult::Confirmed,
            confidence: 0.8,
            leakage_index: 2,
            sensor_id: "S1".into(),
            anomaly: Sample {
                sensor_id: "S1".into(),
                timestamp: ts,
                ppmv: 180.0,
            },
        }
    }

    #[tokio::test]
    async fn test_duplicate_summary_is_noop() {
        let sink = CapturingSink::new();
        sink.publish_summary(summary(0)).await.unwrap();
        sink.publish_summary(summary(0)).await.unwrap();
        sink.publish_summary(summary(10)).await.unwrap();
        assert_eq!(sink.summaries.lock().await.len(), 2);
    }
}
