// ============================================================================
// Event Dispatcher — debounced sensor, template, and system events
// ============================================================================
//
// Every classified sample passes through here, but events only leave when
// something changed: a per-sensor ring of the last emitted event types
// suppresses repeats, and template events roll up from the sensors'
// latest types.

use std::collections::{HashMap, VecDeque};

use tracing::info;

use crate::types::{
    Deviation, Sample, SensorEvent, SensorEventType, SystemEvent, SystemSeverity, TemplateEvent,
};

/// How many emitted event types each sensor's debounce ring remembers.
const RING_CAPACITY: usize = 3;

/// Per-sensor debounce state plus template membership.
pub struct EventDispatcher {
    /// sensor id -> ring of recently emitted event types, newest at the back
    rings: HashMap<String, VecDeque<SensorEventType>>,
    /// sensor id -> owning template id
    memberships: HashMap<String, String>,
    /// sensor id -> latest known event type (debounced or not)
    latest: HashMap<String, SensorEventType>,
}

/// Everything one deviation produced.
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    pub sensor_event: Option<SensorEvent>,
    pub template_event: Option<TemplateEvent>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            rings: HashMap::new(),
            memberships: HashMap::new(),
            latest: HashMap::new(),
        }
    }

    /// Register a sensor under its template so rollups can see it.
    pub fn register_sensor(&mut self, sensor_id: &str, template_id: &str) {
        self.memberships
            .insert(sensor_id.to_string(), template_id.to_string());
    }

    /// Route one classified sample. A sensor event is emitted iff its
    /// mapped event type differs from the most recently emitted one; a
    /// template event follows whenever the rollup changes.
    pub fn dispatch(&mut self, sample: &Sample, deviation: Deviation) -> DispatchOutcome {
        let event_type = SensorEventType::from(deviation);
        self.latest.insert(sample.sensor_id.clone(), event_type);

        let ring = self.rings.entry(sample.sensor_id.clone()).or_default();
        if ring.back() == Some(&event_type) {
            return DispatchOutcome::default();
        }
        if ring.len() == RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(event_type);

        info!(
            sensor = %sample.sensor_id,
            event = ?event_type,
            deviation = %deviation,
            "sensor event"
        );
        let sensor_event = SensorEvent {
            sensor_id: sample.sensor_id.clone(),
            event_type,
            deviation,
            timestamp: sample.timestamp,
        };

        let template_event = self
            .memberships
            .get(&sample.sensor_id)
            .cloned()
            .map(|template_id| TemplateEvent {
                event_type: self.rollup(&template_id),
                template_id,
                timestamp: sample.timestamp,
            });

        DispatchOutcome {
            sensor_event: Some(sensor_event),
            template_event,
        }
    }

    /// Template policy: Critical iff any sensor is Critical, Ok iff all
    /// reporting sensors are Ok, NotAvailable otherwise.
    fn rollup(&self, template_id: &str) -> SensorEventType {
        let types: Vec<SensorEventType> = self
            .memberships
            .iter()
            .filter(|(_, t)| t.as_str() == template_id)
            .filter_map(|(s, _)| self.latest.get(s).copied())
            .collect();

        if types.iter().any(|t| *t == SensorEventType::Critical) {
            SensorEventType::Critical
        } else if !types.is_empty() && types.iter().all(|t| *t == SensorEventType::Ok) {
            SensorEventType::Ok
        } else {
            SensorEventType::NotAvailable
        }
    }

    /// System-level message, e.g. baseline adoption or a sensor going
    /// online/offline. Not debounced.
    pub fn system_event(&self, severity: SystemSeverity, message: impl Into<String>) -> SystemEvent {
        let message = message.into();
        info!(severity = ?severity, message = %message, "system event");
        SystemEvent {
            severity,
            message,
            timestamp: chrono::Utc::now(),
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
