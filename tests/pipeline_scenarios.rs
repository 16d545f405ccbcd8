//! End-to-end pipeline scenarios.
//!
//! Drives the orchestrator with a replay source and capturing sinks:
//! steady no-leak operation, a step-up excursion that must trigger
//! simulation and estimation, and per-anomaly isolation on a closed
//! template.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use aegir_os::anomaly::{encode_baseline, SeedBaseline};
use aegir_os::config::{AnomalyDetectionConfig, MonitorConfig};
use aegir_os::matrix_profile::StreamingProfile;
use aegir_os::pipeline::{CapturingSink, Orchestrator, ReplaySource, RuntimeState};
use aegir_os::types::{
    Current, Leak, Position, Sensor, SensorConfig, SensorEventType, SystemSeverity, Template, Wave,
};
use aegir_os::AnomalyEngine;

const W: usize = 144;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

fn samples(sensor: &str, values: &[f64]) -> Vec<aegir_os::Sample> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| aegir_os::Sample {
            sensor_id: sensor.into(),
            timestamp: t0() + chrono::Duration::minutes(10 * i as i64),
            ppmv: *v,
        })
        .collect()
}

/// Constant-concentration seed: every subsequence is flat, so the seed
/// profile is all zeros and any pattern change shows up immediately.
fn seed_blob() -> Vec<u8> {
    let series = vec![2.0; 2 * W];
    encode_baseline(&StreamingProfile::from_series(&series, W))
}

fn sensor(id: &str) -> Sensor {
    Sensor {
        id: id.into(),
        position: Position::new(15.0, 2.0, 4.0),
        template_id: "T1".into(),
        config: SensorConfig {
            initial_baseline: seed_blob(),
            interactive_feedback_mode: false,
        },
    }
}

fn template(closed: bool) -> Template {
    Template {
        id: "T1".into(),
        angle_from_north: 0.0,
        roof_height: if closed { Some(10.0) } else { None },
        platform: "Alpha".into(),
    }
}

fn leaks() -> Vec<Leak> {
    vec![
        Leak {
            name: "valve-7".into(),
            position: Position::new(0.0, 0.0, 1.5),
            rate: 0.5,
            duration: 600.0,
        },
        Leak {
            name: "flange-2".into(),
            position: Position::new(5.0, -3.0, 2.0),
            rate: 0.2,
            duration: 600.0,
        },
        Leak {
            name: "manifold-1".into(),
            position: Position::new(-4.0, 6.0, 1.0),
            rate: 0.8,
            duration: 600.0,
        },
    ]
}

fn config() -> MonitorConfig {
    let mut cfg = MonitorConfig::default();
    cfg.anomaly_detection = AnomalyDetectionConfig {
        window_size: W,
        ..AnomalyDetectionConfig::default()
    };
    cfg
}

fn runtime(cfg: &MonitorConfig, closed: bool) -> Arc<Mutex<RuntimeState>> {
    let mut state = RuntimeState::new(AnomalyEngine::new(cfg.anomaly_detection.clone()));
    state.add_template(template(closed), leaks());
    state.add_sensor(sensor("S1"));
    state.currents = vec![Current::new(0.3, 0.0); 2 * W];
    state.waves = vec![
        Wave {
            height: 0.5,
            period: 8.0,
            angle_from_north: 0.0,
        };
        2 * W
    ];
    Arc::new(Mutex::new(state))
}

async fn run(values: &[f64], closed: bool) -> (Arc<CapturingSink>, aegir_os::pipeline::PipelineStats) {
    let cfg = config();
    let state = runtime(&cfg, closed);
    let sink = Arc::new(CapturingSink::new());
    let orchestrator = Orchestrator::new(
        cfg,
        state,
        Arc::clone(&sink) as Arc<dyn aegir_os::pipeline::EventSink>,
        Arc::clone(&sink) as Arc<dyn aegir_os::pipeline::EstimationSink>,
        CancellationToken::new(),
    );
    let mut source = ReplaySource::new(samples("S1", values), 0);
    let stats = orchestrator.run(&mut source).await;
    (sink, stats)
}

#[tokio::test]
async fn test_steady_sensor_no_leak() {
    let values = vec![2.0; 500];
    let (sink, stats) = run(&values, false).await;

    assert_eq!(stats.samples_processed, 500);
    assert_eq!(stats.critical_deviations, 0);
    assert!(sink.summaries.lock().await.is_empty());

    // One NotAvailable while filling the window, then a single Ok; the
    // debouncer swallows every repeat.
    let events = sink.sensor_events.lock().await;
    let types: Vec<SensorEventType> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(
        types,
        vec![SensorEventType::NotAvailable, SensorEventType::Ok]
    );

    // Consecutive emitted events always differ in type
    for pair in events.windows(2) {
        assert_ne!(pair[0].event_type, pair[1].event_type);
    }
}

#[tokio::test]
async fn test_step_up_excursion_triggers_estimation() {
    let mut values = vec![2.0; W];
    values.extend(vec![200.0; W]);
    let (sink, stats) = run(&values, false).await;

    assert_eq!(stats.samples_processed, 2 * W as u64);
    assert!(stats.critical_deviations >= 1);

    // One sustained excursion is one CRITICAL transition: simulation runs
    // once, not once per elevated sample.
    assert_eq!(stats.summaries_published, 1);
    assert_eq!(sink.summaries.lock().await.len(), 1);
    let events = sink.sensor_events.lock().await;
    let critical_transitions = events
        .iter()
        .filter(|e| e.event_type == SensorEventType::Critical)
        .count();
    assert_eq!(critical_transitions, 1);
    drop(events);

    // The first CRITICAL lands within 50 samples of the step
    let events = sink.sensor_events.lock().await;
    let first_critical = events
        .iter()
        .find(|e| e.event_type == SensorEventType::Critical)
        .expect("a critical event");
    let step_time = t0() + chrono::Duration::minutes(10 * W as i64);
    let elapsed = first_critical.timestamp - step_time;
    assert!(elapsed >= chrono::Duration::zero());
    assert!(elapsed < chrono::Duration::minutes(10 * 50));

    // Template rollup went critical too
    let templates = sink.template_events.lock().await;
    assert!(templates
        .iter()
        .any(|e| e.event_type == SensorEventType::Critical));
}

#[tokio::test]
async fn test_periodic_selection_adopts_and_announces() {
    // Every 200 samples the orchestrator runs baseline selection. A flat
    // seed qualifies on flat history, so each cycle adopts and announces.
    let mut cfg = config();
    cfg.anomaly_detection.baseline_selection_limit = 200;
    let state = runtime(&cfg, false);
    {
        let mut st = state.lock().await;
        let profile = StreamingProfile::from_series(&vec![2.0; 2 * W], W);
        st.seed_bank = vec![SeedBaseline {
            name: "commissioning-flat".into(),
            max_distance: profile.max_profile_value().max(1.0),
            blob: encode_baseline(&profile),
            variance: 0.0,
            skew: 0.0,
        }];
    }
    let sink = Arc::new(CapturingSink::new());
    let orchestrator = Orchestrator::new(
        cfg,
        state,
        Arc::clone(&sink) as Arc<dyn aegir_os::pipeline::EventSink>,
        Arc::clone(&sink) as Arc<dyn aegir_os::pipeline::EstimationSink>,
        CancellationToken::new(),
    );
    let mut source = ReplaySource::new(samples("S1", &vec![2.0; 450]), 0);
    let stats = orchestrator.run(&mut source).await;

    assert_eq!(stats.critical_deviations, 0);
    let system = sink.system_events.lock().await;
    let adoptions = system
        .iter()
        .filter(|e| {
            e.severity == SystemSeverity::AlertSuccess && e.message.contains("baseline adopted")
        })
        .count();
    // Cycles complete at samples 200 and 400
    assert_eq!(adoptions, 2);
}

#[tokio::test]
async fn test_closed_template_isolates_anomalies() {
    // Same excursion, but the template declares a roof: every simulation
    // request is rejected as not-implemented. The pipeline must still
    // classify and finish cleanly with no summaries.
    let mut values = vec![2.0; W];
    values.extend(vec![200.0; W]);
    let (sink, stats) = run(&values, true).await;

    assert_eq!(stats.samples_processed, 2 * W as u64);
    assert!(stats.critical_deviations >= 1);
    assert_eq!(stats.summaries_published, 0);
    assert!(sink.summaries.lock().await.is_empty());
}
