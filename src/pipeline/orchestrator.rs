//! Pipeline orchestration: per-sensor tasks, the simulation queue, and
//! graceful shutdown.
//!
//! One tokio task per sensor consumes that sensor's samples in arrival
//! order, runs the anomaly engine, and routes every deviation to the event
//! dispatcher. CRITICAL deviations additionally enqueue a simulation
//! request; a dedicated worker drains the queue, runs the simulation
//! driver, correlator, and estimator, and publishes the summary.
//!
//! The simulation queue is bounded: overflow drops the OLDEST pending
//! request, since a fresher anomaly supersedes a stale one.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::estimation::{Correlator, Estimator};
use crate::simulation::SimulationDriver;
use crate::types::{Deviation, EstimationResult, Sample, SensorEventType, SystemSeverity};

use super::sink::{EstimationSink, EventSink};
use super::source::{SampleEvent, SampleSource};
use super::state::RuntimeState;

/// Pending simulation requests kept when the worker falls behind.
pub const SIM_QUEUE_CAPACITY: usize = 10;
/// Per-sensor sample channel depth.
const SENSOR_CHANNEL_CAPACITY: usize = 64;
/// Delivery attempts for sink publishes before giving up on an anomaly.
const PUBLISH_ATTEMPTS: u32 = 3;

// ============================================================================
// Simulation Queue
// ============================================================================

/// A CRITICAL anomaly waiting for simulation.
#[derive(Debug, Clone)]
pub struct SimRequest {
    pub anomaly: Sample,
}

/// Bounded drop-oldest queue feeding the simulation worker.
pub struct SimQueue {
    inner: Mutex<VecDeque<SimRequest>>,
    notify: Notify,
    capacity: usize,
}

impl SimQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Enqueue a request, dropping the oldest pending one on overflow.
    pub async fn push(&self, request: SimRequest) {
        let mut q = self.inner.lock().await;
        if q.len() == self.capacity {
            if let Some(dropped) = q.pop_front() {
                warn!(
                    sensor = %dropped.anomaly.sensor_id,
                    "simulation queue full, dropping oldest request"
                );
            }
        }
        q.push_back(request);
        drop(q);
        self.notify.notify_one();
    }

    pub async fn pop(&self) -> Option<SimRequest> {
        self.inner.lock().await.pop_front()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    pub async fn notified(&self) {
        self.notify.notified().await
    }
}

// ============================================================================
// Stats
// ============================================================================

/// Counters surfaced after a run for logging and tests.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub samples_processed: u64,
    pub critical_deviations: u64,
    pub summaries_published: u64,
}

#[derive(Default)]
struct SharedStats {
    samples: AtomicU64,
    criticals: AtomicU64,
    summaries: AtomicU64,
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct Orchestrator {
    cfg: MonitorConfig,
    state: Arc<Mutex<RuntimeState>>,
    event_sink: Arc<dyn EventSink>,
    estimation_sink: Arc<dyn EstimationSink>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        cfg: MonitorConfig,
        state: Arc<Mutex<RuntimeState>>,
        event_sink: Arc<dyn EventSink>,
        estimation_sink: Arc<dyn EstimationSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            state,
            event_sink,
            estimation_sink,
            cancel,
        }
    }

    /// Run until the source is exhausted or cancellation. All in-flight
    /// sensor work and every still-queued simulation request is finished
    /// before returning.
    pub async fn run<S: SampleSource>(self, source: &mut S) -> PipelineStats {
        let stats = Arc::new(SharedStats::default());
        let sim_queue = Arc::new(SimQueue::new(SIM_QUEUE_CAPACITY));

        let sim_cancel = CancellationToken::new();
        let sim_handle = tokio::spawn(Self::simulation_worker(
            self.cfg.clone(),
            Arc::clone(&self.state),
            Arc::clone(&self.event_sink),
            Arc::clone(&self.estimation_sink),
            Arc::clone(&sim_queue),
            sim_cancel.clone(),
            Arc::clone(&stats),
        ));

        let mut senders: HashMap<String, mpsc::Sender<Sample>> = HashMap::new();
        let mut sensor_handles = Vec::new();

        info!(source = source.source_name(), "sample processing started");

        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("shutdown signal received");
                    break;
                }
                result = source.next_sample() => {
                    match result {
                        Ok(ev) => ev,
                        Err(e) => {
                            warn!(error = %e, "sample source error");
                            break;
                        }
                    }
                }
            };

            let sample = match event {
                SampleEvent::Sample(s) => s,
                SampleEvent::Eof => {
                    info!(
                        samples = stats.samples.load(Ordering::Relaxed),
                        "source reached end"
                    );
                    break;
                }
            };

            if !sample.is_valid() {
                warn!(sensor = %sample.sensor_id, ppmv = sample.ppmv, "invalid sample skipped");
                continue;
            }

            if !senders.contains_key(&sample.sensor_id) {
                let known = {
                    let state = self.state.lock().await;
                    state.sensors.contains_key(&sample.sensor_id)
                };
                if !known {
                    warn!(sensor = %sample.sensor_id, "sample from unregistered sensor dropped");
                    continue;
                }
                let (tx, rx) = mpsc::channel(SENSOR_CHANNEL_CAPACITY);
                sensor_handles.push(tokio::spawn(Self::sensor_task(
                    sample.sensor_id.clone(),
                    rx,
                    self.cfg.clone(),
                    Arc::clone(&self.state),
                    Arc::clone(&self.event_sink),
                    Arc::clone(&sim_queue),
                    Arc::clone(&stats),
                )));
                senders.insert(sample.sensor_id.clone(), tx);
            }
            // Bounded channel: backpressure rather than unbounded growth
            if senders[&sample.sensor_id].send(sample).await.is_err() {
                warn!("sensor task terminated early, sample dropped");
            }
        }

        // Drain: close channels, let sensor tasks finish their backlog
        senders.clear();
        for handle in sensor_handles {
            if let Err(e) = handle.await {
                error!(error = %e, "sensor task panicked");
            }
        }

        // Let the simulation worker drain what the sensor tasks enqueued
        while !sim_queue.is_empty().await {
            tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        }
        sim_cancel.cancel();
        if let Err(e) = sim_handle.await {
            error!(error = %e, "simulation worker panicked");
        }

        PipelineStats {
            samples_processed: stats.samples.load(Ordering::Relaxed),
            critical_deviations: stats.criticals.load(Ordering::Relaxed),
            summaries_published: stats.summaries.load(Ordering::Relaxed),
        }
    }

    // ------------------------------------------------------------------------
    // Per-sensor task
    // ------------------------------------------------------------------------

    async fn sensor_task(
        sensor_id: String,
        mut rx: mpsc::Receiver<Sample>,
        cfg: MonitorConfig,
        state: Arc<Mutex<RuntimeState>>,
        event_sink: Arc<dyn EventSink>,
        sim_queue: Arc<SimQueue>,
        stats: Arc<SharedStats>,
    ) {
        while let Some(sample) = rx.recv().await {
            let outcome = {
                let mut state = state.lock().await;
                let Some(sensor) = state.sensors.get(&sensor_id).cloned() else {
                    warn!(sensor = %sensor_id, "sensor vanished from catalogue");
                    continue;
                };
                let (deviation, _mode) = state.engine.process(&sensor, &sample);
                let dispatch = state.dispatcher.dispatch(&sample, deviation);
                let adoption = Self::maybe_select_baseline(&mut state, &sensor_id, &sample, &cfg);
                (deviation, dispatch, adoption)
            };
            // State committed; everything below is fire-and-report
            let (deviation, dispatch, adoption) = outcome;
            stats.samples.fetch_add(1, Ordering::Relaxed);
            if deviation == Deviation::Critical {
                stats.criticals.fetch_add(1, Ordering::Relaxed);
            }

            // The dispatcher debounces, so a Some(Critical) sensor event marks
            // the transition into CRITICAL. A sustained excursion runs one
            // simulation, not one per sample.
            let critical_transition = matches!(
                &dispatch.sensor_event,
                Some(ev) if ev.event_type == SensorEventType::Critical
            );

            if let Some(ev) = dispatch.sensor_event {
                Self::publish_with_retry(
                    || event_sink.publish_sensor_event(ev.clone()),
                    &sensor_id,
                    "sensor event",
                )
                .await;
            }
            if let Some(ev) = dispatch.template_event {
                Self::publish_with_retry(
                    || event_sink.publish_template_event(ev.clone()),
                    &sensor_id,
                    "template event",
                )
                .await;
            }

            if let Some(ev) = adoption {
                Self::publish_with_retry(
                    || event_sink.publish_system_event(ev.clone()),
                    &sensor_id,
                    "system event",
                )
                .await;
            }

            if critical_transition && cfg.simulation.turn_on {
                sim_queue.push(SimRequest { anomaly: sample }).await;
            }
        }
    }

    /// Periodic baseline selection: every `baseline_selection_limit`
    /// samples per sensor, run selection over the accumulated history and
    /// adopt the winning seed. Returns the system event announcing an
    /// adoption, to be published outside the state lock.
    fn maybe_select_baseline(
        state: &mut RuntimeState,
        sensor_id: &str,
        sample: &Sample,
        cfg: &MonitorConfig,
    ) -> Option<crate::types::SystemEvent> {
        let limit = cfg.anomaly_detection.baseline_selection_limit;
        if !state.record_for_selection(sensor_id, sample.ppmv, limit) {
            return None;
        }
        match state.run_baseline_selection(sensor_id, &cfg.anomaly_detection) {
            Ok(Some(outcome)) => {
                let seed = &state.seed_bank[outcome.seed_index];
                let message = format!("baseline adopted for {}: seed {}", sensor_id, seed.name);
                Some(
                    state
                        .dispatcher
                        .system_event(SystemSeverity::AlertSuccess, message),
                )
            }
            Ok(None) => None,
            Err(MonitorError::NotEnoughHistory { have, need }) => {
                warn!(sensor = %sensor_id, have, need, "selection cycle skipped, history too short after cleaning");
                None
            }
            Err(e) => {
                warn!(sensor = %sensor_id, error = %e, "baseline selection failed");
                None
            }
        }
    }

    /// At-least-once delivery with bounded backoff; sinks dedupe.
    ///
    /// Returns false when all attempts were exhausted.
    async fn publish_with_retry<F, Fut>(publish: F, sensor_id: &str, what: &str) -> bool
    where
        F: Fn() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        for attempt in 1..=PUBLISH_ATTEMPTS {
            match publish().await {
                Ok(()) => return true,
                Err(e) => {
                    warn!(sensor = %sensor_id, what, attempt, error = %e, "publish failed");
                    if attempt < PUBLISH_ATTEMPTS {
                        tokio::time::sleep(tokio::time::Duration::from_millis(
                            100 * attempt as u64,
                        ))
                        .await;
                    }
                }
            }
        }
        error!(sensor = %sensor_id, what, "delivery abandoned");
        false
    }

    // ------------------------------------------------------------------------
    // Simulation worker
    // ------------------------------------------------------------------------

    async fn simulation_worker(
        cfg: MonitorConfig,
        state: Arc<Mutex<RuntimeState>>,
        event_sink: Arc<dyn EventSink>,
        estimation_sink: Arc<dyn EstimationSink>,
        queue: Arc<SimQueue>,
        cancel: CancellationToken,
        stats: Arc<SharedStats>,
    ) {
        let driver = SimulationDriver::new(cfg.simulation.clone());
        let correlator = Correlator::new(cfg.estimation.clone());
        let estimator = Estimator::new(cfg.estimation.clone());

        loop {
            while let Some(request) = queue.pop().await {
                Self::handle_request(
                    &cfg,
                    &state,
                    &event_sink,
                    &estimation_sink,
                    &driver,
                    &correlator,
                    &estimator,
                    request,
                    &stats,
                )
                .await;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = queue.notified() => {}
            }
        }
        // Final sweep for requests that raced the cancellation
        while let Some(request) = queue.pop().await {
            Self::handle_request(
                &cfg,
                &state,
                &event_sink,
                &estimation_sink,
                &driver,
                &correlator,
                &estimator,
                request,
                &stats,
            )
            .await;
        }
    }

    /// One anomaly end to end. Failures here never take the pipeline down:
    /// recoverable errors skip the anomaly, Fatal inconsistencies rebuild
    /// the sensor's profile from its initial baseline.
    #[allow(clippy::too_many_arguments)]
    async fn handle_request(
        cfg: &MonitorConfig,
        state: &Arc<Mutex<RuntimeState>>,
        event_sink: &Arc<dyn EventSink>,
        estimation_sink: &Arc<dyn EstimationSink>,
        driver: &SimulationDriver,
        correlator: &Correlator,
        estimator: &Estimator,
        request: SimRequest,
        stats: &Arc<SharedStats>,
    ) {
        let sensor_id = request.anomaly.sensor_id.clone();
        let w = cfg.anomaly_detection.window_size;

        let gathered = {
            let state = state.lock().await;
            let Some(sensor) = state.sensors.get(&sensor_id).cloned() else {
                warn!(sensor = %sensor_id, "anomaly for unknown sensor dropped");
                return;
            };
            let Some(template) = state.templates.get(&sensor.template_id).cloned() else {
                warn!(sensor = %sensor_id, template = %sensor.template_id, "template missing");
                return;
            };
            let leaks = state
                .leaks
                .get(&sensor.template_id)
                .cloned()
                .unwrap_or_default();
            let Some(reference) = state.measured_window(&sensor_id, w) else {
                warn!(sensor = %sensor_id, "measured window shorter than W, anomaly skipped");
                return;
            };
            let neighbors = state.neighbor_windows(&sensor_id, w);
            (
                sensor,
                template,
                leaks,
                reference,
                neighbors,
                state.currents.clone(),
                state.waves.clone(),
            )
        };
        let (sensor, template, leaks, reference, neighbors, currents, waves) = gathered;

        if leaks.is_empty() {
            warn!(template = %template.id, "no catalogued leaks, anomaly skipped");
            return;
        }

        let verdict = driver
            .hypotheses(&sensor, &template, &leaks, &currents, &waves, w)
            .and_then(|hypotheses| {
                if hypotheses.is_empty() {
                    return Err(MonitorError::Unprocessable(
                        "simulation produced no hypotheses".into(),
                    ));
                }
                correlator.correlate(&reference, &hypotheses, &neighbors)
            })
            .map(|scores| estimator.estimate(&request.anomaly, &scores));

        let summary = match verdict {
            Ok(s) => s,
            Err(e) if e.is_recoverable() => {
                warn!(sensor = %sensor_id, error = %e, "anomaly skipped");
                return;
            }
            Err(e) => {
                error!(sensor = %sensor_id, error = %e, "fatal inconsistency, rebuilding profile");
                let mut state = state.lock().await;
                if let Some(profile) = state.engine.store_mut().get_mut(&sensor_id) {
                    profile.rebuild();
                }
                return;
            }
        };

        let published = Self::publish_with_retry(
            || estimation_sink.publish_summary(summary.clone()),
            &sensor_id,
            "summary",
        )
        .await;
        if !published {
            return;
        }
        stats.summaries.fetch_add(1, Ordering::Relaxed);

        let severity = match summary.result {
            EstimationResult::Confirmed => SystemSeverity::AlertCritical,
            EstimationResult::ExternalCause => SystemSeverity::AlertSuccess,
            _ => SystemSeverity::Info,
        };
        let message = format!(
            "estimation for {}: {} (confidence {:.2}, leakage index {})",
            sensor_id, summary.result, summary.confidence, summary.leakage_index
        );
        let event = {
            let state = state.lock().await;
            state.dispatcher.system_event(severity, message)
        };
        Self::publish_with_retry(
            || event_sink.publish_system_event(event.clone()),
            &sensor_id,
            "system event",
        )
        .await;
    }
}
