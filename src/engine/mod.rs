//! --------------------------
//! INFORMATION
//! --------------------------
//! Title: Processing Loop
//! Author: Carlos Eduardo Favini
//! Date: 2025-02-20
//! Version: 1.1.0
//! Description: Periodic cooperative driver. Each tick enqueues one job
//! per analyzable signal onto a worker pool; a per-signal lease keeps at
//! most one worker on a signal and preserves per-signal analysis order.
//! A signal whose previous analysis has not finished is skipped for the
//! tick and its overrun counter incremented.
//! Layer: Core
//! Dependencies: crossbeam-channel, num_cpus, registry, detect, control,
//! aggregate, bus
//! Affected Components: system
//!
//! --------------------------
//! CONCURRENCY CONTRACT
//! --------------------------
//! The scheduler never holds locks across CPU-heavy work: workers copy a
//! snapshot under the buffer read lock, release it, then compute.
//! Analyses are safe to abandon; results for an unregistered signal are
//! simply not published. A panicking analysis marks the signal errored
//! and excludes it from the loop until reconfigured; the registry and
//! every other signal stay available.
//!
//! --------------------------
//! CHANGE LOG
//! --------------------------
//! 2025-02-20 - Carlos Eduardo Favini - Initial creation (v1.0.0)
//! 2025-02-28 - Carlos Eduardo Favini - Panic isolation per signal (v1.1.0)
//! --------------------------

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::aggregate::Aggregator;
use crate::bus::{topics, Event, EventBus, EventPayload};
use crate::control::{ControlState, ControllerBank};
use crate::core::clock::wall_clock_us;
use crate::detect::run_analysis;
use crate::detect::types::{AnalysisResult, Severity};
use crate::metrics::CoreMetrics;
use crate::registry::{SignalEntry, SignalRegistry};

/// Loop timing and pool sizing.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Tick period of the cooperative scheduler.
    pub tick: Duration,
    /// Worker threads; defaults to the machine's logical CPU count.
    pub workers: usize,
    /// Bound of the job queue between scheduler and workers.
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            workers: num_cpus::get().max(1),
            queue_capacity: 1024,
        }
    }
}

/// Shared analysis driver. Owns no threads itself; [`ProcessingLoop`]
/// drives it periodically, and `tick_once` drives it synchronously.
pub struct Engine {
    registry: Arc<SignalRegistry>,
    bus: Arc<EventBus>,
    aggregator: Arc<Aggregator>,
    controllers: Arc<ControllerBank>,
    metrics: Arc<CoreMetrics>,
}

impl Engine {
    pub fn new(
        registry: Arc<SignalRegistry>,
        bus: Arc<EventBus>,
        aggregator: Arc<Aggregator>,
        controllers: Arc<ControllerBank>,
        metrics: Arc<CoreMetrics>,
    ) -> Self {
        Self {
            registry,
            bus,
            aggregator,
            controllers,
            metrics,
        }
    }

    /// Runs one full tick synchronously on the calling thread: every
    /// analyzable signal, due pipelines, and a metrics snapshot.
    pub fn tick_once(&self) {
        for entry in self.registry.entries() {
            if !self.wants_processing(&entry) {
                continue;
            }
            if entry.try_lease() {
                self.process_entry(&entry);
                entry.release_lease();
            } else {
                entry.metrics().record_loop_overrun();
            }
        }
        self.aggregator.run_due_pipelines();
        self.publish_metrics();
    }

    fn wants_processing(&self, entry: &Arc<SignalEntry>) -> bool {
        if entry.is_errored() || entry.is_invalidated() {
            return false;
        }
        !entry.config().analysis_modes.is_empty() || self.controllers.has_threshold(entry.id())
    }

    /// Analyzes one signal: snapshot, every enabled mode, cache, events.
    /// Never lets a per-signal failure escape.
    fn process_entry(&self, entry: &Arc<SignalEntry>) {
        let id = entry.id().to_string();
        let config = entry.config();
        let samples = entry.snapshot();

        let computed = std::panic::catch_unwind(AssertUnwindSafe(|| {
            config
                .analysis_modes
                .iter()
                .map(|mode| run_analysis(&id, *mode, &samples, &config))
                .collect::<Vec<_>>()
        }));

        let records = match computed {
            Ok(records) => records,
            Err(_) => {
                // Invariant violation inside an analysis. The worker
                // survives; the signal is quarantined until reconfigured.
                entry.mark_errored();
                log::error!("analysis panicked for signal '{}'; marked errored", id);
                self.bus.publish(Event {
                    topic: topics::error(&id),
                    timestamp_us: wall_clock_us(),
                    signal_id: Some(id),
                    payload: EventPayload::Error {
                        message: "analysis panicked; signal excluded until reconfigured".into(),
                    },
                });
                return;
            }
        };

        // Unregistered mid-flight: abandon silently.
        if entry.is_invalidated() || !self.registry.is_current(entry) {
            return;
        }

        for record in records {
            entry.metrics().record_analysis_completed();

            if let AnalysisResult::Anomaly(anomaly) = &record.result {
                entry.metrics().record_anomalies(anomaly.anomalies.len() as u64);
                if !anomaly.anomalies.is_empty() {
                    let max_severity = anomaly
                        .anomalies
                        .iter()
                        .map(|p| p.severity)
                        .max()
                        .unwrap_or(Severity::Low);
                    self.bus.publish(Event {
                        topic: topics::anomaly(&record.signal_id),
                        timestamp_us: wall_clock_us(),
                        signal_id: Some(record.signal_id.clone()),
                        payload: EventPayload::Anomaly {
                            count: anomaly.anomalies.len(),
                            max_severity,
                        },
                    });
                }
            }

            self.bus.publish(Event {
                topic: topics::analysis(&record.signal_id, record.mode),
                timestamp_us: wall_clock_us(),
                signal_id: Some(record.signal_id.clone()),
                payload: EventPayload::Analysis {
                    mode: record.mode,
                    summary: record.result.summary(),
                    degraded: record.degraded,
                },
            });
            entry.store_analysis(record);
        }

        // Threshold controllers watch the freshest sample each tick.
        if self.controllers.has_threshold(entry.id()) {
            if let Some(sample) = entry.last_sample() {
                if let Ok(outcome) = self.controllers.apply_control(entry.id(), sample.value) {
                    if matches!(
                        outcome.state,
                        ControlState::TriggeredAbove | ControlState::TriggeredBelow
                    ) {
                        self.bus.publish(Event {
                            topic: topics::alert(entry.id()),
                            timestamp_us: wall_clock_us(),
                            signal_id: Some(entry.id().to_string()),
                            payload: EventPayload::Alert {
                                state: outcome.state,
                                value: outcome.value,
                                threshold: outcome.threshold,
                            },
                        });
                    }
                }
            }
        }
    }

    fn publish_metrics(&self) {
        let per_signal: HashMap<String, _> = self
            .registry
            .entries()
            .iter()
            .map(|e| (e.id().to_string(), e.metrics_snapshot()))
            .collect();
        self.bus.publish(Event {
            topic: topics::METRICS.to_string(),
            timestamp_us: wall_clock_us(),
            signal_id: None,
            payload: EventPayload::Metrics {
                per_signal,
                subscribers_dropped: self.metrics.subscribers_dropped.load(Ordering::Relaxed),
                aggregation_timeouts: self.metrics.aggregation_timeouts.load(Ordering::Relaxed),
            },
        });
    }
}

struct Job {
    entry: Arc<SignalEntry>,
}

/// Periodic driver: a scheduler thread feeding a worker pool.
pub struct ProcessingLoop {
    stop: Arc<AtomicBool>,
    scheduler: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl ProcessingLoop {
    /// Starts the scheduler and worker threads.
    pub fn start(engine: Arc<Engine>, config: EngineConfig) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let (job_tx, job_rx): (Sender<Job>, Receiver<Job>) = bounded(config.queue_capacity.max(1));

        let workers = (0..config.workers.max(1))
            .map(|i| {
                let rx = job_rx.clone();
                let engine = Arc::clone(&engine);
                std::thread::Builder::new()
                    .name(format!("dsp-worker-{}", i))
                    .spawn(move || {
                        while let Ok(job) = rx.recv() {
                            engine.process_entry(&job.entry);
                            job.entry.release_lease();
                        }
                    })
                    .expect("spawn worker thread")
            })
            .collect();

        let scheduler = {
            let stop = Arc::clone(&stop);
            let engine = Arc::clone(&engine);
            std::thread::Builder::new()
                .name("dsp-scheduler".to_string())
                .spawn(move || {
                    while !stop.load(Ordering::Acquire) {
                        let tick_started = Instant::now();
                        Self::schedule_tick(&engine, &job_tx);
                        engine.aggregator.run_due_pipelines();
                        engine.publish_metrics();

                        let elapsed = tick_started.elapsed();
                        if let Some(remaining) = config.tick.checked_sub(elapsed) {
                            std::thread::sleep(remaining);
                        }
                    }
                    // job_tx drops here; workers drain and exit.
                })
                .expect("spawn scheduler thread")
        };

        Self {
            stop,
            scheduler: Some(scheduler),
            workers,
        }
    }

    fn schedule_tick(engine: &Engine, job_tx: &Sender<Job>) {
        for entry in engine.registry.entries() {
            if !engine.wants_processing(&entry) {
                continue;
            }
            // The lease throttles signals whose prior analysis is still
            // running: skip this tick, count the overrun.
            if !entry.try_lease() {
                entry.metrics().record_loop_overrun();
                continue;
            }
            match job_tx.try_send(Job {
                entry: Arc::clone(&entry),
            }) {
                Ok(()) => {}
                Err(_) => {
                    entry.release_lease();
                    entry.metrics().record_loop_overrun();
                }
            }
        }
    }

    /// Signals shutdown and joins every thread. Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.scheduler.take() {
            let _ = handle.join();
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }
}

impl Drop for ProcessingLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ThresholdConfig, ThresholdStrategyKind};
    use crate::core::types::{AnalysisMode, SignalConfig};
    use crate::sampler::Sampler;

    fn harness() -> (Arc<Engine>, Arc<SignalRegistry>, Sampler, Arc<EventBus>) {
        let registry = Arc::new(SignalRegistry::new());
        let metrics = Arc::new(CoreMetrics::new());
        let bus = Arc::new(EventBus::new(Arc::clone(&metrics)));
        let sampler = Sampler::new(Arc::clone(&registry), Arc::clone(&metrics));
        let aggregator = Arc::new(Aggregator::new(
            Arc::clone(&registry),
            sampler.clone(),
            Arc::clone(&metrics),
        ));
        let controllers = Arc::new(ControllerBank::new());
        let engine = Arc::new(Engine::new(
            Arc::clone(&registry),
            Arc::clone(&bus),
            aggregator,
            controllers,
            metrics,
        ));
        (engine, registry, sampler, bus)
    }

    fn feed(sampler: &Sampler, id: &str, values: &[f64]) {
        for (i, &v) in values.iter().enumerate() {
            sampler.sample_at(id, v, Some((i as u64 + 1) * 1000), None);
        }
    }

    #[test]
    fn test_tick_populates_cache_and_publishes() {
        let (engine, registry, sampler, bus) = harness();
        let sub = bus.subscribe("analysis:cpu:basic");

        registry
            .register("cpu", SignalConfig::new().with_mode(AnalysisMode::Basic))
            .unwrap();
        feed(&sampler, "cpu", &[1.0, 2.0, 3.0, 4.0]);

        engine.tick_once();

        let entry = registry.get("cpu").unwrap();
        let record = entry.cached_analysis(AnalysisMode::Basic).unwrap();
        assert!(!record.result.is_insufficient());
        assert_eq!(entry.metrics_snapshot().analyses_completed, 1);

        let events = sub.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].topic, "analysis:cpu:basic");
    }

    #[test]
    fn test_signal_without_modes_is_skipped() {
        let (engine, registry, _sampler, _bus) = harness();
        registry.register("idle", SignalConfig::default()).unwrap();
        engine.tick_once();
        let entry = registry.get("idle").unwrap();
        assert_eq!(entry.metrics_snapshot().analyses_completed, 0);
    }

    #[test]
    fn test_leased_signal_counts_overrun() {
        let (engine, registry, sampler, _bus) = harness();
        registry
            .register("cpu", SignalConfig::new().with_mode(AnalysisMode::Basic))
            .unwrap();
        feed(&sampler, "cpu", &[1.0, 2.0]);

        let entry = registry.get("cpu").unwrap();
        assert!(entry.try_lease());
        engine.tick_once();
        entry.release_lease();

        assert_eq!(entry.metrics_snapshot().loop_overruns, 1);
        assert_eq!(entry.metrics_snapshot().analyses_completed, 0);
    }

    #[test]
    fn test_metrics_event_published_each_tick() {
        let (engine, _registry, _sampler, bus) = harness();
        let sub = bus.subscribe(topics::METRICS);
        engine.tick_once();
        engine.tick_once();
        assert_eq!(sub.drain().len(), 2);
    }

    #[test]
    fn test_alert_published_on_trigger() {
        let (engine, registry, sampler, bus) = harness();
        let sub = bus.subscribe("alert:cpu");

        registry.register("cpu", SignalConfig::default()).unwrap();
        engine
            .controllers
            .create_threshold(
                "cpu",
                ThresholdConfig {
                    strategy: ThresholdStrategyKind::Statistical,
                    initial_threshold: 1.0,
                    hysteresis: 0.1,
                    dead_band: 0.01,
                    ..ThresholdConfig::default()
                },
            )
            .unwrap();
        feed(&sampler, "cpu", &[5.0]);

        engine.tick_once();

        let events = sub.drain();
        assert_eq!(events.len(), 1);
        match &events[0].payload {
            EventPayload::Alert { state, value, .. } => {
                assert_eq!(*state, ControlState::TriggeredAbove);
                assert_eq!(*value, 5.0);
            }
            other => panic!("expected alert, got {:?}", other),
        }
    }

    #[test]
    fn test_background_loop_runs_and_stops() {
        let (engine, registry, sampler, _bus) = harness();
        registry
            .register("cpu", SignalConfig::new().with_mode(AnalysisMode::Basic))
            .unwrap();
        feed(&sampler, "cpu", &[1.0, 2.0, 3.0]);

        let mut processing = ProcessingLoop::start(
            Arc::clone(&engine),
            EngineConfig {
                tick: Duration::from_millis(10),
                workers: 2,
                queue_capacity: 64,
            },
        );
        std::thread::sleep(Duration::from_millis(120));
        processing.stop();

        let entry = registry.get("cpu").unwrap();
        assert!(entry.metrics_snapshot().analyses_completed >= 1);
        assert!(entry.cached_analysis(AnalysisMode::Basic).is_some());
        // Idempotent stop.
        processing.stop();
    }

    #[test]
    fn test_unregistered_mid_flight_not_published() {
        let (engine, registry, sampler, bus) = harness();
        let sub = bus.subscribe("analysis:cpu:basic");
        registry
            .register("cpu", SignalConfig::new().with_mode(AnalysisMode::Basic))
            .unwrap();
        feed(&sampler, "cpu", &[1.0, 2.0]);

        let entry = registry.get("cpu").unwrap();
        registry.unregister("cpu").unwrap();

        // Simulate a worker that took its lease before the unregister.
        assert!(entry.try_lease());
        engine.process_entry(&entry);
        entry.release_lease();

        assert!(sub.drain().is_empty());
    }
}
