// Scenario scheduling and run execution
//
// The Runner realizes an ExecutionPlan as time-varying populations of VU
// tasks. A control loop ticks on its own cadence, reconciling each
// scenario's live population toward the profile's interpolated target:
// spawning below target, marking the newest VUs retire-after-current-
// iteration above it. VU spawns past the global ceiling are delayed to later
// ticks (backpressure), never dropped.
//
// Shutdown: a watch channel fans the stop signal out to every VU task and
// halts new spawns within one tick; stragglers are force-aborted once the
// longest graceful-stop window elapses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::RunConfig;
use crate::error::{EngineError, Result};
use crate::metrics::{MetricsRegistry, MetricsSnapshot, Recorder};
use crate::plan::ExecutionPlan;
use crate::scenario::{ExecutorKind, ScenarioSpec};
use crate::threshold::{evaluate_all, ThresholdVerdict};
use crate::transport::{HttpTransport, RequestSpec};
use crate::vu::{IterationContext, RequestFactory, VirtualUser, VuRuntime};

/// Final result of one run: the sink snapshot, the threshold verdicts, and
/// the overall pass/fail. Serializes with stable field names so exports can
/// be diffed across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub wall_clock_ms: u64,
    /// True when the run was stopped before its plan completed
    pub aborted: bool,
    pub metrics: MetricsSnapshot,
    pub thresholds: Vec<ThresholdVerdict>,
    pub passed: bool,
}

struct VuHandle {
    vu_id: u64,
    retire: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

struct ScenarioState {
    spec: Arc<ScenarioSpec>,
    runtime: Arc<VuRuntime>,
    next_vu_id: u64,
    vus: Vec<VuHandle>,
    done: bool,
}

impl ScenarioState {
    /// Drop finished handles; returns the live population
    fn prune(&mut self) -> usize {
        self.vus.retain(|vu| !vu.handle.is_finished());
        self.vus.len()
    }

    /// Live VUs not already marked for retirement
    fn active(&self) -> usize {
        self.vus
            .iter()
            .filter(|vu| !vu.retire.load(Ordering::Relaxed))
            .count()
    }

    fn retire_all(&self) {
        for vu in &self.vus {
            vu.retire.store(true, Ordering::Relaxed);
        }
    }

    fn abort_all(&self) {
        for vu in &self.vus {
            debug!(scenario = %self.spec.name, vu_id = vu.vu_id, "force-aborting vu");
            vu.handle.abort();
        }
    }
}

/// Load-test runner
///
/// Owns the transport, the entry-point registry, and the run configuration.
/// Request factories are registered by name before running; every scenario's
/// `exec` must resolve to one, checked before any VU is spawned.
pub struct Runner {
    transport: Arc<dyn HttpTransport>,
    config: RunConfig,
    factories: HashMap<String, RequestFactory>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Runner {
    pub fn new(transport: Arc<dyn HttpTransport>, config: RunConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            transport,
            config,
            factories: HashMap::new(),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Register the request factory for an entry-point name
    pub fn register<F>(&mut self, exec: impl Into<String>, factory: F)
    where
        F: Fn(&IterationContext) -> RequestSpec + Send + Sync + 'static,
    {
        self.factories.insert(exec.into(), Arc::new(factory));
    }

    /// Signal the current run to stop. New spawns halt within one tick;
    /// in-flight iterations are abandoned without being recorded. The signal
    /// is sticky: construct a new Runner for a fresh run.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Execute the plan to completion and evaluate thresholds
    #[instrument(skip(self, plan))]
    pub async fn run_once(&self, plan: ExecutionPlan) -> Result<RunResult> {
        self.config.validate()?;

        let run_id = Uuid::now_v7();
        let started_at = Utc::now();
        let registry = Arc::new(MetricsRegistry::new());
        // realized concurrency, sampled once per control tick
        let vus_trend = registry.trend("vus")?;

        // Resolve every scenario's factory and sinks up front so config and
        // wiring errors fail before scheduling starts
        let mut scenarios = Vec::with_capacity(plan.scenarios().len());
        for spec in plan.scenarios() {
            let factory = self
                .factories
                .get(&spec.exec)
                .cloned()
                .ok_or_else(|| EngineError::UnknownEntryPoint(spec.exec.clone()))?;
            let recorder = Recorder::new(&registry, &spec.name)?;
            let spec = Arc::new(spec.clone());
            let iteration_limit = match spec.executor {
                ExecutorKind::PerVuIterations { iterations, .. } => Some(iterations),
                _ => None,
            };
            let runtime = Arc::new(VuRuntime {
                spec: Arc::clone(&spec),
                transport: Arc::clone(&self.transport),
                factory,
                recorder,
                base_url: self.config.base_url.as_str().into(),
                iteration_limit,
            });
            scenarios.push(ScenarioState {
                spec,
                runtime,
                next_vu_id: 1,
                vus: Vec::new(),
                done: false,
            });
        }

        let permits = Arc::new(Semaphore::new(self.config.max_vus));
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        let start = Instant::now();
        let mut aborted = false;

        info!(
            %run_id,
            scenarios = scenarios.len(),
            max_vus = self.config.max_vus,
            "run started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_rx.changed() => {
                    aborted = true;
                    break;
                }
            }

            let elapsed = start.elapsed();
            let mut total_alive = 0;
            let mut all_done = true;

            for state in scenarios.iter_mut() {
                if state.done {
                    continue;
                }
                reconcile(state, elapsed, &permits, &self.shutdown_rx);
                total_alive += state.vus.len();
                if !state.done {
                    all_done = false;
                }
            }

            vus_trend.add(total_alive as f64);
            if all_done {
                break;
            }
        }

        if aborted {
            info!(%run_id, "stop requested, draining virtual users");
        }
        drain(&mut scenarios).await;

        let wall_clock = start.elapsed();
        let thresholds = evaluate_all(&self.config.thresholds, &registry);
        let passed = thresholds.iter().all(|v| v.passed);
        let metrics = registry.snapshot();

        info!(
            %run_id,
            wall_clock_ms = wall_clock.as_millis() as u64,
            requests = metrics.counter_value("requests"),
            passed,
            "run finished"
        );

        Ok(RunResult {
            run_id,
            started_at,
            wall_clock_ms: wall_clock.as_millis() as u64,
            aborted,
            metrics,
            thresholds,
            passed,
        })
    }
}

/// Converge one scenario's population toward its target for this tick
fn reconcile(
    state: &mut ScenarioState,
    elapsed: Duration,
    permits: &Arc<Semaphore>,
    shutdown_rx: &watch::Receiver<bool>,
) {
    // dormant until the global clock reaches start_offset
    let Some(local) = elapsed.checked_sub(state.spec.start_offset) else {
        return;
    };

    state.prune();
    let window = state.spec.window();

    match &state.spec.executor {
        ExecutorKind::PerVuIterations { vus, .. } => {
            let vus = u64::from(*vus);
            if local < window {
                // one-shot population; the ceiling may spread spawns over
                // several ticks
                while state.next_vu_id <= vus {
                    if !spawn_vu(state, permits, shutdown_rx) {
                        break;
                    }
                }
            } else {
                // hard cutoff
                state.retire_all();
                state.abort_all();
            }
            let spawned_all = state.next_vu_id > vus;
            if (spawned_all || local >= window) && state.prune() == 0 {
                state.done = true;
            }
        }
        ExecutorKind::ConstantVus { vus, duration } => {
            if local < *duration {
                let target = *vus as usize;
                let mut deficit = target.saturating_sub(state.active());
                while deficit > 0 && spawn_vu(state, permits, shutdown_rx) {
                    deficit -= 1;
                }
            } else {
                state.retire_all();
                if local >= *duration + state.spec.graceful_stop {
                    state.abort_all();
                }
                if state.prune() == 0 {
                    state.done = true;
                }
            }
        }
        ExecutorKind::RampingVus { .. } => {
            let target = state.spec.target_at(local) as usize;
            let active = state.active();

            if target > active {
                let mut deficit = target - active;
                while deficit > 0 && spawn_vu(state, permits, shutdown_rx) {
                    deficit -= 1;
                }
            } else if active > target {
                // retire the newest VUs first, after their current iteration
                let mut excess = active - target;
                for vu in state.vus.iter().rev() {
                    if excess == 0 {
                        break;
                    }
                    if !vu.retire.swap(true, Ordering::Relaxed) {
                        excess -= 1;
                    }
                }
            }

            if local >= window {
                state.retire_all();
                if local >= window + state.spec.graceful_stop {
                    state.abort_all();
                }
                if state.prune() == 0 {
                    state.done = true;
                }
            }
        }
    }
}

/// Spawn one VU if a permit is available; false delays the spawn to a later
/// tick
fn spawn_vu(
    state: &mut ScenarioState,
    permits: &Arc<Semaphore>,
    shutdown_rx: &watch::Receiver<bool>,
) -> bool {
    let permit = match Arc::clone(permits).try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            debug!(scenario = %state.spec.name, "vu ceiling reached, delaying spawn");
            return false;
        }
    };

    let vu_id = state.next_vu_id;
    state.next_vu_id += 1;

    let retire = Arc::new(AtomicBool::new(false));
    let vu = VirtualUser::new(vu_id);
    let runtime = Arc::clone(&state.runtime);
    let retire_flag = Arc::clone(&retire);
    let shutdown = shutdown_rx.clone();

    let handle = tokio::spawn(async move {
        let _permit = permit;
        vu.run(runtime, retire_flag, shutdown).await;
    });

    state.vus.push(VuHandle {
        vu_id,
        retire,
        handle,
    });
    true
}

/// Retire every remaining VU, then force-abort whatever outlives the longest
/// graceful-stop window
async fn drain(scenarios: &mut [ScenarioState]) {
    for state in scenarios.iter() {
        state.retire_all();
    }

    let grace = scenarios
        .iter()
        .map(|s| s.spec.graceful_stop)
        .max()
        .unwrap_or(Duration::ZERO);
    let deadline = Instant::now() + grace;

    loop {
        let alive: usize = scenarios.iter_mut().map(|s| s.prune()).sum();
        if alive == 0 {
            break;
        }
        if Instant::now() >= deadline {
            warn!(remaining = alive, "grace period elapsed, aborting stragglers");
            for state in scenarios.iter() {
                state.abort_all();
            }
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
