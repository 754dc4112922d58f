// Virtual users
//
// A VirtualUser is the ephemeral unit of concurrency: one task looping
// {build request -> await transport -> classify -> record -> pace}. The only
// suspension points are the transport call and the pacing sleep; both race
// the global stop signal. Per-iteration failures are data (classified
// outcomes), so the loop itself never fails.
//
// Termination paths:
// - iteration limit reached (per-vu-iterations executors)
// - retire flag set by the scheduler (ramp-down, window end)
// - global stop signal; an iteration abandoned mid-request is counted as
//   cancelled, not recorded as an outcome

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::classify::classify;
use crate::metrics::Recorder;
use crate::scenario::ScenarioSpec;
use crate::transport::{HttpTransport, RequestSpec};

/// Everything a request factory may vary a request on
#[derive(Debug, Clone)]
pub struct IterationContext {
    pub scenario: Arc<str>,
    /// 1-based, stable for the VU's lifetime, scoped to its scenario
    pub vu_id: u64,
    /// 0-based iteration counter, scoped to this VU
    pub iteration: u64,
    /// Identity drawn from the scenario's strategy for this iteration
    pub user_id: u64,
    pub base_url: Arc<str>,
}

/// Builds the request for one iteration; registered per entry-point name
pub type RequestFactory = Arc<dyn Fn(&IterationContext) -> RequestSpec + Send + Sync>;

/// VU lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VuState {
    Spawned,
    Running,
    Sleeping,
    Terminated,
}

/// Shared per-scenario dependencies for this scenario's VU tasks
pub(crate) struct VuRuntime {
    pub spec: Arc<ScenarioSpec>,
    pub transport: Arc<dyn HttpTransport>,
    pub factory: RequestFactory,
    pub recorder: Recorder,
    pub base_url: Arc<str>,
    /// Self-termination bound for per-vu-iterations executors
    pub iteration_limit: Option<u64>,
}

pub(crate) struct VirtualUser {
    vu_id: u64,
    iteration: u64,
    state: VuState,
}

impl VirtualUser {
    pub fn new(vu_id: u64) -> Self {
        Self {
            vu_id,
            iteration: 0,
            state: VuState::Spawned,
        }
    }

    /// Drive the iteration loop until a termination path fires
    pub async fn run(
        mut self,
        rt: Arc<VuRuntime>,
        retire: Arc<AtomicBool>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let scenario: Arc<str> = rt.spec.name.as_str().into();
        debug!(scenario = %scenario, vu_id = self.vu_id, "vu spawned");

        loop {
            if retire.load(Ordering::Relaxed) || *shutdown.borrow() {
                break;
            }
            if let Some(limit) = rt.iteration_limit {
                if self.iteration >= limit {
                    break;
                }
            }

            self.state = VuState::Running;
            let user_id = rt.spec.identity.user_id(self.vu_id, self.iteration);
            let ctx = IterationContext {
                scenario: Arc::clone(&scenario),
                vu_id: self.vu_id,
                iteration: self.iteration,
                user_id,
                base_url: Arc::clone(&rt.base_url),
            };
            let request = (rt.factory)(&ctx);

            let outcome = tokio::select! {
                outcome = rt.transport.send(request) => outcome,
                _ = shutdown.changed() => {
                    // shutdown is not an under-test failure; the abandoned
                    // result is discarded, not misfiled
                    rt.recorder.record_cancelled();
                    break;
                }
            };

            let category = classify(&outcome);
            rt.recorder.record(category, &outcome);
            self.iteration += 1;

            if let Some(wait) = rt.spec.pacing.sample() {
                self.state = VuState::Sleeping;
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = shutdown.changed() => break,
                }
            }
        }

        self.state = VuState::Terminated;
        debug!(
            scenario = %scenario,
            vu_id = self.vu_id,
            iterations = self.iteration,
            state = ?self.state,
            "vu terminated"
        );
    }
}
