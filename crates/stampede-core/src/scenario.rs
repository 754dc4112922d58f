// Scenario specifications
//
// A ScenarioSpec declares how one population of virtual users behaves over
// time: which executor shapes the concurrency curve, which identity strategy
// VUs draw from, how iterations are paced, and which registered entry point
// builds the requests. Specs are validated once and immutable afterwards;
// target_at() is a pure function of the spec.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::identity::IdentityStrategy;

fn default_graceful_stop() -> Duration {
    Duration::from_secs(30)
}

/// One ramp stage: linearly interpolate toward `target` over `duration`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub target: u32,
}

impl Stage {
    pub fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }
}

/// Executor kinds realizing declarative concurrency profiles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "executor", rename_all = "kebab-case")]
pub enum ExecutorKind {
    /// Fixed population for a fixed window
    ConstantVus {
        vus: u32,
        #[serde(with = "duration_millis")]
        duration: Duration,
    },
    /// Piecewise-linear concurrency curve over ordered stages
    RampingVus {
        #[serde(default)]
        start_vus: u32,
        stages: Vec<Stage>,
    },
    /// Fixed population, each VU running a fixed iteration count
    PerVuIterations {
        vus: u32,
        iterations: u64,
        #[serde(with = "duration_millis")]
        max_duration: Duration,
    },
}

/// Think-time between iterations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "pacing", rename_all = "snake_case")]
pub enum PacingSpec {
    /// Back-to-back iterations
    #[default]
    None,
    /// Fixed wait after every iteration
    Fixed {
        #[serde(with = "duration_millis")]
        wait: Duration,
    },
    /// Uniform random wait in [min, max], simulating user think-time
    Uniform {
        #[serde(with = "duration_millis")]
        min: Duration,
        #[serde(with = "duration_millis")]
        max: Duration,
    },
}

impl PacingSpec {
    /// Draw the wait for one iteration, None for unpaced scenarios
    pub fn sample(&self) -> Option<Duration> {
        match self {
            PacingSpec::None => None,
            PacingSpec::Fixed { wait } => Some(*wait),
            PacingSpec::Uniform { min, max } => {
                if min == max {
                    return Some(*min);
                }
                let millis = rand::thread_rng().gen_range(min.as_millis()..=max.as_millis());
                Some(Duration::from_millis(millis as u64))
            }
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            PacingSpec::Uniform { min, max } if min > max => {
                Err(EngineError::config("pacing", "min must not exceed max"))
            }
            _ => Ok(()),
        }
    }
}

/// Immutable specification of one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSpec {
    /// Unique scenario name, used to tag metrics
    pub name: String,

    /// Entry point identifier, resolved against the runner's registered
    /// request factories
    pub exec: String,

    /// Concurrency profile
    #[serde(flatten)]
    pub executor: ExecutorKind,

    /// Delay relative to the global run clock before this scenario starts
    #[serde(with = "duration_millis", default)]
    pub start_offset: Duration,

    /// How long retiring VUs may finish their current iteration before being
    /// force-aborted
    #[serde(with = "duration_millis", default = "default_graceful_stop")]
    pub graceful_stop: Duration,

    /// Identity strategy for this scenario's VUs
    pub identity: IdentityStrategy,

    /// Think-time between iterations
    #[serde(default)]
    pub pacing: PacingSpec,
}

impl ScenarioSpec {
    pub fn new(name: impl Into<String>, exec: impl Into<String>, executor: ExecutorKind) -> Self {
        Self {
            name: name.into(),
            exec: exec.into(),
            executor,
            start_offset: Duration::ZERO,
            graceful_stop: default_graceful_stop(),
            identity: IdentityStrategy::RandomPool { pool_size: 100_000 },
            pacing: PacingSpec::None,
        }
    }

    pub fn with_start_offset(mut self, offset: Duration) -> Self {
        self.start_offset = offset;
        self
    }

    pub fn with_graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.graceful_stop = graceful_stop;
        self
    }

    pub fn with_identity(mut self, identity: IdentityStrategy) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_pacing(mut self, pacing: PacingSpec) -> Self {
        self.pacing = pacing;
        self
    }

    /// Validate the spec, naming the offending field on failure
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(EngineError::config("scenario.name", "must not be empty"));
        }
        if self.exec.is_empty() {
            return Err(EngineError::config("scenario.exec", "must not be empty"));
        }

        match &self.executor {
            ExecutorKind::ConstantVus { vus, duration } => {
                if *vus == 0 {
                    return Err(EngineError::config("scenario.vus", "must be positive"));
                }
                if duration.is_zero() {
                    return Err(EngineError::config("scenario.duration", "must be positive"));
                }
            }
            ExecutorKind::RampingVus { stages, .. } => {
                if stages.is_empty() {
                    return Err(EngineError::config("scenario.stages", "must not be empty"));
                }
                if stages.iter().all(|s| s.duration.is_zero()) {
                    return Err(EngineError::config(
                        "scenario.stages",
                        "total duration must be positive",
                    ));
                }
            }
            ExecutorKind::PerVuIterations {
                vus,
                iterations,
                max_duration,
            } => {
                if *vus == 0 {
                    return Err(EngineError::config("scenario.vus", "must be positive"));
                }
                if *iterations == 0 {
                    return Err(EngineError::config("scenario.iterations", "must be positive"));
                }
                if max_duration.is_zero() {
                    return Err(EngineError::config(
                        "scenario.max_duration",
                        "must be positive",
                    ));
                }
            }
        }

        self.identity.validate()?;
        self.pacing.validate()
    }

    /// Target concurrency at `elapsed` since this scenario's own start
    /// (start_offset already subtracted by the caller)
    ///
    /// Ramping profiles interpolate linearly between stage boundaries; a
    /// zero-duration stage is an instant jump to its target. Past the
    /// profile's window the target is 0.
    pub fn target_at(&self, elapsed: Duration) -> u32 {
        match &self.executor {
            ExecutorKind::ConstantVus { vus, duration } => {
                if elapsed < *duration {
                    *vus
                } else {
                    0
                }
            }
            ExecutorKind::PerVuIterations { vus, max_duration, .. } => {
                if elapsed < *max_duration {
                    *vus
                } else {
                    0
                }
            }
            ExecutorKind::RampingVus { start_vus, stages } => {
                let mut stage_start = Duration::ZERO;
                let mut from = *start_vus;
                for stage in stages {
                    let stage_end = stage_start + stage.duration;
                    if elapsed < stage_end {
                        let span = stage.duration.as_secs_f64();
                        if span == 0.0 {
                            return stage.target;
                        }
                        let frac = (elapsed - stage_start).as_secs_f64() / span;
                        let interpolated =
                            from as f64 + (stage.target as f64 - from as f64) * frac;
                        return interpolated.round() as u32;
                    }
                    from = stage.target;
                    stage_start = stage_end;
                }
                0
            }
        }
    }

    /// Length of this scenario's active window, excluding start_offset.
    /// For PerVuIterations this is the hard cutoff, not the expected runtime.
    pub fn window(&self) -> Duration {
        match &self.executor {
            ExecutorKind::ConstantVus { duration, .. } => *duration,
            ExecutorKind::PerVuIterations { max_duration, .. } => *max_duration,
            ExecutorKind::RampingVus { stages, .. } => {
                stages.iter().map(|s| s.duration).sum()
            }
        }
    }
}

/// Serde support for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramping(start_vus: u32, stages: Vec<Stage>) -> ScenarioSpec {
        ScenarioSpec::new(
            "ramp",
            "issue_coupon",
            ExecutorKind::RampingVus { start_vus, stages },
        )
    }

    #[test]
    fn ramping_target_interpolates_linearly() {
        let spec = ramping(
            0,
            vec![
                Stage::new(Duration::from_secs(60), 100),
                Stage::new(Duration::from_secs(60), 100),
                Stage::new(Duration::from_secs(30), 0),
            ],
        );

        assert_eq!(spec.target_at(Duration::ZERO), 0);
        assert_eq!(spec.target_at(Duration::from_secs(30)), 50);
        assert_eq!(spec.target_at(Duration::from_secs(60)), 100);
        assert_eq!(spec.target_at(Duration::from_secs(90)), 100);
        assert_eq!(spec.target_at(Duration::from_secs(135)), 50);
        assert_eq!(spec.target_at(Duration::from_secs(151)), 0);
    }

    #[test]
    fn ramping_target_starts_from_start_vus() {
        let spec = ramping(50, vec![Stage::new(Duration::from_secs(10), 100)]);
        assert_eq!(spec.target_at(Duration::ZERO), 50);
        assert_eq!(spec.target_at(Duration::from_secs(5)), 75);
    }

    #[test]
    fn zero_duration_stage_jumps_instantly() {
        let spec = ramping(
            0,
            vec![
                Stage::new(Duration::ZERO, 40),
                Stage::new(Duration::from_secs(10), 40),
            ],
        );
        assert_eq!(spec.target_at(Duration::ZERO), 40);
        assert_eq!(spec.target_at(Duration::from_secs(9)), 40);
    }

    #[test]
    fn constant_vus_target_is_flat_inside_the_window() {
        let spec = ScenarioSpec::new(
            "steady",
            "charge_balance",
            ExecutorKind::ConstantVus {
                vus: 100,
                duration: Duration::from_secs(60),
            },
        );
        assert_eq!(spec.target_at(Duration::ZERO), 100);
        assert_eq!(spec.target_at(Duration::from_secs(59)), 100);
        assert_eq!(spec.target_at(Duration::from_secs(60)), 0);
    }

    #[test]
    fn window_sums_ramping_stages() {
        let spec = ramping(
            0,
            vec![
                Stage::new(Duration::from_secs(30), 50),
                Stage::new(Duration::from_secs(60), 100),
            ],
        );
        assert_eq!(spec.window(), Duration::from_secs(90));
    }

    #[test]
    fn validation_names_the_offending_field() {
        let spec = ScenarioSpec::new(
            "bad",
            "issue_coupon",
            ExecutorKind::PerVuIterations {
                vus: 0,
                iterations: 10,
                max_duration: Duration::from_secs(60),
            },
        );
        match spec.validate().unwrap_err() {
            EngineError::Config { field, .. } => assert_eq!(field, "scenario.vus"),
            other => panic!("unexpected error: {other}"),
        }

        let empty_stages = ramping(0, vec![]);
        assert!(empty_stages.validate().is_err());

        let unnamed = ScenarioSpec::new(
            "",
            "issue_coupon",
            ExecutorKind::ConstantVus {
                vus: 1,
                duration: Duration::from_secs(1),
            },
        );
        assert!(unnamed.validate().is_err());
    }

    #[test]
    fn uniform_pacing_requires_ordered_bounds() {
        let spec = ScenarioSpec::new(
            "paced",
            "issue_coupon",
            ExecutorKind::ConstantVus {
                vus: 1,
                duration: Duration::from_secs(1),
            },
        )
        .with_pacing(PacingSpec::Uniform {
            min: Duration::from_secs(3),
            max: Duration::from_secs(1),
        });
        assert!(spec.validate().is_err());
    }

    #[test]
    fn pacing_samples_stay_in_bounds() {
        let pacing = PacingSpec::Uniform {
            min: Duration::from_millis(1000),
            max: Duration::from_millis(3000),
        };
        for _ in 0..100 {
            let wait = pacing.sample().unwrap();
            assert!(wait >= Duration::from_millis(1000));
            assert!(wait <= Duration::from_millis(3000));
        }
        assert!(PacingSpec::None.sample().is_none());
    }

    #[test]
    fn spec_round_trips_through_serde() {
        let spec = ramping(
            0,
            vec![
                Stage::new(Duration::from_secs(30), 300),
                Stage::new(Duration::from_secs(60), 500),
            ],
        )
        .with_start_offset(Duration::from_secs(5))
        .with_identity(IdentityStrategy::RandomPool { pool_size: 300_000 })
        .with_pacing(PacingSpec::Fixed {
            wait: Duration::from_millis(100),
        });

        let json = serde_json::to_string(&spec).unwrap();
        let back: ScenarioSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
        assert!(json.contains("\"executor\":\"ramping-vus\""));
    }
}
