// Execution plans
//
// An ExecutionPlan owns the validated scenario set for one run. It is
// created once, stays immutable, and answers the scheduler's only question:
// given the elapsed time on the global run clock, which scenarios are active
// and what is each one's target concurrency.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::scenario::ScenarioSpec;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    scenarios: Vec<ScenarioSpec>,
}

impl ExecutionPlan {
    /// Validate every scenario and reject duplicate names
    pub fn new(scenarios: Vec<ScenarioSpec>) -> Result<Self> {
        if scenarios.is_empty() {
            return Err(EngineError::config("scenarios", "must not be empty"));
        }

        let mut names = HashSet::new();
        for spec in &scenarios {
            spec.validate()?;
            if !names.insert(spec.name.as_str()) {
                return Err(EngineError::config(
                    "scenario.name",
                    format!("duplicate scenario name '{}'", spec.name),
                ));
            }
        }

        Ok(Self { scenarios })
    }

    pub fn scenarios(&self) -> &[ScenarioSpec] {
        &self.scenarios
    }

    /// Active scenarios and their target concurrency at `elapsed` on the
    /// global clock. Scenarios before their start_offset are dormant and not
    /// listed; scenarios past their window report a target of 0 until their
    /// VUs drain.
    pub fn targets_at(&self, elapsed: Duration) -> Vec<(&ScenarioSpec, u32)> {
        self.scenarios
            .iter()
            .filter_map(|spec| {
                let local = elapsed.checked_sub(spec.start_offset)?;
                Some((spec, spec.target_at(local)))
            })
            .collect()
    }

    /// Upper bound on the run's active window: the latest scenario end,
    /// including start offsets
    pub fn total_window(&self) -> Duration {
        self.scenarios
            .iter()
            .map(|s| s.start_offset + s.window())
            .max()
            .unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{ExecutorKind, Stage};

    fn per_vu(name: &str) -> ScenarioSpec {
        ScenarioSpec::new(
            name,
            "issue_coupon",
            ExecutorKind::PerVuIterations {
                vus: 10,
                iterations: 10,
                max_duration: Duration::from_secs(60),
            },
        )
    }

    #[test]
    fn rejects_empty_plans_and_duplicate_names() {
        assert!(ExecutionPlan::new(vec![]).is_err());
        assert!(ExecutionPlan::new(vec![per_vu("a"), per_vu("a")]).is_err());
        assert!(ExecutionPlan::new(vec![per_vu("a"), per_vu("b")]).is_ok());
    }

    #[test]
    fn rejects_invalid_member_scenarios() {
        let bad = ScenarioSpec::new(
            "bad",
            "issue_coupon",
            ExecutorKind::RampingVus {
                start_vus: 0,
                stages: vec![],
            },
        );
        assert!(ExecutionPlan::new(vec![bad]).is_err());
    }

    #[test]
    fn offset_scenarios_stay_dormant_until_their_start() {
        let first = per_vu("first");
        let second = ScenarioSpec::new(
            "second",
            "issue_coupon",
            ExecutorKind::ConstantVus {
                vus: 5,
                duration: Duration::from_secs(10),
            },
        )
        .with_start_offset(Duration::from_secs(100));

        let plan = ExecutionPlan::new(vec![first, second]).unwrap();

        let early: Vec<&str> = plan
            .targets_at(Duration::from_secs(1))
            .iter()
            .map(|(s, _)| s.name.as_str())
            .collect();
        assert_eq!(early, vec!["first"]);

        let late = plan.targets_at(Duration::from_secs(105));
        let second_target = late
            .iter()
            .find(|(s, _)| s.name == "second")
            .map(|(_, t)| *t);
        assert_eq!(second_target, Some(5));
    }

    #[test]
    fn total_window_includes_offsets() {
        let ramp = ScenarioSpec::new(
            "ramp",
            "issue_coupon",
            ExecutorKind::RampingVus {
                start_vus: 0,
                stages: vec![Stage::new(Duration::from_secs(30), 10)],
            },
        )
        .with_start_offset(Duration::from_secs(60));
        let plan = ExecutionPlan::new(vec![per_vu("seq"), ramp]).unwrap();
        assert_eq!(plan.total_window(), Duration::from_secs(90));
    }
}
