// Run configuration
//
// RunConfig carries the engine-level knobs: the target base URL handed to
// request factories, the global VU ceiling, the scheduler tick cadence, and
// the threshold rules evaluated after the run. Scenario-level parameters
// live on ScenarioSpec.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::scenario::duration_millis;
use crate::threshold::ThresholdRule;

fn default_base_url() -> String {
    "http://localhost:8081".to_string()
}

fn default_max_vus() -> usize {
    1000
}

fn default_tick_interval() -> Duration {
    Duration::from_millis(100)
}

/// Engine-level configuration for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Base URL of the system under test, exposed to request factories
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Resource ceiling on concurrent VUs across all scenarios. Spawns
    /// beyond it are delayed to later ticks, never dropped.
    #[serde(default = "default_max_vus")]
    pub max_vus: usize,

    /// Control-loop cadence; bounds how far realized concurrency can drift
    /// from the profile target
    #[serde(with = "duration_millis", default = "default_tick_interval")]
    pub tick_interval: Duration,

    /// Pass/fail rules evaluated against final sink state
    #[serde(default)]
    pub thresholds: Vec<ThresholdRule>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            max_vus: default_max_vus(),
            tick_interval: default_tick_interval(),
            thresholds: Vec::new(),
        }
    }
}

impl RunConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_max_vus(mut self, max_vus: usize) -> Self {
        self.max_vus = max_vus;
        self
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn with_threshold(mut self, rule: ThresholdRule) -> Self {
        self.thresholds.push(rule);
        self
    }

    pub fn with_thresholds(mut self, rules: impl IntoIterator<Item = ThresholdRule>) -> Self {
        self.thresholds.extend(rules);
        self
    }

    /// Validate before scheduling begins
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(EngineError::config("base_url", "must not be empty"));
        }
        if self.max_vus == 0 {
            return Err(EngineError::config("max_vus", "must be positive"));
        }
        if self.tick_interval.is_zero() {
            return Err(EngineError::config("tick_interval", "must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(RunConfig::default().validate().is_ok());
    }

    #[test]
    fn validation_rejects_zero_knobs() {
        assert!(RunConfig::default().with_max_vus(0).validate().is_err());
        assert!(RunConfig::default()
            .with_tick_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(RunConfig::new("").validate().is_err());
    }

    #[test]
    fn config_round_trips_through_serde() {
        let config = RunConfig::new("http://localhost:9090")
            .with_max_vus(500)
            .with_tick_interval(Duration::from_millis(50))
            .with_threshold(ThresholdRule::parse("errors", "rate<0.05").unwrap());

        let json = serde_json::to_string(&config).unwrap();
        let back: RunConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.base_url, "http://localhost:9090");
        assert_eq!(back.max_vus, 500);
        assert_eq!(back.tick_interval, Duration::from_millis(50));
        assert_eq!(back.thresholds.len(), 1);
    }
}
