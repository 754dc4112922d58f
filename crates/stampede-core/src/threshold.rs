// Threshold rules
//
// A ThresholdRule asserts a bound over one sink's aggregate after the run:
// (metric, aggregate, comparator, bound). Rules are written in the familiar
// expression form, e.g. `p(95)<1000` or `rate<0.05`, and evaluated exactly
// once against final sink state. A rule whose sink received no samples
// resolves its aggregate to 0 - a defined default callers account for in
// rule design, not a crash.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{EngineError, Result};
use crate::metrics::{MetricsRegistry, Sink};

/// Aggregate resolved from a sink
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    Count,
    Rate,
    Avg,
    Min,
    Max,
    Med,
    /// p(q) for an arbitrary quantile q in [0, 100]
    Percentile(f64),
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregate::Count => write!(f, "count"),
            Aggregate::Rate => write!(f, "rate"),
            Aggregate::Avg => write!(f, "avg"),
            Aggregate::Min => write!(f, "min"),
            Aggregate::Max => write!(f, "max"),
            Aggregate::Med => write!(f, "med"),
            Aggregate::Percentile(q) => write!(f, "p({q})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    fn holds(&self, observed: f64, bound: f64) -> bool {
        match self {
            Comparator::Lt => observed < bound,
            Comparator::Le => observed <= bound,
            Comparator::Gt => observed > bound,
            Comparator::Ge => observed >= bound,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
        }
    }
}

/// One pass/fail rule over a named sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub metric: String,
    pub aggregate: Aggregate,
    pub comparator: Comparator,
    pub bound: f64,
}

impl ThresholdRule {
    pub fn new(
        metric: impl Into<String>,
        aggregate: Aggregate,
        comparator: Comparator,
        bound: f64,
    ) -> Self {
        Self {
            metric: metric.into(),
            aggregate,
            comparator,
            bound,
        }
    }

    /// Parse an expression like `p(95)<1000`, `rate<0.05`, `count>=100`
    pub fn parse(metric: impl Into<String>, expression: &str) -> Result<Self> {
        let expr = expression.trim();

        let (cmp_at, comparator, cmp_len) = ["<=", ">=", "<", ">"]
            .iter()
            .find_map(|op| expr.find(op).map(|at| (at, *op)))
            .map(|(at, op)| {
                let comparator = match op {
                    "<=" => Comparator::Le,
                    ">=" => Comparator::Ge,
                    "<" => Comparator::Lt,
                    _ => Comparator::Gt,
                };
                (at, comparator, op.len())
            })
            .ok_or_else(|| {
                EngineError::config(
                    "threshold",
                    format!("no comparator in expression '{expr}'"),
                )
            })?;

        let aggregate = parse_aggregate(expr[..cmp_at].trim())?;
        let bound: f64 = expr[cmp_at + cmp_len..].trim().parse().map_err(|_| {
            EngineError::config("threshold", format!("invalid bound in '{expr}'"))
        })?;

        Ok(Self::new(metric, aggregate, comparator, bound))
    }

    /// The expression this rule was (or could have been) written as
    pub fn expression(&self) -> String {
        format!("{}{}{}", self.aggregate, self.comparator.as_str(), self.bound)
    }

    /// Resolve the aggregate from final sink state and compare
    pub fn evaluate(&self, registry: &MetricsRegistry) -> ThresholdVerdict {
        let observed = self.observe(registry);
        ThresholdVerdict {
            metric: self.metric.clone(),
            expression: self.expression(),
            observed,
            passed: self.comparator.holds(observed, self.bound),
        }
    }

    fn observe(&self, registry: &MetricsRegistry) -> f64 {
        let Some(sink) = registry.get(&self.metric) else {
            warn!(metric = %self.metric, "threshold references a sink that recorded nothing");
            return 0.0;
        };

        match (&sink, self.aggregate) {
            (Sink::Counter(c), Aggregate::Count) => c.value() as f64,
            (Sink::Rate(r), Aggregate::Rate) => r.rate(),
            (Sink::Rate(r), Aggregate::Count) => r.total() as f64,
            (Sink::Trend(t), Aggregate::Count) => t.count() as f64,
            (Sink::Trend(t), Aggregate::Avg) => t.mean(),
            (Sink::Trend(t), Aggregate::Min) => t.min(),
            (Sink::Trend(t), Aggregate::Max) => t.max(),
            (Sink::Trend(t), Aggregate::Med) => t.median(),
            (Sink::Trend(t), Aggregate::Percentile(q)) => t.quantile(q),
            _ => {
                warn!(
                    metric = %self.metric,
                    aggregate = %self.aggregate,
                    "threshold aggregate does not apply to this sink type"
                );
                0.0
            }
        }
    }
}

impl fmt::Display for ThresholdRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.metric, self.expression())
    }
}

fn parse_aggregate(text: &str) -> Result<Aggregate> {
    match text {
        "count" => Ok(Aggregate::Count),
        "rate" => Ok(Aggregate::Rate),
        "avg" => Ok(Aggregate::Avg),
        "min" => Ok(Aggregate::Min),
        "max" => Ok(Aggregate::Max),
        "med" => Ok(Aggregate::Med),
        _ => {
            let quantile = text
                .strip_prefix("p(")
                .and_then(|rest| rest.strip_suffix(')'))
                .and_then(|q| q.trim().parse::<f64>().ok())
                .filter(|q| (0.0..=100.0).contains(q));
            quantile.map(Aggregate::Percentile).ok_or_else(|| {
                EngineError::config("threshold", format!("unknown aggregate '{text}'"))
            })
        }
    }
}

/// Result of evaluating one rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdVerdict {
    pub metric: String,
    pub expression: String,
    pub observed: f64,
    pub passed: bool,
}

/// Evaluate every rule; the run passes iff all rules pass
pub fn evaluate_all(rules: &[ThresholdRule], registry: &MetricsRegistry) -> Vec<ThresholdVerdict> {
    rules.iter().map(|rule| rule.evaluate(registry)).collect()
}
