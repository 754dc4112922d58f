// Stampede Core - Load Engine
//
// This crate provides a single-process load-generation and outcome-
// classification engine: declarative scenario profiles realized as
// populations of virtual-user tasks, a deterministic response classifier
// separating success from expected business rejections and system failures,
// and streaming metric sinks feeding percentile statistics, thresholds, and
// the end-of-run summary.
//
// Key design decisions:
// - All I/O goes through the HttpTransport trait; the engine itself never
//   opens a connection (reqwest adapter lives in stampede-http)
// - Request factories are registered by entry-point name and resolved before
//   scheduling starts, so wiring errors fail fast
// - One tokio task per virtual user; a control loop reconciles populations
//   toward the profile's interpolated target every tick
// - Metric sinks live in a per-run registry; no metric state survives a run
// - Business rejections (duplicate, sold-out, insufficient funds/stock) are
//   expected outcomes, recorded but never treated as errors
// - In-memory transports are provided for examples and testing

pub mod classify;
pub mod config;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod outcome;
pub mod plan;
pub mod scenario;
pub mod scheduler;
pub mod summary;
pub mod threshold;
pub mod transport;

// Virtual-user loop internals; the public surface is the Runner
mod vu;

// In-memory implementations for examples and testing
pub mod memory;

// Re-exports for convenience
pub use classify::classify;
pub use config::RunConfig;
pub use error::{EngineError, Result};
pub use identity::IdentityStrategy;
pub use metrics::{Counter, MetricValue, MetricsRegistry, MetricsSnapshot, Rate, Recorder, Trend};
pub use outcome::{OutcomeCategory, RequestOutcome, STATUS_NO_RESPONSE};
pub use plan::ExecutionPlan;
pub use scenario::{ExecutorKind, PacingSpec, ScenarioSpec, Stage};
pub use scheduler::{RunResult, Runner};
pub use threshold::{Aggregate, Comparator, ThresholdRule, ThresholdVerdict};
pub use transport::{HttpTransport, Method, RequestSpec};
pub use vu::{IterationContext, RequestFactory};
