//! Mock Run Example - Full engine run against an in-memory target
//!
//! Drives a sequential correctness scenario and a ramping load scenario
//! against the in-memory inventory transport, then prints the summary.
//! No network access required.
//!
//! Run with: cargo run -p stampede-core --example mock_run

use std::sync::Arc;
use std::time::Duration;

use stampede_core::{
    memory::MockInventoryTransport, summary, ExecutionPlan, ExecutorKind, IdentityStrategy,
    IterationContext, PacingSpec, RequestSpec, RunConfig, Runner, ScenarioSpec, Stage,
    ThresholdRule,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stampede_core=info".into()),
        )
        .init();

    // A target with 500 units of stock and duplicate suppression
    let transport = Arc::new(MockInventoryTransport::new(500).with_delay(Duration::from_millis(5)));
    let inventory = Arc::clone(&transport);

    let config = RunConfig::new("http://localhost:8081")
        .with_max_vus(100)
        .with_threshold(ThresholdRule::parse("errors", "rate<0.05")?)
        .with_threshold(ThresholdRule::parse("latency", "p(95)<1000")?);

    let mut runner = Runner::new(transport, config);
    runner.register("issue_coupon", |ctx: &IterationContext| {
        RequestSpec::post_json(
            format!("{}/api/coupons/test-coupon-1/issue", ctx.base_url),
            format!(r#"{{"userId":"test-user-{}"}}"#, ctx.user_id),
        )
    });

    // Scenario 1: unique identities, every issue must succeed
    let sequential = ScenarioSpec::new(
        "sequential_test",
        "issue_coupon",
        ExecutorKind::PerVuIterations {
            vus: 10,
            iterations: 20,
            max_duration: Duration::from_secs(60),
        },
    )
    .with_identity(IdentityStrategy::Sequential {
        iterations_per_vu: 20,
    });

    // Scenario 2: small identity pool competing for the remaining stock,
    // starting after the sequential pass finishes
    let load = ScenarioSpec::new(
        "load_test",
        "issue_coupon",
        ExecutorKind::RampingVus {
            start_vus: 0,
            stages: vec![
                Stage::new(Duration::from_secs(2), 30),
                Stage::new(Duration::from_secs(2), 30),
                Stage::new(Duration::from_secs(1), 0),
            ],
        },
    )
    .with_start_offset(Duration::from_secs(3))
    .with_identity(IdentityStrategy::RandomPool { pool_size: 400 })
    .with_pacing(PacingSpec::Uniform {
        min: Duration::from_millis(10),
        max: Duration::from_millis(50),
    });

    let plan = ExecutionPlan::new(vec![sequential, load])?;
    let result = runner.run_once(plan).await?;

    println!("{}", summary::render(&result));
    println!(
        "target state: {} issued, {} stock remaining",
        inventory.issued_count(),
        inventory.remaining_stock()
    );
    println!("structured export:\n{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
