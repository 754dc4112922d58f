// Summary reporting
//
// Renders the final RunResult as a deterministic, human-readable report:
// totals and throughput, the outcome-category breakdown, per-category
// latency distributions, and the threshold verdicts. Rendering is read-only
// over the snapshot; the structured export is the RunResult's own
// serialization.

use std::fmt::Write;

use crate::metrics::MetricValue;
use crate::outcome::OutcomeCategory;
use crate::scheduler::RunResult;

/// Render the end-of-run report
pub fn render(result: &RunResult) -> String {
    let mut out = String::new();
    let total = result.metrics.counter_value("requests");
    let seconds = result.wall_clock_ms as f64 / 1000.0;
    let throughput = if seconds > 0.0 {
        total as f64 / seconds
    } else {
        0.0
    };

    let _ = writeln!(out, "=== load test summary ===");
    let _ = writeln!(out);
    let _ = writeln!(out, "run:        {}", result.run_id);
    let _ = writeln!(out, "started:    {}", result.started_at.to_rfc3339());
    let _ = writeln!(out, "duration:   {seconds:.1}s");
    let _ = writeln!(out, "requests:   {total}");
    let _ = writeln!(out, "throughput: {throughput:.2} req/s");
    if result.aborted {
        let _ = writeln!(out, "note:       run was stopped before completion");
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "--- outcomes ---");
    for category in OutcomeCategory::ALL {
        let count = result.metrics.counter_value(category.metric_name());
        let percent = if total > 0 {
            count as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        let _ = writeln!(out, "{:<26} {count:>10}  ({percent:6.2}%)", category);
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "--- latency (ms) ---");
    write_latency_line(&mut out, result, "overall", "latency");
    for category in OutcomeCategory::ALL {
        write_latency_line(
            &mut out,
            result,
            category.metric_name(),
            category.latency_metric_name(),
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "--- thresholds ---");
    if result.thresholds.is_empty() {
        let _ = writeln!(out, "(none configured)");
    }
    for verdict in &result.thresholds {
        let status = if verdict.passed { "PASS" } else { "FAIL" };
        let _ = writeln!(
            out,
            "{status} {}: {} (observed {:.4})",
            verdict.metric, verdict.expression, verdict.observed
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "result: {}",
        if result.passed { "PASS" } else { "FAIL" }
    );

    out
}

/// One latency row; categories that recorded nothing are skipped
fn write_latency_line(out: &mut String, result: &RunResult, label: &str, metric: &str) {
    let Some(MetricValue::Trend {
        count,
        mean,
        med,
        p95,
        p99,
        ..
    }) = result.metrics.get(metric)
    else {
        return;
    };
    if *count == 0 {
        return;
    }
    let _ = writeln!(
        out,
        "{label:<26} mean {mean:8.2} | p50 {med:8.2} | p95 {p95:8.2} | p99 {p99:8.2}"
    );
}
