use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::metrics::{Aggregator, MetricsSnapshot};

const RULE_WIDTH: usize = 50;

/// Values derived from a snapshot rather than stored in it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_requests: u64,
    pub total_errors: u64,
    pub transport_failures: u64,
    /// `total_errors / total_requests`, zero before the first request
    pub error_rate: f64,
    /// Mean of all response time samples in milliseconds
    pub avg_response_time: Option<f64>,
}

impl Summary {
    pub fn from_snapshot(snapshot: &MetricsSnapshot) -> Self {
        let error_rate = if snapshot.total_requests > 0 {
            snapshot.total_errors as f64 / snapshot.total_requests as f64
        } else {
            0.0
        };

        Self {
            total_requests: snapshot.total_requests,
            total_errors: snapshot.total_errors,
            transport_failures: snapshot.transport_failures,
            error_rate,
            avg_response_time: mean(&snapshot.response_time_samples),
        }
    }
}

/// Arithmetic mean, `None` for an empty slice
pub fn mean(samples: &[u64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let sum: u128 = samples.iter().map(|&s| u128::from(s)).sum();
    Some(sum as f64 / samples.len() as f64)
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Writes a labelled text report. Nothing is written while no request has
/// been recorded; the return value says whether a report was produced.
pub fn write_report<W: Write>(
    writer: &mut W,
    label: &str,
    snapshot: &MetricsSnapshot,
) -> io::Result<bool> {
    if snapshot.total_requests == 0 {
        return Ok(false);
    }

    let summary = Summary::from_snapshot(snapshot);
    let rule = "=".repeat(RULE_WIDTH);

    writeln!(writer)?;
    writeln!(writer, "{rule}")?;
    writeln!(writer, "METRICS REPORT: {label}")?;
    writeln!(writer, "{rule}")?;
    writeln!(writer, "Total Requests:\t{}", summary.total_requests)?;
    writeln!(
        writer,
        "Total Errors:\t{} ({:.2}%)",
        summary.total_errors,
        summary.error_rate * 100.0
    )?;
    writeln!(writer, "Transport Failures:\t{}", summary.transport_failures)?;
    match summary.avg_response_time {
        Some(avg) => writeln!(writer, "Avg Response Time:\t{avg:.2}ms")?,
        None => writeln!(writer, "Avg Response Time:\tn/a")?,
    }

    writeln!(writer)?;
    writeln!(writer, "Endpoint Performance:")?;
    for (path, stats) in &snapshot.per_endpoint {
        writeln!(writer, "  {path}:")?;
        writeln!(writer, "    Count: {}", stats.count)?;
        writeln!(writer, "    Errors: {}", stats.error_count)?;
        match (
            stats.mean_duration_ms(),
            stats.min_duration_ms,
            stats.max_duration_ms,
        ) {
            (Some(avg), Some(min), Some(max)) => {
                writeln!(writer, "    Avg Time: {avg:.2}ms")?;
                writeln!(writer, "    Min/Max: {min}ms / {max}ms")?;
            }
            _ => writeln!(writer, "    Avg Time: n/a (no responses)")?,
        }
    }

    writeln!(writer)?;
    writeln!(writer, "Status Code Distribution:")?;
    for (code, count) in &snapshot.status_code_counts {
        writeln!(
            writer,
            "  {code}: {count} ({:.2}%)",
            percent(*count, snapshot.total_requests)
        )?;
    }

    let login = &snapshot.login_metrics;
    if login.total > 0 {
        writeln!(writer)?;
        writeln!(writer, "Login Test Metrics:")?;
        writeln!(writer, "  Total Login Tests: {}", login.total)?;
        writeln!(writer, "  Successful Logins: {}", login.successful)?;
        writeln!(writer, "  Failed Logins: {}", login.failed)?;
        writeln!(writer, "  Errors: {}", login.errored)?;

        writeln!(writer)?;
        writeln!(writer, "Login Test Scenarios:")?;
        for (scenario, count) in &login.scenario_counts {
            writeln!(writer, "  {scenario}: {count} tests")?;
        }
    }

    writeln!(writer, "{rule}")?;
    Ok(true)
}

/// Prints a report for the aggregator's current state to stdout.
pub fn print_report(label: &str, aggregator: &Aggregator) {
    let snapshot = aggregator.snapshot();
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    match write_report(&mut handle, label, &snapshot) {
        Ok(true) => {}
        Ok(false) => debug!(label, "No requests recorded yet, skipping report"),
        Err(e) => warn!(label, error = %e, "Failed to write report"),
    }
}

/// Emits a periodic report every `every` until `deadline`.
pub async fn run_periodic(aggregator: Arc<Aggregator>, every: Duration, deadline: Instant) {
    let mut interval = tokio::time::interval_at(Instant::now() + every, every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let expired = tokio::time::sleep_until(deadline);
    tokio::pin!(expired);

    loop {
        tokio::select! {
            _ = &mut expired => break,
            _ = interval.tick() => print_report("Periodic report", &aggregator),
        }
    }
}
