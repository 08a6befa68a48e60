//! Aggregated metrics of a run and their human-readable rendering.

use std::fmt;
use std::time::Duration;

use sketches_ddsketch::DDSketch;
use yansi::Paint;

use crate::record::{Event, Outcome};
use crate::remote::FailureKind;

/// Counters and latency distribution collected over all events of a run.
#[derive(Default)]
pub struct RunMetrics {
    /// Number of committed writes.
    pub committed: u64,
    /// Number of failed writes, indexed like [`FailureKind::ALL`].
    failures: [u64; FailureKind::ALL.len()],
    /// Number of workers that never connected.
    pub connect_failures: u64,

    /// Latency of committed writes, in seconds.
    latency: DDSketch,

    /// Earliest submission of a committed write.
    first_submitted: Option<Duration>,
    /// Latest completion of a committed write.
    last_completed: Option<Duration>,
}

impl RunMetrics {
    /// Accounts for a single event.
    pub fn observe(&mut self, event: &Event) {
        let record = match event {
            Event::Request(record) => record,
            Event::ConnectFailed { .. } => {
                self.connect_failures += 1;
                return;
            }
        };

        match record.outcome {
            Outcome::Committed => {
                self.committed += 1;
                self.latency.add(record.latency().as_secs_f64());
                self.first_submitted = Some(match self.first_submitted {
                    Some(first) => first.min(record.submitted),
                    None => record.submitted,
                });
                self.last_completed = Some(match self.last_completed {
                    Some(last) => last.max(record.completed),
                    None => record.completed,
                });
            }
            Outcome::Failed(kind) => self.failures[kind_index(kind)] += 1,
        }
    }

    /// Number of failed writes of the given kind.
    pub fn failures(&self, kind: FailureKind) -> u64 {
        self.failures[kind_index(kind)]
    }

    /// Number of failed writes of all kinds.
    pub fn total_failures(&self) -> u64 {
        self.failures.iter().sum()
    }

    /// Latency quantile of committed writes, e.g. `0.99` for p99.
    pub fn latency_quantile(&self, quantile: f64) -> Option<Duration> {
        self.latency
            .quantile(quantile)
            .ok()
            .flatten()
            .map(Duration::from_secs_f64)
    }

    /// Average latency of committed writes.
    pub fn latency_avg(&self) -> Option<Duration> {
        let count = self.latency.count();
        if count == 0 {
            return None;
        }
        let sum = self.latency.sum()?;
        Some(Duration::from_secs_f64(sum / count as f64))
    }

    /// Time between the first submission and the last completion of a committed write.
    pub fn active_span(&self) -> Option<Duration> {
        match (self.first_submitted, self.last_completed) {
            (Some(first), Some(last)) => Some(last.saturating_sub(first)),
            _ => None,
        }
    }
}

impl fmt::Debug for RunMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunMetrics")
            .field("committed", &self.committed)
            .field("failures", &self.failures)
            .field("connect_failures", &self.connect_failures)
            .field("first_submitted", &self.first_submitted)
            .field("last_completed", &self.last_completed)
            .finish_non_exhaustive()
    }
}

fn kind_index(kind: FailureKind) -> usize {
    match kind {
        FailureKind::Cancelled => 0,
        FailureKind::DeadlineExceeded => 1,
        FailureKind::InvalidRequest => 2,
        FailureKind::Cluster => 3,
    }
}

/// Prints the summary of a run to stderr.
///
/// Stdout carries the record stream, so nothing here may go there.
pub fn print_summary(metrics: &RunMetrics, workers: usize, duration: Duration) {
    eprintln!();
    eprintln!(
        "{} ({} workers, duration: {:?})",
        "## SUMMARY".bold(),
        workers.bold(),
        duration
    );

    eprint!(
        "{} ({} ops",
        "WRITE:".bold().green(),
        metrics.committed.bold()
    );
    let failures = metrics.total_failures();
    if failures > 0 {
        eprint!(", {}", format!("{failures} FAILURES").bold().red());
    }
    eprintln!(")");

    for kind in FailureKind::ALL {
        let count = metrics.failures(kind);
        if count > 0 {
            eprintln!("  {}: {count}", kind.as_str());
        }
    }

    let ops_ps = metrics.committed as f64 / duration.as_secs_f64();
    eprint!("  {:.2} operations/s", ops_ps.bold());
    if let Some(span) = metrics.active_span().filter(|span| !span.is_zero()) {
        let active_ops_ps = metrics.committed as f64 / span.as_secs_f64();
        eprint!(" ({active_ops_ps:.2}/s while active)");
    }
    eprintln!();

    if let (Some(avg), Some(p50), Some(p90), Some(p99)) = (
        metrics.latency_avg(),
        metrics.latency_quantile(0.5),
        metrics.latency_quantile(0.9),
        metrics.latency_quantile(0.99),
    ) {
        eprintln!(
            "  avg: {:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}",
            avg.bold()
        );
    }

    if metrics.connect_failures > 0 {
        eprintln!(
            "{}",
            format!("{} WORKERS FAILED TO CONNECT", metrics.connect_failures)
                .bold()
                .red()
        );
    }
}
