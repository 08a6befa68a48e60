//! The events workers report to the [`ResultSink`](crate::sink::ResultSink).

use std::fmt;
use std::time::Duration;

use crate::remote::FailureKind;

/// Identity of a worker, unique within a run.
pub type WorkerId = usize;

/// What happened to a single write attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// The write was acknowledged before its timeout.
    Committed,
    /// The write failed for the given reason.
    Failed(FailureKind),
}

/// One reported outcome of a single write attempt.
///
/// Both timestamps are offsets from the run clock shared by all workers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestRecord {
    /// The worker that issued the write.
    pub worker: WorkerId,
    /// The sequence number the write was attempted with.
    pub seq: u64,
    /// When the write was submitted.
    pub submitted: Duration,
    /// When the write completed or failed.
    pub completed: Duration,
    /// Whether the write was committed.
    pub outcome: Outcome,
}

impl RequestRecord {
    /// The time between submission and completion.
    pub fn latency(&self) -> Duration {
        self.completed.saturating_sub(self.submitted)
    }

    /// The latency in whole microseconds, consistent with the printed offsets.
    ///
    /// Both offsets are truncated to microseconds before subtracting, so a printed line always
    /// satisfies `latency = completed - submitted`.
    pub fn latency_micros(&self) -> u128 {
        self.completed
            .as_micros()
            .saturating_sub(self.submitted.as_micros())
    }

    /// Returns `true` if the write was committed.
    pub fn is_committed(&self) -> bool {
        self.outcome == Outcome::Committed
    }
}

/// Everything a worker can report.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    /// A completed write attempt.
    Request(RequestRecord),
    /// The worker could not establish its session and stopped.
    ConnectFailed {
        /// The worker that failed to connect.
        worker: WorkerId,
    },
}

/// Formats the body of an output line, without the sink's prefix.
impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Request(record) => match record.outcome {
                Outcome::Committed => write!(
                    f,
                    "{} {} {} {} {}",
                    record.worker,
                    record.seq,
                    record.submitted.as_micros(),
                    record.completed.as_micros(),
                    record.latency_micros(),
                ),
                Outcome::Failed(_) => write!(
                    f,
                    "Error: worker {} failed to commit request {}",
                    record.worker, record.seq
                ),
            },
            Event::ConnectFailed { worker } => {
                write!(f, "Error: worker {worker} failed to connect to cluster")
            }
        }
    }
}
