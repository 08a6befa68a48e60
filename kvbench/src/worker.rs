//! A worker owns one session and issues a serial stream of timed writes until the run is over.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::clock::RunClock;
use crate::record::{Event, Outcome, RequestRecord, WorkerId};
use crate::remote::{BoxedSession, Connector, RemoteError, Session};
use crate::sink::ResultSink;

/// Parameters shared by all workers of a run.
#[derive(Clone, Debug)]
pub struct WorkerParams {
    /// Connectable addresses of all cluster members.
    pub endpoints: Vec<String>,
    /// Upper bound for establishing the session.
    pub connect_timeout: Duration,
    /// Upper bound for a single write.
    pub request_timeout: Duration,
    /// Payload written under every key.
    pub value: String,
}

/// How a worker ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WorkerExit {
    /// The session could not be established.
    ConnectFailed,
    /// The run duration elapsed.
    Finished {
        /// Number of committed writes, which is also the next sequence number.
        committed: u64,
        /// Number of failed write attempts.
        failed: u64,
    },
}

/// Final state of a worker, returned when its task exits.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WorkerReport {
    /// The worker's identity.
    pub id: WorkerId,
    /// How the worker ended.
    pub exit: WorkerExit,
}

/// Builds the key for a write, deterministic from worker and sequence number.
pub fn request_key(worker: WorkerId, seq: u64) -> String {
    format!("#({worker},{seq})")
}

/// A single worker of a run.
#[derive(Debug)]
pub struct Worker<W> {
    id: WorkerId,
    params: Arc<WorkerParams>,
    clock: RunClock,
    sink: Arc<ResultSink<W>>,
}

impl<W: Write> Worker<W> {
    /// Creates a worker that has not connected yet.
    pub fn new(
        id: WorkerId,
        params: Arc<WorkerParams>,
        clock: RunClock,
        sink: Arc<ResultSink<W>>,
    ) -> Self {
        Self {
            id,
            params,
            clock,
            sink,
        }
    }

    /// Runs the worker to completion.
    ///
    /// Connects, then writes until the run clock's deadline has passed. A request in flight when
    /// the deadline passes is allowed to finish or time out. A worker that fails to connect stops
    /// right away and never writes. The session is closed before this returns.
    pub async fn run(self, connector: &dyn Connector) -> WorkerReport {
        let Some(mut session) = self.connect(connector).await else {
            return WorkerReport {
                id: self.id,
                exit: WorkerExit::ConnectFailed,
            };
        };

        tracing::trace!(worker = self.id, "worker running");
        let (committed, failed) = self.issue_until_deadline(session.as_mut()).await;

        session.close().await;
        tracing::trace!(worker = self.id, committed, failed, "worker stopped");

        WorkerReport {
            id: self.id,
            exit: WorkerExit::Finished { committed, failed },
        }
    }

    async fn connect(&self, connector: &dyn Connector) -> Option<BoxedSession> {
        let timeout = self.params.connect_timeout;
        let connect = connector.connect(&self.params.endpoints, timeout);
        let result = tokio::time::timeout(timeout, connect)
            .await
            .unwrap_or_else(|_| Err(RemoteError::DeadlineExceeded));

        match result {
            Ok(session) => Some(session),
            Err(err) => {
                tracing::warn!(
                    worker = self.id,
                    error = &err as &dyn std::error::Error,
                    "failed to connect to cluster"
                );
                self.sink.emit(&Event::ConnectFailed { worker: self.id });
                None
            }
        }
    }

    /// Returns the number of committed and failed writes.
    async fn issue_until_deadline(&self, session: &mut dyn Session) -> (u64, u64) {
        let timeout = self.params.request_timeout;
        let mut seq = 0;
        let mut failed = 0;

        while !self.clock.is_over() {
            let key = request_key(self.id, seq);

            let submitted = Instant::now();
            let put = session.put(&key, &self.params.value, timeout);
            let result = tokio::time::timeout(timeout, put)
                .await
                .unwrap_or_else(|_| Err(RemoteError::DeadlineExceeded));
            let completed = Instant::now();

            let outcome = match result {
                Ok(()) => Outcome::Committed,
                Err(err) => {
                    let kind = err.kind();
                    tracing::debug!(
                        worker = self.id,
                        seq,
                        kind = kind.as_str(),
                        error = &err as &dyn std::error::Error,
                        "request failed"
                    );
                    Outcome::Failed(kind)
                }
            };

            self.sink.emit(&Event::Request(RequestRecord {
                worker: self.id,
                seq,
                submitted: self.clock.offset(submitted),
                completed: self.clock.offset(completed),
                outcome,
            }));

            // Sequence numbers index committed writes. A failed attempt is retried under the same
            // number.
            match outcome {
                Outcome::Committed => seq += 1,
                Outcome::Failed(_) => failed += 1,
            }
        }

        (seq, failed)
    }
}
