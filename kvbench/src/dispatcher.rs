//! Spawns the workers of a run and joins them.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;

use crate::clock::RunClock;
use crate::config::Config;
use crate::remote::Connector;
use crate::sink::ResultSink;
use crate::summary::RunMetrics;
use crate::worker::{Worker, WorkerExit, WorkerParams, WorkerReport};

/// Owns the lifecycle of a single run.
#[derive(Debug)]
pub struct Dispatcher<W> {
    config: Config,
    connector: Arc<dyn Connector>,
    sink: ResultSink<W>,
}

impl<W> Dispatcher<W>
where
    W: Write + Send + 'static,
{
    /// Creates a dispatcher for a validated configuration.
    ///
    /// Records are written to `writer`, every worker connects through `connector`.
    pub fn new(config: Config, connector: impl Connector, writer: W) -> Self {
        Self {
            config,
            connector: Arc::new(connector),
            sink: ResultSink::new(writer),
        }
    }

    /// Starts the run clock and spawns all workers.
    ///
    /// Returns as soon as every worker has been spawned, without waiting for any of them to
    /// connect. Must be called within a tokio runtime.
    pub fn start(self) -> RunHandle<W> {
        let Self {
            config,
            connector,
            sink,
        } = self;

        let params = Arc::new(WorkerParams {
            endpoints: config.endpoints(),
            connect_timeout: config.connect_timeout,
            request_timeout: config.request_timeout,
            value: config.value.clone(),
        });
        let sink = Arc::new(sink);

        tracing::info!(
            workers = config.workers,
            duration = ?config.duration,
            connector = connector.name(),
            endpoints = ?params.endpoints,
            "starting run"
        );

        let clock = RunClock::start(config.duration);
        let tasks = (0..config.workers)
            .map(|id| {
                let worker = Worker::new(id, Arc::clone(&params), clock, Arc::clone(&sink));
                let connector = Arc::clone(&connector);
                tokio::spawn(async move { worker.run(connector.as_ref()).await })
            })
            .collect();

        RunHandle {
            tasks,
            sink,
            clock,
            workers: config.workers,
            duration: config.duration,
        }
    }
}

/// A started run.
#[derive(Debug)]
pub struct RunHandle<W> {
    tasks: Vec<JoinHandle<WorkerReport>>,
    sink: Arc<ResultSink<W>>,
    clock: RunClock,
    workers: usize,
    duration: Duration,
}

impl<W> RunHandle<W>
where
    W: Write + Send + 'static,
{
    /// Waits until every worker has stopped, then writes the completion line.
    ///
    /// Workers are never cancelled, each one stops on its own once the run duration elapsed. An
    /// error is returned if a worker panicked or the output could not be written, but only after
    /// all workers have been joined.
    pub async fn wait(self) -> Result<RunReport<W>> {
        let finished_tasks = futures::future::join_all(self.tasks).await;

        let mut reports = Vec::with_capacity(finished_tasks.len());
        let mut panicked = None;
        for task in finished_tasks {
            match task {
                Ok(report) => reports.push(report),
                Err(err) => {
                    tracing::error!(error = &err as &dyn std::error::Error, "worker panicked");
                    panicked.get_or_insert(err);
                }
            }
        }

        let elapsed = self.clock.elapsed();
        let connected = reports
            .iter()
            .filter(|report| report.exit != WorkerExit::ConnectFailed)
            .count();
        tracing::info!(?elapsed, connected, workers = self.workers, "run completed");

        let completed = self.sink.complete();
        if let Some(err) = panicked {
            return Err(err).context("worker task failed");
        }
        completed.context("failed to write records")?;

        let sink = Arc::try_unwrap(self.sink)
            .map_err(|_| anyhow::anyhow!("result sink is still in use"))?;
        let (writer, metrics) = sink.into_parts();

        Ok(RunReport {
            workers: reports,
            metrics,
            writer,
            elapsed,
            duration: self.duration,
        })
    }
}

/// Outcome of a finished run.
#[derive(Debug)]
pub struct RunReport<W> {
    /// The final state of every worker, in id order.
    pub workers: Vec<WorkerReport>,
    /// Metrics aggregated over all records.
    pub metrics: RunMetrics,
    /// The writer the records went to.
    pub writer: W,
    /// Time from the start of the run until the last worker stopped.
    pub elapsed: Duration,
    /// The configured run duration.
    pub duration: Duration,
}

impl<W> RunReport<W> {
    /// Number of workers that established a session.
    pub fn connected_workers(&self) -> usize {
        self.workers
            .iter()
            .filter(|report| report.exit != WorkerExit::ConnectFailed)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::InMemoryConnector;
    use crate::sink::COMPLETED_LINE;

    fn config(workers: usize, duration: Duration) -> Config {
        Config {
            nodes: vec!["127.0.0.1".into()],
            workers,
            duration,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_all_workers() {
        let connector = InMemoryConnector::new().with_latency(Duration::from_millis(10));
        let dispatcher = Dispatcher::new(
            config(3, Duration::from_secs(2)),
            connector.clone(),
            Vec::new(),
        );

        let report = dispatcher.start().wait().await.unwrap();

        assert_eq!(report.connected_workers(), 3);
        for (id, worker) in report.workers.iter().enumerate() {
            assert_eq!(worker.id, id);
            assert_eq!(
                worker.exit,
                WorkerExit::Finished {
                    committed: 200,
                    failed: 0
                }
            );
        }
        assert_eq!(report.metrics.committed, 600);
        assert_eq!(connector.len(), 600);
        assert_eq!(report.elapsed, Duration::from_secs(2));

        let output = String::from_utf8(report.writer).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 601);
        assert_eq!(lines.last(), Some(&COMPLETED_LINE));
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_cluster_finishes_early() {
        let dispatcher = Dispatcher::new(
            config(4, Duration::from_secs(60)),
            InMemoryConnector::new().hanging(),
            Vec::new(),
        );

        let report = dispatcher.start().wait().await.unwrap();

        assert_eq!(report.connected_workers(), 0);
        assert_eq!(report.metrics.connect_failures, 4);
        assert_eq!(report.elapsed, Duration::from_secs(5));

        let output = String::from_utf8(report.writer).unwrap();
        let mut lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.pop(), Some(COMPLETED_LINE));
        assert_eq!(lines.len(), 4);
        assert!(
            lines
                .iter()
                .all(|line| line.contains("failed to connect to cluster"))
        );
    }
}
