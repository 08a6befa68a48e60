//! Serializes the events of all workers into a single line-oriented stream.

use std::fmt;
use std::io::{self, Write};
use std::sync::Mutex;

use chrono::Local;

use crate::record::Event;
use crate::summary::RunMetrics;

/// Prefix of every per-event line.
const LINE_PREFIX: &str = "REQUEST:";

/// Wall-clock format following the prefix.
const TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// The terminal line, written once after all workers stopped.
pub const COMPLETED_LINE: &str = "Main: Completed";

/// The shared output of a run.
///
/// Workers hand their events to [`emit`](Self::emit) concurrently. Every line is formatted before
/// the lock is taken and written with a single call while holding it, so lines are never torn or
/// interleaved. The run metrics are updated under the same lock.
pub struct ResultSink<W> {
    state: Mutex<SinkState<W>>,
}

struct SinkState<W> {
    writer: W,
    metrics: RunMetrics,
    /// The first write error. Once set, further output is dropped.
    error: Option<io::Error>,
}

impl<W: Write> ResultSink<W> {
    /// Creates a sink writing to `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            state: Mutex::new(SinkState {
                writer,
                metrics: RunMetrics::default(),
                error: None,
            }),
        }
    }

    /// Writes one line for `event`.
    pub fn emit(&self, event: &Event) {
        let line = format!(
            "{LINE_PREFIX} {} {event}\n",
            Local::now().format(TIME_FORMAT)
        );

        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        state.metrics.observe(event);
        state.write(line.as_bytes());
    }

    /// Writes the terminal line and flushes the writer.
    ///
    /// Returns the first error encountered while writing any line of this sink.
    pub fn complete(&self) -> io::Result<()> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        state.write(format!("{COMPLETED_LINE}\n").as_bytes());
        if state.error.is_none() {
            if let Err(err) = state.writer.flush() {
                state.error = Some(err);
            }
        }

        match state.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Consumes the sink, returning the writer and the collected metrics.
    pub fn into_parts(self) -> (W, RunMetrics) {
        let state = self
            .state
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        (state.writer, state.metrics)
    }
}

impl<W: Write> SinkState<W> {
    fn write(&mut self, bytes: &[u8]) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = self.writer.write_all(bytes) {
            tracing::error!(
                error = &err as &dyn std::error::Error,
                "failed to write to output, dropping further records"
            );
            self.error = Some(err);
        }
    }
}

impl<W> fmt::Debug for ResultSink<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSink").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::record::{Outcome, RequestRecord};

    fn committed(worker: usize, seq: u64) -> Event {
        Event::Request(RequestRecord {
            worker,
            seq,
            submitted: Duration::from_micros(seq * 10),
            completed: Duration::from_micros(seq * 10 + 5),
            outcome: Outcome::Committed,
        })
    }

    #[test]
    fn prefixes_lines() {
        let sink = ResultSink::new(Vec::new());
        sink.emit(&committed(1, 2));
        sink.emit(&Event::ConnectFailed { worker: 4 });
        sink.complete().unwrap();

        let (output, metrics) = sink.into_parts();
        let output = String::from_utf8(output).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 3);

        let fields: Vec<_> = lines[0].split(' ').collect();
        assert_eq!(fields[0], "REQUEST:");
        assert_eq!(fields[1].len(), "2026/01/01".len());
        assert_eq!(fields[2].len(), "12:00:00".len());
        assert_eq!(&fields[3..], ["1", "2", "20", "25", "5"]);

        assert!(lines[1].ends_with(" Error: worker 4 failed to connect to cluster"));
        assert_eq!(lines[2], COMPLETED_LINE);

        assert_eq!(metrics.committed, 1);
        assert_eq!(metrics.connect_failures, 1);
    }

    #[test]
    fn concurrent_emission_is_not_torn() {
        const WORKERS: usize = 8;
        const RECORDS: u64 = 500;

        let sink = Arc::new(ResultSink::new(Vec::new()));
        let threads: Vec<_> = (0..WORKERS)
            .map(|worker| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    for seq in 0..RECORDS {
                        sink.emit(&committed(worker, seq));
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        sink.complete().unwrap();

        let sink = Arc::try_unwrap(sink).unwrap();
        let (output, metrics) = sink.into_parts();
        let output = String::from_utf8(output).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), WORKERS * RECORDS as usize + 1);
        assert_eq!(metrics.committed, WORKERS as u64 * RECORDS);

        let mut next_seq = [0u64; WORKERS];
        for line in &lines[..lines.len() - 1] {
            let fields: Vec<_> = line.split(' ').collect();
            assert_eq!(fields.len(), 8, "torn line: {line:?}");
            let worker: usize = fields[3].parse().unwrap();
            let seq: u64 = fields[4].parse().unwrap();
            assert_eq!(seq, next_seq[worker]);
            next_seq[worker] += 1;
        }
        assert_eq!(lines.last(), Some(&COMPLETED_LINE));
    }

    #[derive(Debug)]
    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn reports_write_errors_on_completion() {
        let sink = ResultSink::new(BrokenPipe);
        sink.emit(&committed(0, 0));
        sink.emit(&committed(0, 1));

        let err = sink.complete().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);

        // Metrics are still collected after the output broke.
        let (_, metrics) = sink.into_parts();
        assert_eq!(metrics.committed, 2);
    }
}
