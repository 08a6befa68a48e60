use std::collections::HashMap;
use std::time::Duration;

use kvbench::remote::{Connector, FailureKind, RemoteError, Session};
use kvbench::sink::COMPLETED_LINE;
use kvbench::worker::WorkerExit;
use kvbench::{Config, Dispatcher, EtcdConnector};
use kvbench_test::server::TestServer;

const TIMEOUT: Duration = Duration::from_secs(2);

/// An address nothing listens on.
const CLOSED_ENDPOINT: &str = "http://127.0.0.1:1";

#[tokio::test]
async fn put_through_gateway() {
    kvbench_test::tracing::init();
    let server = TestServer::new().await;

    let mut session = EtcdConnector::new()
        .connect(&[server.endpoint()], TIMEOUT)
        .await
        .unwrap();
    session
        .put("#(0,0)", "always the best", TIMEOUT)
        .await
        .unwrap();
    session.close().await;

    assert_eq!(server.get("#(0,0)").as_deref(), Some("always the best"));
    assert_eq!(server.revision(), 1);
}

#[tokio::test]
async fn connect_skips_unreachable_members() {
    kvbench_test::tracing::init();
    let server = TestServer::new().await;

    let endpoints = [CLOSED_ENDPOINT.to_owned(), server.endpoint()];
    let mut session = EtcdConnector::new()
        .connect(&endpoints, TIMEOUT)
        .await
        .unwrap();
    session.put("key", "value", TIMEOUT).await.unwrap();

    assert_eq!(server.get("key").as_deref(), Some("value"));
}

#[tokio::test]
async fn connect_fails_without_members() {
    kvbench_test::tracing::init();

    let err = EtcdConnector::new()
        .connect(&[CLOSED_ENDPOINT.to_owned()], TIMEOUT)
        .await
        .unwrap_err();

    assert!(matches!(err, RemoteError::Unavailable(_)), "{err:?}");
}

#[tokio::test]
async fn classifies_gateway_errors() {
    kvbench_test::tracing::init();
    let server = TestServer::new().await;

    let mut session = EtcdConnector::new()
        .connect(&[server.endpoint()], TIMEOUT)
        .await
        .unwrap();

    let err = session.put("", "value", TIMEOUT).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::InvalidRequest);

    server.set_unavailable(true);
    let err = session.put("key", "value", TIMEOUT).await.unwrap_err();
    assert!(matches!(err, RemoteError::Status { code: 14, .. }), "{err:?}");
    assert_eq!(err.kind(), FailureKind::Cluster);

    assert!(server.is_empty());
}

#[tokio::test]
async fn slow_gateway_times_out() {
    kvbench_test::tracing::init();
    let server = TestServer::with_latency(Duration::from_secs(5)).await;

    let mut session = EtcdConnector::new()
        .connect(&[server.endpoint()], TIMEOUT)
        .await
        .unwrap();

    let err = session
        .put("key", "value", Duration::from_millis(100))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::DeadlineExceeded);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn run_against_gateway() {
    kvbench_test::tracing::init();
    let server = TestServer::with_latency(Duration::from_millis(1)).await;

    let config = Config {
        nodes: vec![server.node()],
        workers: 3,
        duration: Duration::from_secs(1),
        ..Default::default()
    };
    let dispatcher = Dispatcher::new(config, EtcdConnector::new(), Vec::new());
    let report = dispatcher.start().wait().await.unwrap();

    assert_eq!(report.connected_workers(), 3);
    assert!(report.elapsed < Duration::from_secs(1) + TIMEOUT);
    assert!(report.metrics.committed > 0);
    assert_eq!(server.revision(), report.metrics.committed);

    let output = String::from_utf8(report.writer).unwrap();
    let mut lines: Vec<_> = output.lines().collect();
    assert_eq!(lines.pop(), Some(COMPLETED_LINE));

    let mut next_seq: HashMap<usize, u64> = HashMap::new();
    for line in lines {
        let fields: Vec<_> = line.split(' ').collect();
        assert_eq!(fields[0], "REQUEST:");
        assert_eq!(fields.len(), 8, "unexpected line: {line:?}");

        let worker: usize = fields[3].parse().unwrap();
        let seq: u64 = fields[4].parse().unwrap();
        let submitted: u64 = fields[5].parse().unwrap();
        let completed: u64 = fields[6].parse().unwrap();
        let latency: u64 = fields[7].parse().unwrap();

        let expected = next_seq.entry(worker).or_default();
        assert_eq!(seq, *expected);
        *expected += 1;

        assert!(completed >= submitted);
        assert_eq!(latency, completed - submitted);
    }

    assert_eq!(next_seq.len(), 3);
    for worker in &report.workers {
        let WorkerExit::Finished { committed, failed } = worker.exit else {
            panic!("worker {} did not connect", worker.id);
        };
        assert_eq!(failed, 0);
        assert_eq!(next_seq[&worker.id], committed);
    }
}
