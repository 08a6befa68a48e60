//! In-memory connector for tests.
//!
//! This provides a [`Connector`] backed by a `HashMap`, removing the need for a running cluster in
//! tests. The connector is [`Clone`] so tests can hold a handle for direct inspection while the
//! dispatcher owns a boxed copy.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{BoxedSession, Connector, RemoteError, RemoteResult, Session};

type Store = HashMap<String, String>;

/// How [`InMemoryConnector::connect`] behaves.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum ConnectMode {
    /// Hand out sessions.
    #[default]
    Accept,
    /// Fail immediately, like a refused connection.
    Refuse,
    /// Never answer, like a blackholed address.
    Hang,
}

/// A connector storing all writes in a shared in-process map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConnector {
    store: Arc<Mutex<Store>>,
    mode: ConnectMode,
    latency: Duration,
    fail_every: Option<u64>,
}

impl InMemoryConnector {
    /// Creates a connector that accepts all writes without delay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every write by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fails every `n`-th write attempt of each session with a cluster error.
    pub fn fail_every(mut self, n: u64) -> Self {
        self.fail_every = Some(n.max(1));
        self
    }

    /// Refuses every connection attempt.
    pub fn refusing(mut self) -> Self {
        self.mode = ConnectMode::Refuse;
        self
    }

    /// Never completes a connection attempt.
    pub fn hanging(mut self) -> Self {
        self.mode = ConnectMode::Hang;
        self
    }

    /// Returns the value stored under `key`, if present.
    pub fn get(&self, key: &str) -> Option<String> {
        self.store.lock().unwrap().get(key).cloned()
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> usize {
        self.store.lock().unwrap().len()
    }

    /// Returns `true` if nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.store.lock().unwrap().is_empty()
    }
}

#[async_trait::async_trait]
impl Connector for InMemoryConnector {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn connect(
        &self,
        endpoints: &[String],
        _connect_timeout: Duration,
    ) -> RemoteResult<BoxedSession> {
        match self.mode {
            ConnectMode::Accept if !endpoints.is_empty() => Ok(Box::new(InMemorySession {
                store: Arc::clone(&self.store),
                latency: self.latency,
                fail_every: self.fail_every,
                attempts: 0,
            })),
            ConnectMode::Accept | ConnectMode::Refuse => {
                Err(RemoteError::Unavailable("connection refused".into()))
            }
            ConnectMode::Hang => std::future::pending().await,
        }
    }
}

#[derive(Debug)]
struct InMemorySession {
    store: Arc<Mutex<Store>>,
    latency: Duration,
    fail_every: Option<u64>,
    attempts: u64,
}

#[async_trait::async_trait]
impl Session for InMemorySession {
    async fn put(&mut self, key: &str, value: &str, _timeout: Duration) -> RemoteResult<()> {
        if key.is_empty() {
            return Err(RemoteError::InvalidRequest("key is not provided".into()));
        }

        self.attempts += 1;
        if self.latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.latency).await;
        }

        if self.fail_every.is_some_and(|n| self.attempts % n == 0) {
            return Err(RemoteError::Status {
                code: 14,
                message: "injected failure".into(),
            });
        }

        self.store
            .lock()
            .unwrap()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}
