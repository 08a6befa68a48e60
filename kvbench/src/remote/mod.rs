//! The client capability a worker drives load through.
//!
//! A [`Connector`] establishes one [`Session`] per worker against the full endpoint set. The
//! session is owned exclusively by that worker and issues the individual writes. Any
//! implementation honoring this contract can be plugged into the dispatcher.

use std::fmt::Debug;
use std::time::Duration;

use thiserror::Error;

mod etcd;
mod in_memory;

pub use etcd::EtcdConnector;
pub use in_memory::InMemoryConnector;

/// A type-erased [`Session`] instance.
pub type BoxedSession = Box<dyn Session>;

/// Establishes sessions against a cluster.
#[async_trait::async_trait]
pub trait Connector: Debug + Send + Sync + 'static {
    /// The connector name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Opens a new session against the cluster formed by `endpoints`.
    ///
    /// Implementations should give up after `connect_timeout`. The dispatcher enforces the same
    /// bound on top of whatever the implementation does.
    async fn connect(
        &self,
        endpoints: &[String],
        connect_timeout: Duration,
    ) -> RemoteResult<BoxedSession>;
}

/// A single connection handle to the cluster.
#[async_trait::async_trait]
pub trait Session: Debug + Send + 'static {
    /// Writes `value` under `key`, giving up after `timeout`.
    async fn put(&mut self, key: &str, value: &str, timeout: Duration) -> RemoteResult<()>;

    /// Releases the resources held by this session.
    async fn close(&mut self) {}
}

/// Errors returned by a [`Connector`] or a [`Session`].
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The operation was cancelled by a concurrent action.
    #[error("operation cancelled")]
    Cancelled,

    /// No acknowledgment arrived before the timeout elapsed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The store rejected the request as malformed, e.g. an empty key.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// None of the endpoints could be reached.
    #[error("no endpoint available: {0}")]
    Unavailable(String),

    /// Errors sending the request or returned by the cluster itself.
    #[error("cluster error: {context}")]
    Cluster {
        /// What was being attempted when the error occurred.
        context: String,
        /// The underlying transport or decoding error.
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The cluster answered with an error status that maps to no other variant.
    #[error("cluster returned {code}: {message}")]
    Status {
        /// The gRPC status code, or the HTTP status if the body carried none.
        code: i32,
        /// The message the cluster sent along.
        message: String,
    },
}

impl RemoteError {
    /// Classifies this error into the reported failure kind.
    pub fn kind(&self) -> FailureKind {
        match self {
            RemoteError::Cancelled => FailureKind::Cancelled,
            RemoteError::DeadlineExceeded => FailureKind::DeadlineExceeded,
            RemoteError::InvalidRequest(_) => FailureKind::InvalidRequest,
            RemoteError::Unavailable(_)
            | RemoteError::Cluster { .. }
            | RemoteError::Status { .. } => FailureKind::Cluster,
        }
    }
}

/// Result type for remote operations.
pub type RemoteResult<T, E = RemoteError> = Result<T, E>;

/// The reason a write attempt failed.
///
/// All kinds are reported identically in the output stream. The kind only shows up in logs and
/// in the run summary.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FailureKind {
    /// See [`RemoteError::Cancelled`].
    Cancelled,
    /// See [`RemoteError::DeadlineExceeded`].
    DeadlineExceeded,
    /// See [`RemoteError::InvalidRequest`].
    InvalidRequest,
    /// Any other error from the cluster or the transport.
    Cluster,
}

impl FailureKind {
    /// All kinds, in reporting order.
    pub const ALL: [FailureKind; 4] = [
        FailureKind::Cancelled,
        FailureKind::DeadlineExceeded,
        FailureKind::InvalidRequest,
        FailureKind::Cluster,
    ];

    /// A short, stable name for logs and summaries.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Cancelled => "cancelled",
            FailureKind::DeadlineExceeded => "deadline exceeded",
            FailureKind::InvalidRequest => "invalid request",
            FailureKind::Cluster => "cluster",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors() {
        assert_eq!(RemoteError::Cancelled.kind(), FailureKind::Cancelled);
        assert_eq!(
            RemoteError::DeadlineExceeded.kind(),
            FailureKind::DeadlineExceeded
        );
        assert_eq!(
            RemoteError::InvalidRequest("key is not provided".into()).kind(),
            FailureKind::InvalidRequest
        );
        assert_eq!(
            RemoteError::Status {
                code: 14,
                message: "unavailable".into()
            }
            .kind(),
            FailureKind::Cluster
        );
        assert_eq!(
            RemoteError::Unavailable("all endpoints down".into()).kind(),
            FailureKind::Cluster
        );
    }
}
