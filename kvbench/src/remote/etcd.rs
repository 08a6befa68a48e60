//! A connector speaking to etcd through the v3 JSON gateway on its client port.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use super::{BoxedSession, Connector, RemoteError, RemoteResult, Session};

/// User agent string used for outgoing requests.
pub const USER_AGENT: &str = concat!("kvbench/", env!("CARGO_PKG_VERSION"));

/// gRPC status codes the gateway reports in error bodies.
const CODE_CANCELLED: i32 = 1;
const CODE_INVALID_ARGUMENT: i32 = 3;
const CODE_DEADLINE_EXCEEDED: i32 = 4;

/// Opens sessions against an etcd cluster.
///
/// Every session gets its own HTTP client and therefore its own connection pool, so workers never
/// share a connection.
#[derive(Debug, Default)]
pub struct EtcdConnector;

impl EtcdConnector {
    /// Creates a new connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Connector for EtcdConnector {
    fn name(&self) -> &'static str {
        "etcd"
    }

    async fn connect(
        &self,
        endpoints: &[String],
        connect_timeout: Duration,
    ) -> RemoteResult<BoxedSession> {
        if endpoints.is_empty() {
            return Err(RemoteError::Unavailable("no endpoints configured".into()));
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|cause| RemoteError::Cluster {
                context: "failed to build HTTP client".into(),
                cause: cause.into(),
            })?;

        // Probe all endpoints at once and pin the first member that answers.
        let client_ref = &client;
        let probes = endpoints.iter().enumerate().map(move |(index, endpoint)| {
            Box::pin(async move {
                probe(client_ref, endpoint, connect_timeout)
                    .await
                    .map(|()| index)
            })
        });

        let (current, _) = futures::future::select_ok(probes)
            .await
            .map_err(|err| RemoteError::Unavailable(err.to_string()))?;

        let endpoint = &endpoints[current];
        tracing::debug!(%endpoint, "connected to cluster member");

        Ok(Box::new(EtcdSession {
            client,
            endpoints: endpoints.to_vec(),
            current,
        }))
    }
}

/// A session pinned to one cluster member at a time.
#[derive(Debug)]
struct EtcdSession {
    client: reqwest::Client,
    endpoints: Vec<String>,
    current: usize,
}

impl EtcdSession {
    /// Moves on to the next member for subsequent requests.
    fn rotate(&mut self) {
        self.current = (self.current + 1) % self.endpoints.len();
        let endpoint = &self.endpoints[self.current];
        tracing::debug!(%endpoint, "switching cluster member");
    }
}

#[async_trait::async_trait]
impl Session for EtcdSession {
    async fn put(&mut self, key: &str, value: &str, timeout: Duration) -> RemoteResult<()> {
        // Mirrors the client-side validation of the official client.
        if key.is_empty() {
            return Err(RemoteError::InvalidRequest("key is not provided".into()));
        }

        let request = PutRequest {
            key: STANDARD.encode(key),
            value: STANDARD.encode(value),
        };
        let url = format!("{}/v3/kv/put", self.endpoints[self.current]);

        let response = match self
            .client
            .post(url)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                if err.is_connect() {
                    self.rotate();
                }
                return Err(map_reqwest(err, "failed to send put request"));
            }
        };

        check_response(response).await
    }
}

async fn probe(client: &reqwest::Client, endpoint: &str, timeout: Duration) -> RemoteResult<()> {
    let response = client
        .post(format!("{endpoint}/v3/maintenance/status"))
        .timeout(timeout)
        .json(&serde_json::json!({}))
        .send()
        .await
        .map_err(|err| map_reqwest(err, "failed to reach endpoint"))?;

    check_response(response).await
}

fn map_reqwest(err: reqwest::Error, context: &str) -> RemoteError {
    if err.is_timeout() {
        RemoteError::DeadlineExceeded
    } else {
        RemoteError::Cluster {
            context: context.to_owned(),
            cause: err.into(),
        }
    }
}

async fn check_response(response: reqwest::Response) -> RemoteResult<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response
        .text()
        .await
        .map_err(|err| map_reqwest(err, "failed to read error response"))?;

    Err(match serde_json::from_str::<GatewayError>(&body) {
        Ok(error) => error.into(),
        Err(_) => RemoteError::Status {
            code: i32::from(status.as_u16()),
            message: body,
        },
    })
}

#[derive(Debug, Serialize)]
struct PutRequest {
    key: String,
    value: String,
}

/// Error body returned by the gateway.
#[derive(Debug, Deserialize)]
struct GatewayError {
    code: i32,
    #[serde(default)]
    message: String,
}

impl From<GatewayError> for RemoteError {
    fn from(error: GatewayError) -> Self {
        match error.code {
            CODE_CANCELLED => RemoteError::Cancelled,
            CODE_DEADLINE_EXCEEDED => RemoteError::DeadlineExceeded,
            CODE_INVALID_ARGUMENT => RemoteError::InvalidRequest(error.message),
            code => RemoteError::Status {
                code,
                message: error.message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway_error(body: &str) -> RemoteError {
        serde_json::from_str::<GatewayError>(body).unwrap().into()
    }

    #[test]
    fn maps_gateway_codes() {
        assert!(matches!(
            gateway_error(r#"{"error":"context canceled","code":1,"message":"context canceled"}"#),
            RemoteError::Cancelled
        ));
        assert!(matches!(
            gateway_error(r#"{"code":4,"message":"context deadline exceeded"}"#),
            RemoteError::DeadlineExceeded
        ));
        assert!(matches!(
            gateway_error(r#"{"code":3,"message":"etcdserver: key is not provided"}"#),
            RemoteError::InvalidRequest(message) if message == "etcdserver: key is not provided"
        ));
        assert!(matches!(
            gateway_error(r#"{"code":14,"message":"etcdserver: no leader"}"#),
            RemoteError::Status { code: 14, .. }
        ));
    }

    #[test]
    fn encodes_put_request() {
        let request = PutRequest {
            key: STANDARD.encode("#(0,0)"),
            value: STANDARD.encode("always the best"),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["key"], "IygwLDAp");
        assert_eq!(json["value"], "YWx3YXlzIHRoZSBiZXN0");
    }

    #[tokio::test]
    async fn connect_without_endpoints_fails() {
        let err = EtcdConnector::new()
            .connect(&[], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Unavailable(_)));
    }
}
