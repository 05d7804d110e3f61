//! Mock upstream provider for integration tests
//!
//! Accepts a POST on any path, records it, and answers with a canned reply

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

/// Canned upstream reply
#[derive(Clone)]
pub struct MockReply {
    status: StatusCode,
    content_type: &'static str,
    body: Bytes,
}

impl MockReply {
    /// 200 with a JSON body
    pub fn json(body: &serde_json::Value) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "application/json",
            body: Bytes::from(body.to_string()),
        }
    }

    /// 200 with a raw streamed body
    pub fn stream(content_type: &'static str, body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type,
            body: body.into(),
        }
    }

    /// Error status with a JSON body
    pub fn error(status: StatusCode, body: &serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: Bytes::from(body.to_string()),
        }
    }
}

/// What the gateway sent upstream
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Path and query
    pub uri: String,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

impl RecordedRequest {
    /// Header value as a string, empty when absent
    pub fn header(&self, name: &str) -> &str {
        self.headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or_default()
    }
}

struct MockState {
    reply: MockReply,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Mock upstream server
pub struct MockUpstream {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

impl MockUpstream {
    /// Start the mock server, returning immediately
    pub async fn start(reply: MockReply) -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            reply,
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new().fallback(record).with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL to configure as a route target
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// The single request received, panicking otherwise
    pub fn only_request(&self) -> RecordedRequest {
        let requests = self.requests();
        assert_eq!(requests.len(), 1, "expected exactly one upstream request");
        requests.into_iter().next().unwrap()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn record(State(state): State<Arc<MockState>>, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    let body = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    let uri = uri.path_and_query().map(ToString::to_string).unwrap_or_default();

    state.requests.lock().unwrap().push(RecordedRequest { uri, headers, body });

    let reply = state.reply.clone();
    (
        reply.status,
        [(axum::http::header::CONTENT_TYPE, reply.content_type)],
        reply.body,
    )
        .into_response()
}
