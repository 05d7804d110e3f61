//! Per-call orchestration
//!
//! Parse with the client's protocol, resolve the model, serialize and
//! sign for the upstream protocol, forward, then translate the reply
//! back, either as one JSON body or as a live stream.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;
use http::{HeaderMap, StatusCode};
use polyglot_config::ProxyConfig;
use polyglot_core::{HttpError, openai_error_body};
use reqwest::Client;
use serde_json::Value;
use uuid::Uuid;

use crate::adapter::ProtocolAdapter;
use crate::error::LlmError;
use crate::pipeline::StreamPipeline;
use crate::registry::AdapterRegistry;
use crate::resolve::resolve_model;

/// Translated client-bound byte stream
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Infallible>> + Send>>;

/// What the client receives for one call
pub enum GatewayReply {
    /// A JSON document in the client's protocol
    Json {
        status: StatusCode,
        body: Value,
    },
    /// Upstream error status and body, untouched
    Passthrough {
        status: StatusCode,
        body: Bytes,
    },
    /// Live stream in the client's framing
    Stream {
        content_type: &'static str,
        body: ByteStream,
    },
}

impl std::fmt::Debug for GatewayReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json { status, body } => f.debug_struct("Json").field("status", status).field("body", body).finish(),
            Self::Passthrough { status, body } => f
                .debug_struct("Passthrough")
                .field("status", status)
                .field("body", body)
                .finish(),
            Self::Stream { content_type, .. } => f
                .debug_struct("Stream")
                .field("content_type", content_type)
                .finish_non_exhaustive(),
        }
    }
}

/// Translation gateway shared by every request
#[derive(Debug, Clone)]
pub struct Gateway {
    registry: Arc<AdapterRegistry>,
    client: Client,
}

impl Gateway {
    /// Build with an HTTP client using `connect_timeout`
    pub fn new(registry: AdapterRegistry, connect_timeout: Option<Duration>) -> Result<Self, LlmError> {
        let mut builder = Client::builder();
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| LlmError::Internal(anyhow::anyhow!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(registry, client))
    }

    /// Build around an existing HTTP client
    pub fn with_client(registry: AdapterRegistry, client: Client) -> Self {
        Self {
            registry: Arc::new(registry),
            client,
        }
    }

    /// Registered adapters
    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Serve one call, rendering failures in the client's error shape
    ///
    /// `path` is everything after the route token, starting with `/`.
    pub async fn handle(&self, config: &ProxyConfig, headers: &HeaderMap, path: &str, body: &[u8]) -> GatewayReply {
        let source = match self.source_adapter(config, headers, path) {
            Ok(source) => source,
            Err(e) => return error_reply(&e, None),
        };

        match self.forward(config, source.as_ref(), headers, path, body).await {
            Ok(reply) => reply,
            Err(e) => error_reply(&e, Some(source.as_ref())),
        }
    }

    /// Configured source protocol, else detection
    pub fn source_adapter(
        &self,
        config: &ProxyConfig,
        headers: &HeaderMap,
        path: &str,
    ) -> Result<Arc<dyn ProtocolAdapter>, LlmError> {
        match config.source_protocol {
            Some(id) => self.registry.get(id),
            None => self.registry.detect(headers, path).ok_or_else(|| LlmError::UndetectedProtocol {
                path: path.to_owned(),
            }),
        }
    }

    async fn forward(
        &self,
        config: &ProxyConfig,
        source: &dyn ProtocolAdapter,
        headers: &HeaderMap,
        path: &str,
        body: &[u8],
    ) -> Result<GatewayReply, LlmError> {
        let body: Value = serde_json::from_slice(body).map_err(|_| LlmError::MalformedBody)?;
        let target = self.registry.get(config.target_protocol)?;

        let mut request = source.parse_request(body, headers, path)?;
        let requested_model = request.model.clone();
        request.model = resolve_model(
            &requested_model,
            config.target_protocol,
            config.model_map.as_ref(),
            config.force_model.as_deref(),
        );

        let mut upstream = target.serialize_request(&request, config)?;
        let payload = serde_json::to_vec(&upstream.body).map_err(|e| LlmError::Internal(e.into()))?;
        target.sign(&mut upstream, &payload, config)?;

        tracing::debug!(
            source_protocol = %source.id(),
            target_protocol = %target.id(),
            model = %request.model,
            stream = request.stream,
            "forwarding request"
        );

        let response = self
            .client
            .post(upstream.url)
            .headers(upstream.headers)
            .body(payload)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target_protocol = %target.id(), error = %e, "upstream request failed");
                LlmError::Upstream(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await?;
            tracing::warn!(target_protocol = %target.id(), status = %status, "upstream returned error");
            return Ok(GatewayReply::Passthrough { status, body });
        }

        if request.stream {
            let message_id = format!("msg_{}", Uuid::new_v4().simple());
            let pipeline = StreamPipeline::new(
                target.inbound_stream(),
                source.outbound_stream(&requested_model, &message_id),
            );
            return Ok(GatewayReply::Stream {
                content_type: source.stream_content_type(),
                body: Box::pin(pipeline.into_stream(response.bytes_stream())),
            });
        }

        let upstream_body: Value = response
            .json()
            .await
            .map_err(|e| LlmError::Upstream(format!("failed to parse response: {e}")))?;

        let mut completion = target.parse_response(upstream_body)?;
        completion.model = requested_model;

        Ok(GatewayReply::Json {
            status: StatusCode::OK,
            body: source.serialize_response(&completion)?,
        })
    }
}

/// Render `error` for a client, in its protocol when known
pub fn error_reply(error: &LlmError, source: Option<&dyn ProtocolAdapter>) -> GatewayReply {
    let status = error.status_code();
    if status.is_server_error() {
        tracing::error!(error = %error, "translation failed");
    } else {
        tracing::debug!(error = %error, "rejected client request");
    }

    GatewayReply::Json {
        status,
        body: source.map_or_else(|| openai_error_body(error), |s| s.error_body(error)),
    }
}
