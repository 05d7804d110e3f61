//! Protocol adapters
//!
//! One [`ProtocolAdapter`] per wire protocol. An adapter knows how to
//! recognise a client request, convert bodies to and from the canonical
//! model, build the upstream URL and headers, and create the stream
//! transformers for both directions.

mod anthropic;
mod azure;
mod bedrock;
mod cohere;
mod gemini;
mod mistral;
mod ollama;
mod openai;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use polyglot_config::{ProtocolId, ProxyConfig};
use polyglot_core::{HttpError, openai_error_body};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

pub use anthropic::AnthropicAdapter;
pub use azure::AzureAdapter;
pub use bedrock::BedrockAdapter;
pub use cohere::CohereAdapter;
pub use gemini::GeminiAdapter;
pub use mistral::MistralAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;

use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, StreamEvent};

/// Content type for server-sent event streams
pub const SSE_CONTENT_TYPE: &str = "text/event-stream";

/// Content type for newline-delimited JSON streams
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Upstream call produced by [`ProtocolAdapter::serialize_request`]
#[derive(Debug, Clone)]
pub struct SerializedRequest {
    /// Fully built upstream URL
    pub url: Url,
    /// JSON body
    pub body: Value,
    /// Headers to send, credentials included
    pub headers: HeaderMap,
}

/// Upstream wire bytes -> canonical events
///
/// Chunks may split frames anywhere; implementations buffer the tail.
pub trait InboundTransformer: Send {
    /// Feed one upstream chunk
    fn transform(&mut self, chunk: &[u8]) -> Vec<StreamEvent>;

    /// Flush buffered input once the upstream ends
    fn finish(&mut self) -> Vec<StreamEvent>;
}

/// Canonical events -> client wire bytes
pub trait OutboundTransformer: Send {
    /// Encode one canonical event
    fn transform(&mut self, event: &StreamEvent) -> Vec<Bytes>;

    /// Emit whatever the client protocol needs to terminate the stream
    fn finish(&mut self) -> Vec<Bytes>;
}

/// A wire protocol on either side of a route
pub trait ProtocolAdapter: Send + Sync {
    /// Protocol identifier
    fn id(&self) -> ProtocolId;

    /// Whether a client request looks like this protocol
    fn detect(&self, headers: &HeaderMap, path: &str) -> bool;

    /// Client body -> canonical request
    ///
    /// `path` is the request path after the route token; some protocols
    /// carry the model or the stream flag there.
    fn parse_request(&self, body: Value, headers: &HeaderMap, path: &str) -> Result<CompletionRequest, LlmError>;

    /// Canonical request -> upstream URL, body and headers
    fn serialize_request(&self, req: &CompletionRequest, config: &ProxyConfig)
    -> Result<SerializedRequest, LlmError>;

    /// Add signing headers computed over the exact body bytes
    ///
    /// Called after serialization, right before the upstream call.
    fn sign(&self, _request: &mut SerializedRequest, _body: &[u8], _config: &ProxyConfig) -> Result<(), LlmError> {
        Ok(())
    }

    /// Successful upstream body -> canonical response
    fn parse_response(&self, body: Value) -> Result<CompletionResponse, LlmError>;

    /// Canonical response -> client body
    fn serialize_response(&self, resp: &CompletionResponse) -> Result<Value, LlmError>;

    /// Transformer for streams this protocol's upstream produces
    fn inbound_stream(&self) -> Box<dyn InboundTransformer>;

    /// Transformer for streams sent to this protocol's clients
    fn outbound_stream(&self, model: &str, message_id: &str) -> Box<dyn OutboundTransformer>;

    /// Content type of streamed responses to clients
    fn stream_content_type(&self) -> &'static str {
        SSE_CONTENT_TYPE
    }

    /// Error envelope for clients of this protocol
    fn error_body(&self, error: &dyn HttpError) -> Value {
        openai_error_body(error)
    }
}

/// Deserialize a client body into a wire type
pub(crate) fn parse_body<T: DeserializeOwned>(body: Value) -> Result<T, LlmError> {
    serde_json::from_value(body).map_err(|e| LlmError::InvalidRequest(e.to_string()))
}

/// Deserialize an upstream body into a wire type
pub(crate) fn parse_upstream<T: DeserializeOwned>(body: Value) -> Result<T, LlmError> {
    serde_json::from_value(body).map_err(|e| LlmError::Upstream(format!("unexpected response body: {e}")))
}

/// Serialize a wire type into a JSON body
pub(crate) fn to_body<T: Serialize>(value: &T) -> Result<Value, LlmError> {
    serde_json::to_value(value).map_err(|e| LlmError::Internal(e.into()))
}

/// Parse a built upstream URL
pub(crate) fn upstream_url(raw: &str) -> Result<Url, LlmError> {
    Url::parse(raw).map_err(|e| LlmError::Config(format!("invalid upstream URL `{raw}`: {e}")))
}

/// Headers every upstream JSON call carries
pub(crate) fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

/// Insert a credential header, rejecting values that cannot go on the wire
pub(crate) fn insert_secret(headers: &mut HeaderMap, name: HeaderName, value: &str) -> Result<(), LlmError> {
    let mut value = HeaderValue::from_str(value)
        .map_err(|_| LlmError::Config(format!("credential for `{name}` is not a valid header value")))?;
    value.set_sensitive(true);
    headers.insert(name, value);
    Ok(())
}
