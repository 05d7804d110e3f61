//! Ollama chat adapter

use http::header::{AUTHORIZATION, HeaderMap};
use polyglot_config::{ProtocolId, ProxyConfig};
use serde_json::Value;

use super::{
    InboundTransformer, NDJSON_CONTENT_TYPE, OutboundTransformer, ProtocolAdapter, SerializedRequest, json_headers,
    parse_body, parse_upstream, to_body, upstream_url,
};
use crate::convert::ollama::{OllamaInbound, OllamaOutbound};
use crate::error::LlmError;
use crate::protocol::ollama::{OllamaRequest, OllamaResponse};
use crate::types::{CompletionRequest, CompletionResponse};

const CHAT_PATH: &str = "/api/chat";

/// Local Ollama server
#[derive(Debug, Default, Clone, Copy)]
pub struct OllamaAdapter;

impl ProtocolAdapter for OllamaAdapter {
    fn id(&self) -> ProtocolId {
        ProtocolId::Ollama
    }

    fn detect(&self, headers: &HeaderMap, path: &str) -> bool {
        path == CHAT_PATH && !headers.contains_key(AUTHORIZATION)
    }

    fn parse_request(&self, body: Value, _headers: &HeaderMap, _path: &str) -> Result<CompletionRequest, LlmError> {
        parse_body::<OllamaRequest>(body).map(Into::into)
    }

    fn serialize_request(
        &self,
        req: &CompletionRequest,
        config: &ProxyConfig,
    ) -> Result<SerializedRequest, LlmError> {
        Ok(SerializedRequest {
            url: upstream_url(&format!("{}{CHAT_PATH}", config.base_url()))?,
            body: to_body(&OllamaRequest::from(req))?,
            headers: json_headers(),
        })
    }

    fn parse_response(&self, body: Value) -> Result<CompletionResponse, LlmError> {
        parse_upstream::<OllamaResponse>(body).map(Into::into)
    }

    fn serialize_response(&self, resp: &CompletionResponse) -> Result<Value, LlmError> {
        to_body(&OllamaResponse::from(resp))
    }

    fn inbound_stream(&self) -> Box<dyn InboundTransformer> {
        Box::new(OllamaInbound::default())
    }

    fn outbound_stream(&self, model: &str, _message_id: &str) -> Box<dyn OutboundTransformer> {
        Box::new(OllamaOutbound::new(model))
    }

    fn stream_content_type(&self) -> &'static str {
        NDJSON_CONTENT_TYPE
    }
}
