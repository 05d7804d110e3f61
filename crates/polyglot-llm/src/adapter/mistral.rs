//! Mistral chat completions adapter
//!
//! Mistral speaks the `OpenAI` chat dialect, so nothing in a request
//! tells the two apart. Routes select it explicitly.

use http::header::HeaderMap;
use polyglot_config::{ProtocolId, ProxyConfig};
use serde_json::Value;

use super::openai::{
    bearer_headers, chat_completions_url, parse_chat_request, parse_chat_response, serialize_chat_response,
};
use super::{InboundTransformer, OutboundTransformer, ProtocolAdapter, SerializedRequest, to_body, upstream_url};
use crate::convert::openai::{OpenAiInbound, OpenAiOutbound};
use crate::error::LlmError;
use crate::protocol::openai::OpenAiRequest;
use crate::types::{CompletionRequest, CompletionResponse};

/// Mistral La Plateforme
#[derive(Debug, Default, Clone, Copy)]
pub struct MistralAdapter;

impl ProtocolAdapter for MistralAdapter {
    fn id(&self) -> ProtocolId {
        ProtocolId::Mistral
    }

    fn detect(&self, _headers: &HeaderMap, _path: &str) -> bool {
        false
    }

    fn parse_request(&self, body: Value, _headers: &HeaderMap, _path: &str) -> Result<CompletionRequest, LlmError> {
        parse_chat_request(body)
    }

    fn serialize_request(
        &self,
        req: &CompletionRequest,
        config: &ProxyConfig,
    ) -> Result<SerializedRequest, LlmError> {
        Ok(SerializedRequest {
            url: upstream_url(&chat_completions_url(config.base_url()))?,
            body: to_body(&OpenAiRequest::from(req))?,
            headers: bearer_headers(&config.auth)?,
        })
    }

    fn parse_response(&self, body: Value) -> Result<CompletionResponse, LlmError> {
        parse_chat_response(body)
    }

    fn serialize_response(&self, resp: &CompletionResponse) -> Result<Value, LlmError> {
        serialize_chat_response(resp)
    }

    fn inbound_stream(&self) -> Box<dyn InboundTransformer> {
        Box::new(OpenAiInbound::default())
    }

    fn outbound_stream(&self, model: &str, message_id: &str) -> Box<dyn OutboundTransformer> {
        Box::new(OpenAiOutbound::new(model, message_id))
    }
}
