//! Anthropic Messages API adapter

use http::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use polyglot_config::{ProtocolAuth, ProtocolId, ProxyConfig};
use polyglot_core::{HttpError, anthropic_error_body};
use secrecy::ExposeSecret;
use serde_json::Value;

use super::{
    InboundTransformer, OutboundTransformer, ProtocolAdapter, SerializedRequest, insert_secret, json_headers,
    parse_body, parse_upstream, to_body, upstream_url,
};
use crate::convert::anthropic::{AnthropicInbound, AnthropicOutbound};
use crate::error::LlmError;
use crate::protocol::anthropic::{AnthropicRequest, AnthropicResponse};
use crate::types::{CompletionRequest, CompletionResponse};

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Client path of the Messages API
const MESSAGES_PATH: &str = "/v1/messages";

const X_API_KEY: &str = "x-api-key";
const VERSION_HEADER: &str = "anthropic-version";

/// Anthropic Messages API
#[derive(Debug, Default, Clone, Copy)]
pub struct AnthropicAdapter;

impl ProtocolAdapter for AnthropicAdapter {
    fn id(&self) -> ProtocolId {
        ProtocolId::Anthropic
    }

    fn detect(&self, headers: &HeaderMap, path: &str) -> bool {
        path == MESSAGES_PATH || headers.contains_key(VERSION_HEADER) || headers.contains_key(X_API_KEY)
    }

    fn parse_request(&self, body: Value, _headers: &HeaderMap, _path: &str) -> Result<CompletionRequest, LlmError> {
        parse_body::<AnthropicRequest>(body).map(Into::into)
    }

    fn serialize_request(
        &self,
        req: &CompletionRequest,
        config: &ProxyConfig,
    ) -> Result<SerializedRequest, LlmError> {
        let url = upstream_url(&format!("{}{MESSAGES_PATH}", config.base_url()))?;

        let mut headers = json_headers();
        headers.insert(VERSION_HEADER, HeaderValue::from_static(ANTHROPIC_VERSION));
        match &config.auth {
            ProtocolAuth::Bearer { token } => {
                insert_secret(&mut headers, AUTHORIZATION, &format!("Bearer {}", token.expose_secret()))?;
            }
            ProtocolAuth::XApiKey { key } => {
                insert_secret(&mut headers, HeaderName::from_static(X_API_KEY), key.expose_secret())?;
            }
            _ => {}
        }

        Ok(SerializedRequest {
            url,
            body: to_body(&AnthropicRequest::from(req))?,
            headers,
        })
    }

    fn parse_response(&self, body: Value) -> Result<CompletionResponse, LlmError> {
        parse_upstream::<AnthropicResponse>(body).map(Into::into)
    }

    fn serialize_response(&self, resp: &CompletionResponse) -> Result<Value, LlmError> {
        to_body(&AnthropicResponse::from(resp))
    }

    fn inbound_stream(&self) -> Box<dyn InboundTransformer> {
        Box::new(AnthropicInbound::default())
    }

    fn outbound_stream(&self, model: &str, message_id: &str) -> Box<dyn OutboundTransformer> {
        Box::new(AnthropicOutbound::new(model, message_id))
    }

    fn error_body(&self, error: &dyn HttpError) -> Value {
        anthropic_error_body(error)
    }
}
