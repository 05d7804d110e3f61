//! Cohere v2 chat adapter

use http::header::{AUTHORIZATION, HeaderMap};
use polyglot_config::{ProtocolAuth, ProtocolId, ProxyConfig};
use secrecy::ExposeSecret;
use serde_json::Value;

use super::{
    InboundTransformer, OutboundTransformer, ProtocolAdapter, SerializedRequest, insert_secret, json_headers,
    parse_body, parse_upstream, to_body, upstream_url,
};
use crate::convert::cohere::{CohereInbound, CohereOutbound};
use crate::error::LlmError;
use crate::protocol::cohere::{CohereRequest, CohereResponse};
use crate::types::{CompletionRequest, CompletionResponse};

const CHAT_PATH: &str = "/v2/chat";

/// Cohere v2 chat
#[derive(Debug, Default, Clone, Copy)]
pub struct CohereAdapter;

impl ProtocolAdapter for CohereAdapter {
    fn id(&self) -> ProtocolId {
        ProtocolId::Cohere
    }

    fn detect(&self, _headers: &HeaderMap, path: &str) -> bool {
        path == CHAT_PATH
    }

    fn parse_request(&self, body: Value, _headers: &HeaderMap, _path: &str) -> Result<CompletionRequest, LlmError> {
        parse_body::<CohereRequest>(body).map(Into::into)
    }

    fn serialize_request(
        &self,
        req: &CompletionRequest,
        config: &ProxyConfig,
    ) -> Result<SerializedRequest, LlmError> {
        let mut headers = json_headers();
        if let ProtocolAuth::Bearer { token } = &config.auth {
            insert_secret(&mut headers, AUTHORIZATION, &format!("Bearer {}", token.expose_secret()))?;
        }

        Ok(SerializedRequest {
            url: upstream_url(&format!("{}{CHAT_PATH}", config.base_url()))?,
            body: to_body(&CohereRequest::from(req))?,
            headers,
        })
    }

    fn parse_response(&self, body: Value) -> Result<CompletionResponse, LlmError> {
        parse_upstream::<CohereResponse>(body).map(Into::into)
    }

    fn serialize_response(&self, resp: &CompletionResponse) -> Result<Value, LlmError> {
        to_body(&CohereResponse::from(resp))
    }

    fn inbound_stream(&self) -> Box<dyn InboundTransformer> {
        Box::new(CohereInbound::default())
    }

    fn outbound_stream(&self, _model: &str, message_id: &str) -> Box<dyn OutboundTransformer> {
        Box::new(CohereOutbound::new(message_id))
    }
}
