//! Google Gemini `generateContent` adapter

use http::header::{HeaderMap, HeaderName};
use polyglot_config::{ProtocolAuth, ProtocolId, ProxyConfig};
use secrecy::ExposeSecret;
use serde_json::Value;

use super::{
    InboundTransformer, OutboundTransformer, ProtocolAdapter, SerializedRequest, insert_secret, json_headers,
    parse_body, parse_upstream, to_body, upstream_url,
};
use crate::convert::gemini::{GeminiInbound, GeminiOutbound};
use crate::error::LlmError;
use crate::protocol::gemini::{GeminiRequest, GeminiResponse};
use crate::types::{CompletionRequest, CompletionResponse};

const GOOG_API_KEY: &str = "x-goog-api-key";

const STREAM_METHOD: &str = ":streamGenerateContent";
const UNARY_METHOD: &str = ":generateContent";

/// Google Gemini
#[derive(Debug, Default, Clone, Copy)]
pub struct GeminiAdapter;

impl ProtocolAdapter for GeminiAdapter {
    fn id(&self) -> ProtocolId {
        ProtocolId::Gemini
    }

    fn detect(&self, _headers: &HeaderMap, path: &str) -> bool {
        path.contains("/models/") && (path.contains(UNARY_METHOD) || path.contains(STREAM_METHOD))
    }

    fn parse_request(&self, body: Value, _headers: &HeaderMap, path: &str) -> Result<CompletionRequest, LlmError> {
        let mut req: CompletionRequest = parse_body::<GeminiRequest>(body)?.into();
        req.model = model_from_path(path).unwrap_or_default().to_owned();
        req.stream = path.contains(STREAM_METHOD);
        Ok(req)
    }

    fn serialize_request(
        &self,
        req: &CompletionRequest,
        config: &ProxyConfig,
    ) -> Result<SerializedRequest, LlmError> {
        let method = if req.stream {
            "streamGenerateContent?alt=sse"
        } else {
            "generateContent"
        };
        let url = format!("{}/v1beta/models/{}:{method}", config.base_url(), req.model);

        let mut headers = json_headers();
        let key = match &config.auth {
            ProtocolAuth::Bearer { token } => Some(token),
            ProtocolAuth::XApiKey { key } => Some(key),
            _ => None,
        };
        if let Some(key) = key {
            insert_secret(&mut headers, HeaderName::from_static(GOOG_API_KEY), key.expose_secret())?;
        }

        Ok(SerializedRequest {
            url: upstream_url(&url)?,
            body: to_body(&GeminiRequest::from(req))?,
            headers,
        })
    }

    fn parse_response(&self, body: Value) -> Result<CompletionResponse, LlmError> {
        parse_upstream::<GeminiResponse>(body).map(Into::into)
    }

    fn serialize_response(&self, resp: &CompletionResponse) -> Result<Value, LlmError> {
        to_body(&GeminiResponse::from(resp))
    }

    fn inbound_stream(&self) -> Box<dyn InboundTransformer> {
        Box::new(GeminiInbound::default())
    }

    fn outbound_stream(&self, model: &str, _message_id: &str) -> Box<dyn OutboundTransformer> {
        Box::new(GeminiOutbound::new(model))
    }
}

/// `/v1beta/models/{model}:generateContent` -> `{model}`
fn model_from_path(path: &str) -> Option<&str> {
    let (_, rest) = path.split_once("/models/")?;
    rest.split(['/', ':']).next().filter(|m| !m.is_empty())
}
