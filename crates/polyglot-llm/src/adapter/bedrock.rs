//! AWS Bedrock runtime adapter (Anthropic models)
//!
//! Bodies are Anthropic Messages bodies without `model`, which moves
//! into the URL. Requests are `SigV4`-signed and streams arrive as AWS
//! event-stream frames whose `chunk` payloads wrap Anthropic events.

use http::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use http::Method;
use jiff::Timestamp;
use polyglot_config::{ProtocolAuth, ProtocolId, ProxyConfig};
use polyglot_core::{HttpError, anthropic_error_body};
use secrecy::ExposeSecret;
use serde_json::Value;

use super::{
    InboundTransformer, OutboundTransformer, ProtocolAdapter, SerializedRequest, json_headers, parse_body,
    parse_upstream, to_body, upstream_url,
};
use crate::codec::EventStreamDecoder;
use crate::convert::anthropic::{AnthropicEventMapper, AnthropicOutbound, DEFAULT_MAX_TOKENS};
use crate::error::LlmError;
use crate::protocol::anthropic::{AnthropicRequest, AnthropicResponse};
use crate::sigv4::{self, ALGORITHM, SigningParams};
use crate::types::{CompletionRequest, CompletionResponse, StreamEvent};

/// `anthropic_version` Bedrock expects in the body
const BEDROCK_ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// `SigV4` service name of the runtime endpoint
const SERVICE: &str = "bedrock-runtime";

const STREAM_ACTION: &str = "invoke-with-response-stream";

const BEDROCK_ACCEPT: &str = "x-amz-bedrock-accept";

/// AWS Bedrock runtime
#[derive(Debug, Default, Clone, Copy)]
pub struct BedrockAdapter;

impl BedrockAdapter {
    /// Sign `request` as of `time`
    pub fn sign_at(
        request: &mut SerializedRequest,
        body: &[u8],
        config: &ProxyConfig,
        time: Timestamp,
    ) -> Result<(), LlmError> {
        let ProtocolAuth::Aws(creds) = &config.auth else {
            return Err(LlmError::Config("bedrock targets require aws credentials".to_owned()));
        };

        let params = SigningParams {
            access_key_id: &creds.access_key_id,
            secret_access_key: creds.secret_access_key.expose_secret(),
            session_token: creds.session_token.as_ref().map(ExposeSecret::expose_secret),
            region: &creds.region,
            service: SERVICE,
            time,
        };
        request.headers = sigv4::sign(&Method::POST, &request.url, &request.headers, body, &params)?;
        Ok(())
    }
}

impl ProtocolAdapter for BedrockAdapter {
    fn id(&self) -> ProtocolId {
        ProtocolId::Bedrock
    }

    fn detect(&self, headers: &HeaderMap, _path: &str) -> bool {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|auth| auth.starts_with(ALGORITHM))
    }

    fn parse_request(&self, body: Value, _headers: &HeaderMap, path: &str) -> Result<CompletionRequest, LlmError> {
        let mut req: CompletionRequest = parse_body::<AnthropicRequest>(body)?.into();
        if req.model.is_empty()
            && let Some(model) = model_from_path(path)
        {
            req.model = model;
        }
        req.stream |= path.ends_with(STREAM_ACTION);
        Ok(req)
    }

    fn serialize_request(
        &self,
        req: &CompletionRequest,
        config: &ProxyConfig,
    ) -> Result<SerializedRequest, LlmError> {
        if !matches!(config.auth, ProtocolAuth::Aws(_)) {
            return Err(LlmError::Config("bedrock targets require aws credentials".to_owned()));
        }

        let action = if req.stream { STREAM_ACTION } else { "invoke" };
        let url = format!(
            "{}/model/{}/{action}",
            config.base_url(),
            urlencoding::encode(&req.model)
        );

        let mut body = AnthropicRequest::from(req);
        body.model.clear();
        body.stream = None;
        body.anthropic_version = Some(BEDROCK_ANTHROPIC_VERSION.to_owned());
        body.max_tokens = Some(req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS));

        let mut headers = json_headers();
        headers.insert(BEDROCK_ACCEPT, HeaderValue::from_static("*/*"));

        Ok(SerializedRequest {
            url: upstream_url(&url)?,
            body: to_body(&body)?,
            headers,
        })
    }

    fn sign(&self, request: &mut SerializedRequest, body: &[u8], config: &ProxyConfig) -> Result<(), LlmError> {
        Self::sign_at(request, body, config, Timestamp::now())
    }

    fn parse_response(&self, body: Value) -> Result<CompletionResponse, LlmError> {
        parse_upstream::<AnthropicResponse>(body).map(Into::into)
    }

    fn serialize_response(&self, resp: &CompletionResponse) -> Result<Value, LlmError> {
        to_body(&AnthropicResponse::from(resp))
    }

    fn inbound_stream(&self) -> Box<dyn InboundTransformer> {
        Box::new(BedrockInbound::default())
    }

    fn outbound_stream(&self, model: &str, message_id: &str) -> Box<dyn OutboundTransformer> {
        Box::new(AnthropicOutbound::new(model, message_id))
    }

    fn error_body(&self, error: &dyn HttpError) -> Value {
        anthropic_error_body(error)
    }
}

/// `/model/{id}/invoke` -> `{id}`, percent-decoded
fn model_from_path(path: &str) -> Option<String> {
    let (_, rest) = path.split_once("/model/")?;
    let raw = rest.split('/').next().filter(|m| !m.is_empty())?;
    Some(urlencoding::decode(raw).map_or_else(|_| raw.to_owned(), std::borrow::Cow::into_owned))
}

/// Event-stream frames -> canonical events
#[derive(Debug, Default)]
pub struct BedrockInbound {
    decoder: EventStreamDecoder,
    mapper: AnthropicEventMapper,
}

impl InboundTransformer for BedrockInbound {
    fn transform(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for message in self.decoder.feed(chunk) {
            if message.is_exception() {
                let detail = message.payload.get("message").and_then(Value::as_str).unwrap_or_default();
                tracing::warn!(exception = %message.event_type, "bedrock stream raised an exception");
                events.push(StreamEvent::Error {
                    message: format!("{}: {detail}", message.event_type),
                    code: None,
                });
            } else if let Some(event) = message.chunk_json() {
                events.extend(self.mapper.convert_value(event));
            }
        }
        events
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        let pending = self.decoder.pending();
        if pending > 0 {
            tracing::debug!(pending, "discarding truncated event stream frame");
        }
        Vec::new()
    }
}
