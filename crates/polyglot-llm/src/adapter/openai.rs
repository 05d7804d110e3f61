//! `OpenAI` Chat Completions adapter
//!
//! Also home to the helpers shared by the other chat-completions
//! dialects (Azure, Mistral).

use http::header::{AUTHORIZATION, HeaderMap};
use polyglot_config::{ProtocolAuth, ProtocolId, ProxyConfig};
use secrecy::ExposeSecret;
use serde_json::Value;

use super::{
    InboundTransformer, OutboundTransformer, ProtocolAdapter, SerializedRequest, insert_secret, json_headers,
    parse_body, parse_upstream, to_body, upstream_url,
};
use crate::convert::openai::{OpenAiInbound, OpenAiOutbound};
use crate::error::LlmError;
use crate::protocol::openai::{OpenAiRequest, OpenAiResponse};
use crate::types::{CompletionRequest, CompletionResponse};

const CHAT_COMPLETIONS: &str = "/chat/completions";

/// `OpenAI` Chat Completions and compatible vendors
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAiAdapter;

impl ProtocolAdapter for OpenAiAdapter {
    fn id(&self) -> ProtocolId {
        ProtocolId::Openai
    }

    fn detect(&self, _headers: &HeaderMap, path: &str) -> bool {
        path == "/v1/chat/completions" || path.ends_with(CHAT_COMPLETIONS)
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

/// Append `/v1` unless the base already ends in a version segment
pub(super) fn chat_completions_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if ends_with_version(base) {
        format!("{base}{CHAT_COMPLETIONS}")
    } else {
        format!("{base}/v1{CHAT_COMPLETIONS}")
    }
}

fn ends_with_version(base: &str) -> bool {
    base.rsplit('/')
        .next()
        .and_then(|segment| segment.strip_prefix('v'))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// JSON headers plus `Authorization: Bearer` when a token is configured
pub(super) fn bearer_headers(auth: &ProtocolAuth) -> Result<HeaderMap, LlmError> {
    let mut headers = json_headers();
    let token = match auth {
        ProtocolAuth::Bearer { token } => Some(token),
        ProtocolAuth::XApiKey { key } => Some(key),
        _ => None,
    };
    if let Some(token) = token {
        insert_secret(&mut headers, AUTHORIZATION, &format!("Bearer {}", token.expose_secret()))?;
    }
    Ok(headers)
}

pub(super) fn parse_chat_request(body: Value) -> Result<CompletionRequest, LlmError> {
    parse_body::<OpenAiRequest>(body).map(Into::into)
}

pub(super) fn parse_chat_response(body: Value) -> Result<CompletionResponse, LlmError> {
    parse_upstream::<OpenAiResponse>(body).map(Into::into)
}

pub(super) fn serialize_chat_response(resp: &CompletionResponse) -> Result<Value, LlmError> {
    to_body(&OpenAiResponse::from(resp))
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;

    #[test]
    fn version_segment_is_added_once() {
        assert_eq!(
            chat_completions_url("https://api.openai.com"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_url("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_url("https://integrate.api.nvidia.com/custom/v2"),
            "https://integrate.api.nvidia.com/custom/v2/chat/completions"
        );
        assert_eq!(
            chat_completions_url("https://proxy.example.com/openai"),
            "https://proxy.example.com/openai/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_url("https://proxy.example.com/version"),
            "https://proxy.example.com/version/v1/chat/completions"
        );
    }

    #[test]
    fn detects_chat_completion_paths() {
        let adapter = OpenAiAdapter;
        assert!(adapter.detect(&HeaderMap::new(), "/v1/chat/completions"));
        assert!(adapter.detect(&HeaderMap::new(), "/openai/chat/completions"));
        assert!(!adapter.detect(&HeaderMap::new(), "/v1/messages"));
    }

    #[test]
    fn serializes_with_bearer_auth() {
        let mut config = ProxyConfig::new(ProtocolId::Openai, Url::parse("https://api.openai.com/v1").unwrap());
        config.auth = ProtocolAuth::Bearer { token: "sk-test".into() };

        let req = CompletionRequest {
            model: "gpt-4o".to_owned(),
            stream: true,
            ..CompletionRequest::default()
        };
        let out = OpenAiAdapter.serialize_request(&req, &config).unwrap();

        assert_eq!(out.url.as_str(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(out.headers[AUTHORIZATION], "Bearer sk-test");
        assert_eq!(out.body["model"], "gpt-4o");
        assert_eq!(out.body["stream_options"]["include_usage"], true);
    }

    #[test]
    fn no_auth_sends_no_authorization() {
        let config = ProxyConfig::new(ProtocolId::Openai, Url::parse("http://localhost:8000").unwrap());
        let out = OpenAiAdapter
            .serialize_request(&CompletionRequest::default(), &config)
            .unwrap();
        assert!(!out.headers.contains_key(AUTHORIZATION));
        assert_eq!(out.url.as_str(), "http://localhost:8000/v1/chat/completions");
    }
}
