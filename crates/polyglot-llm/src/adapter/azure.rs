//! Azure `OpenAI` deployments adapter

use http::header::{HeaderMap, HeaderName};
use polyglot_config::{ProtocolAuth, ProtocolId, ProxyConfig};
use secrecy::ExposeSecret;
use serde_json::Value;

use super::openai::{parse_chat_request, parse_chat_response, serialize_chat_response};
use super::{
    InboundTransformer, OutboundTransformer, ProtocolAdapter, SerializedRequest, insert_secret, json_headers, to_body,
    upstream_url,
};
use crate::convert::openai::{OpenAiInbound, OpenAiOutbound};
use crate::error::LlmError;
use crate::protocol::openai::OpenAiRequest;
use crate::types::{CompletionRequest, CompletionResponse};

/// `api-version` used when the route does not name one
const DEFAULT_API_VERSION: &str = "2024-10-21";

const API_KEY: &str = "api-key";

/// Azure `OpenAI`: chat completions addressed by deployment name
#[derive(Debug, Default, Clone, Copy)]
pub struct AzureAdapter;

impl ProtocolAdapter for AzureAdapter {
    fn id(&self) -> ProtocolId {
        ProtocolId::Azure
    }

    fn detect(&self, _headers: &HeaderMap, path: &str) -> bool {
        path.contains("/openai/deployments/")
    }

    fn parse_request(&self, body: Value, _headers: &HeaderMap, path: &str) -> Result<CompletionRequest, LlmError> {
        let mut req = parse_chat_request(body)?;
        if req.model.is_empty()
            && let Some(deployment) = deployment_from_path(path)
        {
            req.model = deployment.to_owned();
        }
        Ok(req)
    }

    fn serialize_request(
        &self,
        req: &CompletionRequest,
        config: &ProxyConfig,
    ) -> Result<SerializedRequest, LlmError> {
        let mut headers = json_headers();
        let api_version = match &config.auth {
            ProtocolAuth::Azure { api_key, api_version } => {
                insert_secret(&mut headers, HeaderName::from_static(API_KEY), api_key.expose_secret())?;
                api_version.as_deref()
            }
            ProtocolAuth::Bearer { token } => {
                insert_secret(&mut headers, HeaderName::from_static(API_KEY), token.expose_secret())?;
                None
            }
            _ => None,
        };

        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            config.base_url(),
            urlencoding::encode(&req.model),
            urlencoding::encode(api_version.unwrap_or(DEFAULT_API_VERSION)),
        );

        // The deployment in the URL names the model
        let mut body = OpenAiRequest::from(req);
        body.model.clear();

        Ok(SerializedRequest {
            url: upstream_url(&url)?,
            body: to_body(&body)?,
            headers,
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

fn deployment_from_path(path: &str) -> Option<&str> {
    let (_, rest) = path.split_once("/openai/deployments/")?;
    rest.split('/').next().filter(|d| !d.is_empty())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use url::Url;

    use super::*;

    fn config(api_version: Option<&str>) -> ProxyConfig {
        let mut config = ProxyConfig::new(
            ProtocolId::Azure,
            Url::parse("https://my-resource.openai.azure.com/").unwrap(),
        );
        config.auth = ProtocolAuth::Azure {
            api_key: "azure-key".into(),
            api_version: api_version.map(str::to_owned),
        };
        config
    }

    #[test]
    fn builds_deployment_url_without_body_model() {
        let req = CompletionRequest {
            model: "gpt-4o".to_owned(),
            ..CompletionRequest::default()
        };
        let out = AzureAdapter.serialize_request(&req, &config(None)).unwrap();

        assert_eq!(
            out.url.as_str(),
            "https://my-resource.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-10-21"
        );
        assert_eq!(out.headers["api-key"], "azure-key");
        assert!(out.body.get("model").is_none());
    }

    #[test]
    fn configured_api_version_wins() {
        let out = AzureAdapter
            .serialize_request(&CompletionRequest::default(), &config(Some("2025-01-01-preview")))
            .unwrap();
        assert!(out.url.as_str().ends_with("api-version=2025-01-01-preview"));
    }

    #[test]
    fn model_falls_back_to_path_deployment() {
        let req = AzureAdapter
            .parse_request(
                json!({"messages": [{"role": "user", "content": "hi"}]}),
                &HeaderMap::new(),
                "/openai/deployments/prod-gpt/chat/completions",
            )
            .unwrap();
        assert_eq!(req.model, "prod-gpt");
    }

    #[test]
    fn detects_deployment_paths() {
        assert!(AzureAdapter.detect(&HeaderMap::new(), "/openai/deployments/x/chat/completions"));
        assert!(!AzureAdapter.detect(&HeaderMap::new(), "/v1/chat/completions"));
    }
}
