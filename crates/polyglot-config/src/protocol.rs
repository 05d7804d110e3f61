use indexmap::IndexMap;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

/// Wire protocols the gateway can speak on either side of a route
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProtocolId {
    /// Anthropic Messages API
    Anthropic,
    /// `OpenAI` Chat Completions (and compatible vendors)
    Openai,
    /// Google Gemini `generateContent`
    Gemini,
    /// AWS Bedrock runtime (Anthropic models)
    Bedrock,
    /// Azure `OpenAI` deployments
    Azure,
    /// Ollama chat API
    Ollama,
    /// Cohere v2 chat API
    Cohere,
    /// Mistral chat completions
    Mistral,
}

impl ProtocolId {
    /// Human-readable protocol name
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Anthropic => "Anthropic",
            Self::Openai => "OpenAI / NVIDIA / DeepSeek",
            Self::Gemini => "Google Gemini",
            Self::Bedrock => "AWS Bedrock",
            Self::Azure => "Azure OpenAI",
            Self::Ollama => "Ollama",
            Self::Cohere => "Cohere",
            Self::Mistral => "Mistral",
        }
    }

    /// Auth variant the protocol's public endpoint usually expects
    pub const fn default_auth_type(self) -> &'static str {
        match self {
            Self::Anthropic => "x-api-key",
            Self::Openai | Self::Gemini | Self::Cohere | Self::Mistral => "bearer",
            Self::Bedrock => "aws",
            Self::Azure => "azure",
            Self::Ollama => "none",
        }
    }

    /// Public base URL for the protocol's reference backend
    pub const fn default_base_url(self) -> &'static str {
        match self {
            Self::Anthropic => "https://api.anthropic.com",
            Self::Openai => "https://api.openai.com/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com",
            Self::Bedrock => "https://bedrock-runtime.us-east-1.amazonaws.com",
            Self::Azure => "https://YOUR-RESOURCE.openai.azure.com",
            Self::Ollama => "http://localhost:11434",
            Self::Cohere => "https://api.cohere.com",
            Self::Mistral => "https://api.mistral.ai/v1",
        }
    }
}

/// Credentials attached to upstream requests
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProtocolAuth {
    /// `Authorization: Bearer <token>` (or the protocol's equivalent key header)
    Bearer {
        /// API token
        token: SecretString,
    },
    /// Anthropic-style `x-api-key` header
    XApiKey {
        /// API key
        key: SecretString,
    },
    /// AWS `SigV4` request signing
    Aws(AwsCredentials),
    /// Azure `api-key` header
    Azure {
        /// Azure resource key
        api_key: SecretString,
        /// `api-version` query parameter
        #[serde(default)]
        api_version: Option<String>,
    },
    /// No credentials
    #[default]
    None,
}

/// Static AWS credentials for `SigV4`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AwsCredentials {
    /// Access key id
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: SecretString,
    /// Session token for temporary credentials
    #[serde(default)]
    pub session_token: Option<SecretString>,
    /// Region the runtime endpoint lives in
    pub region: String,
}

/// One translation route: which protocol the client speaks and where to forward
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    /// Route format version; only `1` is served
    #[serde(default = "default_version")]
    pub version: u32,
    /// Client protocol; detected from the request when absent
    #[serde(default)]
    pub source_protocol: Option<ProtocolId>,
    /// Upstream protocol
    pub target_protocol: ProtocolId,
    /// Upstream base URL
    pub target_base_url: Url,
    /// Upstream credentials
    #[serde(default)]
    pub auth: ProtocolAuth,
    /// Client model name to upstream model name
    #[serde(default)]
    pub model_map: Option<IndexMap<String, String>>,
    /// Model that replaces whatever the client asks for
    #[serde(default)]
    pub force_model: Option<String>,
}

impl ProxyConfig {
    /// Route targeting `target` at `base_url` with no credentials
    pub const fn new(target_protocol: ProtocolId, target_base_url: Url) -> Self {
        Self {
            version: 1,
            source_protocol: None,
            target_protocol,
            target_base_url,
            auth: ProtocolAuth::None,
            model_map: None,
            force_model: None,
        }
    }

    /// Base URL without trailing slashes
    pub fn base_url(&self) -> &str {
        self.target_base_url.as_str().trim_end_matches('/')
    }
}

const fn default_version() -> u32 {
    1
}
