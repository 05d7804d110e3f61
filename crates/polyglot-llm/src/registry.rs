//! Adapter registry and client protocol detection

use std::collections::HashMap;
use std::sync::Arc;

use http::HeaderMap;
use polyglot_config::ProtocolId;

use crate::adapter::{
    AnthropicAdapter, AzureAdapter, BedrockAdapter, CohereAdapter, GeminiAdapter, MistralAdapter, OllamaAdapter,
    OpenAiAdapter, ProtocolAdapter,
};
use crate::error::LlmError;

/// Detection order, most specific first
///
/// Signed requests first, the generic chat-completions path last.
/// Mistral never matches.
const DETECTION_ORDER: [ProtocolId; 8] = [
    ProtocolId::Bedrock,
    ProtocolId::Gemini,
    ProtocolId::Azure,
    ProtocolId::Anthropic,
    ProtocolId::Ollama,
    ProtocolId::Cohere,
    ProtocolId::Mistral,
    ProtocolId::Openai,
];

/// Protocol id -> adapter
///
/// Built once at startup and shared read-only by every request.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ProtocolId, Arc<dyn ProtocolAdapter>>,
}

impl AdapterRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in adapter
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(AnthropicAdapter));
        registry.register(Arc::new(OpenAiAdapter));
        registry.register(Arc::new(GeminiAdapter));
        registry.register(Arc::new(BedrockAdapter));
        registry.register(Arc::new(AzureAdapter));
        registry.register(Arc::new(OllamaAdapter));
        registry.register(Arc::new(CohereAdapter));
        registry.register(Arc::new(MistralAdapter));
        registry
    }

    /// Add or replace the adapter for its protocol
    pub fn register(&mut self, adapter: Arc<dyn ProtocolAdapter>) {
        self.adapters.insert(adapter.id(), adapter);
    }

    /// Adapter for `id`
    pub fn get(&self, id: ProtocolId) -> Result<Arc<dyn ProtocolAdapter>, LlmError> {
        self.adapters.get(&id).cloned().ok_or_else(|| LlmError::UnknownProtocol {
            protocol: id.to_string(),
        })
    }

    /// First registered adapter, in detection order, that claims the request
    pub fn detect(&self, headers: &HeaderMap, path: &str) -> Option<Arc<dyn ProtocolAdapter>> {
        DETECTION_ORDER
            .iter()
            .filter_map(|id| self.adapters.get(id))
            .find(|adapter| adapter.detect(headers, path))
            .cloned()
    }

    /// Registered protocol ids in detection order
    pub fn protocols(&self) -> Vec<ProtocolId> {
        DETECTION_ORDER
            .into_iter()
            .filter(|id| self.adapters.contains_key(id))
            .collect()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry").field("protocols", &self.protocols()).finish()
    }
}
