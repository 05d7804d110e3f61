//! Ollama `/api/chat` wire format types

use serde::{Deserialize, Serialize};
use serde_json::Value;

// -- Request types --

/// Ollama chat request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OllamaRequest {
    /// Model identifier
    #[serde(default)]
    pub model: String,
    /// Conversation messages, system included
    #[serde(default)]
    pub messages: Vec<OllamaMessage>,
    /// Whether to stream; Ollama streams unless told otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Sampling options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<OllamaOptions>,
    /// Tool definitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OllamaTool>>,
}

/// Ollama chat message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OllamaMessage {
    /// Role ("system", "user", "assistant", or "tool")
    #[serde(default)]
    pub role: String,
    /// Text content
    #[serde(default)]
    pub content: String,
    /// Reasoning trace from thinking models
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    /// Base64-encoded images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    /// Tool calls made by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OllamaToolCall>>,
    /// Name of the tool that produced this result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

/// Sampling options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OllamaOptions {
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Top-k sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

impl OllamaOptions {
    /// Whether no option is set
    pub const fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.top_p.is_none()
            && self.top_k.is_none()
            && self.num_predict.is_none()
            && self.stop.is_none()
    }
}

/// Ollama tool definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaTool {
    /// Tool type (always "function")
    #[serde(rename = "type", default = "function_type")]
    pub tool_type: String,
    /// Function specification
    pub function: OllamaFunction,
}

/// Ollama function specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaFunction {
    /// Function name
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// Ollama tool call; arguments are a JSON object, not a string
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaToolCall {
    /// Function call details
    pub function: OllamaFunctionCall,
}

/// Function call details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaFunctionCall {
    /// Function name
    pub name: String,
    /// Arguments object
    #[serde(default)]
    pub arguments: Value,
}

fn function_type() -> String {
    "function".to_owned()
}

// -- Response types --

/// Ollama chat response, also the shape of each NDJSON stream line
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OllamaResponse {
    /// Model used
    #[serde(default)]
    pub model: String,
    /// RFC 3339 creation time
    #[serde(default)]
    pub created_at: String,
    /// Generated message (or fragment, when streaming)
    #[serde(default)]
    pub message: OllamaMessage,
    /// Whether this is the final line
    #[serde(default)]
    pub done: bool,
    /// Why generation stopped ("stop", "length")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,
    /// Prompt tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u32>,
    /// Generated tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u32>,
}
