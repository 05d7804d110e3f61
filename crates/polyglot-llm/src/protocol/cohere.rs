//! Cohere v2 chat API wire format types

use serde::{Deserialize, Serialize};
use serde_json::Value;

// -- Request types --

/// Cohere `/v2/chat` request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CohereRequest {
    /// Model identifier
    #[serde(default)]
    pub model: String,
    /// Conversation messages, system included
    #[serde(default)]
    pub messages: Vec<CohereMessage>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<f64>,
    /// Top-k sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,
    /// Tool definitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<CohereTool>>,
    /// Tool choice: "REQUIRED" or "NONE"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

/// Cohere chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohereMessage {
    /// Role ("system", "user", "assistant", or "tool")
    pub role: String,
    /// Content: a string or typed parts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<CohereContent>,
    /// Tool calls made by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<CohereToolCall>>,
    /// Reasoning the assistant gave before calling tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_plan: Option<String>,
    /// Tool call this message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Cohere content can be a string or array of parts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CohereContent {
    /// Plain text
    Text(String),
    /// Typed parts
    Parts(Vec<CohereContentPart>),
}

/// Content part in a Cohere message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CohereContentPart {
    /// Text content
    Text {
        /// The text string
        text: String,
    },
    /// Tool output document
    Document {
        /// Arbitrary document payload
        document: Value,
    },
    /// Part types this gateway does not translate
    #[serde(other)]
    Unsupported,
}

/// Cohere tool definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohereTool {
    /// Tool type (always "function")
    #[serde(rename = "type", default = "function_type")]
    pub tool_type: String,
    /// Function specification
    pub function: CohereFunction,
}

/// Cohere function specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohereFunction {
    /// Function name
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// Cohere tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohereToolCall {
    /// Tool call identifier
    #[serde(default)]
    pub id: String,
    /// Tool type (always "function")
    #[serde(rename = "type", default = "function_type")]
    pub tool_type: String,
    /// Function call details
    pub function: CohereFunctionCall,
}

/// Function call details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohereFunctionCall {
    /// Function name
    pub name: String,
    /// JSON-encoded arguments
    #[serde(default)]
    pub arguments: String,
}

fn function_type() -> String {
    "function".to_owned()
}

// -- Response types --

/// Cohere `/v2/chat` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohereResponse {
    /// Response identifier
    #[serde(default)]
    pub id: String,
    /// Why generation stopped
    #[serde(default)]
    pub finish_reason: Option<String>,
    /// Generated message
    #[serde(default)]
    pub message: CohereResponseMessage,
    /// Token usage
    #[serde(default)]
    pub usage: CohereUsage,
}

/// Message within a Cohere response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CohereResponseMessage {
    /// Role (always "assistant")
    #[serde(default)]
    pub role: String,
    /// Content parts
    #[serde(default)]
    pub content: Vec<CohereContentPart>,
    /// Tool calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<CohereToolCall>>,
    /// Reasoning before tool calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_plan: Option<String>,
}

/// Cohere usage block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CohereUsage {
    /// Tokens billed for the call
    #[serde(default)]
    pub billed_units: CohereBilledUnits,
}

/// Billed token counts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CohereBilledUnits {
    /// Input tokens
    #[serde(default)]
    pub input_tokens: u32,
    /// Output tokens
    #[serde(default)]
    pub output_tokens: u32,
}

// -- Streaming types --

/// Cohere stream event, one per SSE `data:` line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CohereStreamEvent {
    /// Stream started
    MessageStart {
        /// Response identifier
        #[serde(default)]
        id: String,
    },
    /// Text block started
    ContentStart {
        /// Content index
        #[serde(default)]
        index: u32,
    },
    /// Incremental text
    ContentDelta {
        /// Content index
        #[serde(default)]
        index: u32,
        /// Text carrier
        #[serde(default)]
        delta: CohereStreamDelta,
    },
    /// Text block finished
    ContentEnd {
        /// Content index
        #[serde(default)]
        index: u32,
    },
    /// Incremental tool plan
    ToolPlanDelta {
        /// Plan carrier
        #[serde(default)]
        delta: CohereStreamDelta,
    },
    /// Tool call started
    ToolCallStart {
        /// Tool call index
        #[serde(default)]
        index: u32,
        /// Call id and name
        #[serde(default)]
        delta: CohereStreamDelta,
    },
    /// Incremental tool arguments
    ToolCallDelta {
        /// Tool call index
        #[serde(default)]
        index: u32,
        /// Arguments fragment
        #[serde(default)]
        delta: CohereStreamDelta,
    },
    /// Tool call finished
    ToolCallEnd {
        /// Tool call index
        #[serde(default)]
        index: u32,
    },
    /// Stream finished
    MessageEnd {
        /// Finish reason and usage
        #[serde(default)]
        delta: CohereEndDelta,
    },
    /// Events this gateway does not translate (citations, debug)
    #[serde(other)]
    Unknown,
}

/// Delta wrapper: `{"message": {...}}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CohereStreamDelta {
    /// Message fragment
    #[serde(default)]
    pub message: CohereDeltaMessage,
}

/// Message fragment inside a stream delta
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CohereDeltaMessage {
    /// Text fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<CohereDeltaContent>,
    /// Tool plan fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_plan: Option<String>,
    /// Tool call fragment (a single object, not a list)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<CohereDeltaToolCall>,
}

/// Text fragment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CohereDeltaContent {
    /// Content type, "text" when present
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Text
    #[serde(default)]
    pub text: String,
}

/// Tool call fragment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CohereDeltaToolCall {
    /// Call id (start only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Tool type (start only)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<String>,
    /// Function fragment
    #[serde(default)]
    pub function: CohereDeltaFunction,
}

/// Function fragment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CohereDeltaFunction {
    /// Function name (start only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Arguments fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// Payload of `message-end`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CohereEndDelta {
    /// Finish reason
    #[serde(default)]
    pub finish_reason: Option<String>,
    /// Usage totals
    #[serde(default)]
    pub usage: CohereUsage,
}
