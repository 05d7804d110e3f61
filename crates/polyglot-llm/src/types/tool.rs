use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool the model may call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the arguments, with lower-case type names
    pub parameters: Value,
}

/// Tool selection policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    /// Model decides
    Auto,
    /// No tool calls
    None,
    /// At least one tool call
    Required,
    /// Must call the named tool
    Specific {
        /// Tool name
        name: String,
    },
}
