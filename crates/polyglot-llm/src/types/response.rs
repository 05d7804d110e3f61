use serde::{Deserialize, Serialize};

use super::message::ContentPart;

/// Why generation stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Turn completed naturally
    #[default]
    EndTurn,
    /// Model wants tool results
    ToolUse,
    /// Length limit hit
    MaxTokens,
    /// A stop sequence matched
    StopSequence,
    /// Upstream reported an error
    Error,
}

/// Token accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens
    pub input_tokens: u32,
    /// Generated tokens
    pub output_tokens: u32,
}

impl Usage {
    /// Sum of input and output
    pub const fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Protocol-neutral completion response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Response identifier
    pub id: String,
    /// Model name reported to the client
    pub model: String,
    /// Ordered content parts
    pub content: Vec<ContentPart>,
    /// Why generation stopped
    pub stop_reason: StopReason,
    /// Stop sequence that matched, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequence: Option<String>,
    /// Token accounting
    pub usage: Usage,
}
