use serde::{Deserialize, Serialize};

use super::response::StopReason;

/// Event in a canonical response stream
///
/// Block indices are unique within one response. Every index is opened
/// (explicitly or by its first delta) before it is referenced and closed
/// before `MessageEnd`. Tool blocks close with `ToolCallEnd`; every other
/// block closes with `ContentBlockEnd`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Response started
    MessageStart {
        /// Response identifier
        id: String,
        /// Model name
        model: String,
        /// Prompt tokens, when known up front
        input_tokens: u32,
    },
    /// Text fragment
    TextDelta {
        /// Block index
        index: u32,
        /// Text fragment
        text: String,
    },
    /// Reasoning fragment
    ThinkingDelta {
        /// Block index
        index: u32,
        /// Reasoning fragment
        thinking: String,
    },
    /// Tool call block opened
    ToolCallStart {
        /// Block index
        index: u32,
        /// Call identifier
        id: String,
        /// Tool name
        name: String,
    },
    /// Fragment of the arguments JSON
    ToolCallDelta {
        /// Block index
        index: u32,
        /// Partial JSON text
        arguments_chunk: String,
    },
    /// Tool call block closed
    ToolCallEnd {
        /// Block index
        index: u32,
    },
    /// Text or thinking block closed
    ContentBlockEnd {
        /// Block index
        index: u32,
    },
    /// Response finished
    MessageEnd {
        /// Why generation stopped
        stop_reason: StopReason,
        /// Generated tokens
        output_tokens: u32,
    },
    /// Upstream failure surfaced mid-stream
    Error {
        /// Error description
        message: String,
        /// HTTP-like status code, when one applies
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<u16>,
    },
}

impl StreamEvent {
    /// Block index the event refers to, if any
    pub const fn index(&self) -> Option<u32> {
        match self {
            Self::TextDelta { index, .. }
            | Self::ThinkingDelta { index, .. }
            | Self::ToolCallStart { index, .. }
            | Self::ToolCallDelta { index, .. }
            | Self::ToolCallEnd { index }
            | Self::ContentBlockEnd { index } => Some(*index),
            Self::MessageStart { .. } | Self::MessageEnd { .. } | Self::Error { .. } => None,
        }
    }
}
