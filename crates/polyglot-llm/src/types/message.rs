use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parsed tool-call arguments
///
/// Always a JSON object. Wire formats that carry arguments as a string are
/// decoded through [`parse_arguments`] before they reach this type.
pub type Arguments = Map<String, Value>;

/// Role of a message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction
    System,
    /// User message
    User,
    /// Assistant response
    Assistant,
    /// Tool result fed back to the model
    Tool,
}

/// Message in a conversation
///
/// `content` keeps source order; text and tool calls may share a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author
    pub role: Role,
    /// Ordered content parts
    pub content: Vec<ContentPart>,
    /// Optional participant name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    /// Message holding a single text part
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentPart::Text { text: text.into() }],
            name: None,
        }
    }

    /// Concatenated text parts, ignoring everything else
    pub fn text_content(&self) -> String {
        text_of(&self.content)
    }

    /// Whether any part is a tool call
    pub fn has_tool_calls(&self) -> bool {
        self.content.iter().any(|p| matches!(p, ContentPart::ToolCall { .. }))
    }
}

/// Individual part within a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text content block
    Text {
        /// The text string
        text: String,
    },
    /// Inline image
    Image {
        /// MIME type (e.g. `image/png`)
        media_type: String,
        /// Base64-encoded bytes
        data: String,
    },
    /// Tool invocation requested by the assistant
    ToolCall {
        /// Call identifier, echoed back by the matching result
        id: String,
        /// Tool name
        name: String,
        /// Parsed arguments
        arguments: Arguments,
    },
    /// Outcome of a tool invocation
    ToolResult {
        /// Identifier of the call this answers
        tool_call_id: String,
        /// Result text
        content: String,
        /// Whether the tool failed
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    /// Reasoning trace
    Thinking {
        /// Reasoning text
        thinking: String,
    },
}

/// Concatenate the text parts of a content list
pub fn text_of(parts: &[ContentPart]) -> String {
    parts
        .iter()
        .filter_map(|p| match p {
            ContentPart::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

/// Decode tool-call arguments sent as a JSON string
///
/// Anything that is not a JSON object decodes to an empty object.
pub fn parse_arguments(raw: &str) -> Arguments {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        _ => Arguments::new(),
    }
}

/// Coerce an already-decoded value into an arguments object
pub fn arguments_from_value(value: Value) -> Arguments {
    match value {
        Value::Object(map) => map,
        Value::String(raw) => parse_arguments(&raw),
        _ => Arguments::new(),
    }
}
