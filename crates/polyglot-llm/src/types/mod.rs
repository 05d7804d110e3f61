//! Canonical types for LLM request/response representation
//!
//! These types are protocol-agnostic. Every adapter translates its wire
//! format into and out of them, so N protocols need N translators instead
//! of one per pair.

pub mod message;
pub mod request;
pub mod response;
pub mod stream;
pub mod tool;

pub use message::{Arguments, ContentPart, Message, Role, arguments_from_value, parse_arguments, text_of};
pub use request::CompletionRequest;
pub use response::{CompletionResponse, StopReason, Usage};
pub use stream::StreamEvent;
pub use tool::{ToolChoice, ToolDefinition};
