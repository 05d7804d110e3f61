//! Conversion between canonical types and the Ollama wire format

use std::collections::HashMap;

use bytes::Bytes;
use serde_json::{Value, json};

use super::blocks::BlockTracker;
use crate::adapter::{InboundTransformer, OutboundTransformer};
use crate::codec::{JsonLinesDecoder, jsonl};
use crate::protocol::ollama::{
    OllamaFunction, OllamaFunctionCall, OllamaMessage, OllamaOptions, OllamaRequest, OllamaResponse, OllamaTool,
    OllamaToolCall,
};
use crate::types::{
    CompletionRequest, CompletionResponse, ContentPart, Message, Role, StopReason, StreamEvent, ToolDefinition, Usage,
    arguments_from_value, parse_arguments, text_of,
};

// -- Inbound: Ollama wire format -> canonical types --

impl From<OllamaRequest> for CompletionRequest {
    fn from(req: OllamaRequest) -> Self {
        let mut system = Vec::new();
        let mut messages: Vec<Message> = Vec::with_capacity(req.messages.len());

        for msg in req.messages {
            if msg.role == "system" {
                system.push(msg.content);
            } else {
                messages.push(msg.into());
            }
        }

        let options = req.options.unwrap_or_default();

        Self {
            model: req.model,
            messages,
            system_prompt: (!system.is_empty()).then(|| system.join("\n")),
            max_tokens: options.num_predict,
            temperature: options.temperature,
            top_p: options.top_p,
            top_k: options.top_k,
            stop_sequences: options.stop,
            stream: req.stream.unwrap_or(true),
            tools: req.tools.map(|tools| {
                tools
                    .into_iter()
                    .map(|t| ToolDefinition {
                        name: t.function.name,
                        description: t.function.description,
                        parameters: t
                            .function
                            .parameters
                            .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
                    })
                    .collect()
            }),
            tool_choice: None,
            user_id: None,
            extensions: serde_json::Map::new(),
        }
    }
}

impl From<OllamaMessage> for Message {
    fn from(msg: OllamaMessage) -> Self {
        if msg.role == "tool" {
            return Self {
                role: Role::Tool,
                content: vec![ContentPart::ToolResult {
                    tool_call_id: msg.tool_name.unwrap_or_default(),
                    content: msg.content,
                    is_error: None,
                }],
                name: None,
            };
        }

        let mut content = Vec::new();
        if let Some(thinking) = msg.thinking.filter(|t| !t.is_empty()) {
            content.push(ContentPart::Thinking { thinking });
        }
        if !msg.content.is_empty() {
            content.push(ContentPart::Text { text: msg.content });
        }
        // Ollama does not say what format an image is in
        content.extend(msg.images.unwrap_or_default().into_iter().map(|data| ContentPart::Image {
            media_type: "image/jpeg".to_owned(),
            data,
        }));
        content.extend(msg.tool_calls.unwrap_or_default().into_iter().map(tool_call_to_canonical));

        Self {
            role: if msg.role == "assistant" { Role::Assistant } else { Role::User },
            content,
            name: None,
        }
    }
}

/// Ollama calls carry no id; the function name stands in for one
fn tool_call_to_canonical(tc: OllamaToolCall) -> ContentPart {
    ContentPart::ToolCall {
        id: tc.function.name.clone(),
        name: tc.function.name,
        arguments: match tc.function.arguments {
            Value::String(raw) => parse_arguments(&raw),
            other => arguments_from_value(other),
        },
    }
}

/// Map an Ollama `done_reason` onto the canonical enum
pub fn stop_reason_from_wire(reason: Option<&str>, has_tool_calls: bool) -> StopReason {
    match reason {
        Some("length") => StopReason::MaxTokens,
        _ if has_tool_calls => StopReason::ToolUse,
        _ => StopReason::EndTurn,
    }
}

impl From<OllamaResponse> for CompletionResponse {
    fn from(resp: OllamaResponse) -> Self {
        let message: Message = resp.message.into();
        let has_tool_calls = message.has_tool_calls();

        Self {
            id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
            model: resp.model,
            content: message.content,
            stop_reason: stop_reason_from_wire(resp.done_reason.as_deref(), has_tool_calls),
            stop_sequence: None,
            usage: Usage {
                input_tokens: resp.prompt_eval_count.unwrap_or(0),
                output_tokens: resp.eval_count.unwrap_or(0),
            },
        }
    }
}

// -- Outbound: canonical types -> Ollama wire format --

impl From<&CompletionRequest> for OllamaRequest {
    fn from(req: &CompletionRequest) -> Self {
        let call_names: HashMap<&str, &str> = req
            .messages
            .iter()
            .flat_map(|m| &m.content)
            .filter_map(|part| match part {
                ContentPart::ToolCall { id, name, .. } => Some((id.as_str(), name.as_str())),
                _ => None,
            })
            .collect();

        let mut messages = Vec::with_capacity(req.messages.len() + 1);
        if let Some(system) = &req.system_prompt {
            messages.push(OllamaMessage {
                role: "system".to_owned(),
                content: system.clone(),
                ..OllamaMessage::default()
            });
        }
        for msg in &req.messages {
            messages.extend(message_to_wire(msg, &call_names));
        }

        let options = OllamaOptions {
            temperature: req.temperature,
            top_p: req.top_p,
            top_k: req.top_k,
            num_predict: req.max_tokens,
            stop: req.stop_sequences.clone().filter(|s| !s.is_empty()),
        };

        Self {
            model: req.model.clone(),
            messages,
            stream: Some(req.stream),
            options: (!options.is_empty()).then_some(options),
            tools: req.tools.as_ref().filter(|t| !t.is_empty()).map(|tools| {
                tools
                    .iter()
                    .map(|t| OllamaTool {
                        tool_type: "function".to_owned(),
                        function: OllamaFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: Some(t.parameters.clone()),
                        },
                    })
                    .collect()
            }),
        }
    }
}

fn message_to_wire(msg: &Message, call_names: &HashMap<&str, &str>) -> Vec<OllamaMessage> {
    let mut out: Vec<OllamaMessage> = msg
        .content
        .iter()
        .filter_map(|part| match part {
            ContentPart::ToolResult {
                tool_call_id, content, ..
            } => Some(OllamaMessage {
                role: "tool".to_owned(),
                content: content.clone(),
                tool_name: Some(
                    call_names
                        .get(tool_call_id.as_str())
                        .map_or_else(|| tool_call_id.clone(), |name| (*name).to_owned()),
                ),
                ..OllamaMessage::default()
            }),
            _ => None,
        })
        .collect();

    let text = text_of(&msg.content);
    let images: Vec<String> = msg
        .content
        .iter()
        .filter_map(|part| match part {
            ContentPart::Image { data, .. } => Some(data.clone()),
            _ => None,
        })
        .collect();
    let tool_calls: Vec<OllamaToolCall> = msg
        .content
        .iter()
        .filter_map(|part| match part {
            ContentPart::ToolCall { name, arguments, .. } => Some(OllamaToolCall {
                function: OllamaFunctionCall {
                    name: name.clone(),
                    arguments: Value::Object(arguments.clone()),
                },
            }),
            _ => None,
        })
        .collect();

    if out.is_empty() || !text.is_empty() || !images.is_empty() || !tool_calls.is_empty() {
        out.push(OllamaMessage {
            role: match msg.role {
                Role::System => "system",
                Role::Assistant => "assistant",
                Role::User | Role::Tool => "user",
            }
            .to_owned(),
            content: text,
            thinking: None,
            images: (!images.is_empty()).then_some(images),
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            tool_name: None,
        });
    }

    out
}

/// Canonical stop reason as an Ollama `done_reason`
pub const fn stop_reason_to_wire(reason: StopReason) -> &'static str {
    match reason {
        StopReason::MaxTokens => "length",
        StopReason::EndTurn | StopReason::ToolUse | StopReason::StopSequence | StopReason::Error => "stop",
    }
}

fn now() -> String {
    jiff::Timestamp::now().to_string()
}

impl From<&CompletionResponse> for OllamaResponse {
    fn from(resp: &CompletionResponse) -> Self {
        let tool_calls: Vec<OllamaToolCall> = resp
            .content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolCall { name, arguments, .. } => Some(OllamaToolCall {
                    function: OllamaFunctionCall {
                        name: name.clone(),
                        arguments: Value::Object(arguments.clone()),
                    },
                }),
                _ => None,
            })
            .collect();

        Self {
            model: resp.model.clone(),
            created_at: now(),
            message: OllamaMessage {
                role: "assistant".to_owned(),
                content: text_of(&resp.content),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                ..OllamaMessage::default()
            },
            done: true,
            done_reason: Some(stop_reason_to_wire(resp.stop_reason).to_owned()),
            prompt_eval_count: Some(resp.usage.input_tokens),
            eval_count: Some(resp.usage.output_tokens),
        }
    }
}

// -- Streaming: Ollama NDJSON -> canonical events --

/// Ollama NDJSON bytes -> canonical events
///
/// Tool calls arrive whole inside a message fragment.
#[derive(Debug, Default)]
pub struct OllamaInbound {
    decoder: JsonLinesDecoder,
    blocks: BlockTracker,
    started: bool,
    saw_tool_call: bool,
    ended: bool,
}

impl OllamaInbound {
    fn convert_line(&mut self, value: Value) -> Vec<StreamEvent> {
        if self.ended {
            return Vec::new();
        }

        let line = match serde_json::from_value::<OllamaResponse>(value) {
            Ok(line) => line,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unrecognized Ollama stream line");
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        if !self.started {
            self.started = true;
            events.push(StreamEvent::MessageStart {
                id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
                model: line.model.clone(),
                input_tokens: line.prompt_eval_count.unwrap_or(0),
            });
        }

        if let Some(thinking) = line.message.thinking.filter(|t| !t.is_empty()) {
            events.extend(self.blocks.thinking(thinking));
        }
        if !line.message.content.is_empty() {
            events.extend(self.blocks.text(line.message.content));
        }
        for call in line.message.tool_calls.unwrap_or_default() {
            self.saw_tool_call = true;
            let arguments = match call.function.arguments {
                Value::String(raw) => raw,
                Value::Null => "{}".to_owned(),
                other => other.to_string(),
            };
            let (index, opened) = self.blocks.open_tool(call.function.name.clone(), call.function.name);
            events.extend(opened);
            events.push(StreamEvent::ToolCallDelta {
                index,
                arguments_chunk: arguments,
            });
            events.extend(self.blocks.close(index));
        }

        if line.done {
            self.ended = true;
            events.extend(self.blocks.close_all());
            events.push(StreamEvent::MessageEnd {
                stop_reason: stop_reason_from_wire(line.done_reason.as_deref(), self.saw_tool_call),
                output_tokens: line.eval_count.unwrap_or(0),
            });
        }

        events
    }
}

impl InboundTransformer for OllamaInbound {
    fn transform(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.decoder
            .feed(chunk)
            .into_iter()
            .flat_map(|value| self.convert_line(value))
            .collect()
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = self
            .decoder
            .finish()
            .map(|value| self.convert_line(value))
            .unwrap_or_default();

        if self.started && !self.ended {
            self.ended = true;
            events.extend(self.blocks.close_all());
            events.push(StreamEvent::MessageEnd {
                stop_reason: stop_reason_from_wire(None, self.saw_tool_call),
                output_tokens: 0,
            });
        }

        events
    }
}

// -- Streaming: canonical events -> Ollama NDJSON --

/// Canonical events -> Ollama NDJSON lines
#[derive(Debug)]
pub struct OllamaOutbound {
    model: String,
    input_tokens: u32,
    /// Open tool calls by canonical index: (name, accumulated JSON)
    tools: HashMap<u32, (String, String)>,
    tool_order: Vec<u32>,
    started: bool,
    finished: bool,
}

impl OllamaOutbound {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_owned(),
            input_tokens: 0,
            tools: HashMap::new(),
            tool_order: Vec::new(),
            started: false,
            finished: false,
        }
    }

    fn line(&self, message: OllamaMessage) -> Bytes {
        jsonl::encode(&OllamaResponse {
            model: self.model.clone(),
            created_at: now(),
            message,
            done: false,
            done_reason: None,
            prompt_eval_count: None,
            eval_count: None,
        })
    }

    fn flush_tool(&mut self, index: u32) -> Option<Bytes> {
        let (name, arguments) = self.tools.remove(&index)?;
        self.tool_order.retain(|open| *open != index);

        Some(self.line(OllamaMessage {
            role: "assistant".to_owned(),
            tool_calls: Some(vec![OllamaToolCall {
                function: OllamaFunctionCall {
                    name,
                    arguments: Value::Object(parse_arguments(&arguments)),
                },
            }]),
            ..OllamaMessage::default()
        }))
    }

    fn end(&mut self, stop_reason: StopReason, output_tokens: u32, out: &mut Vec<Bytes>) {
        for index in std::mem::take(&mut self.tool_order) {
            out.extend(self.flush_tool(index));
        }
        out.push(jsonl::encode(&OllamaResponse {
            model: self.model.clone(),
            created_at: now(),
            message: OllamaMessage {
                role: "assistant".to_owned(),
                ..OllamaMessage::default()
            },
            done: true,
            done_reason: Some(stop_reason_to_wire(stop_reason).to_owned()),
            prompt_eval_count: Some(self.input_tokens),
            eval_count: Some(output_tokens),
        }));
        self.finished = true;
    }
}

impl OutboundTransformer for OllamaOutbound {
    fn transform(&mut self, event: &StreamEvent) -> Vec<Bytes> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }

        match event {
            StreamEvent::MessageStart { input_tokens, .. } => {
                self.started = true;
                self.input_tokens = *input_tokens;
            }
            StreamEvent::TextDelta { text, .. } => {
                self.started = true;
                out.push(self.line(OllamaMessage {
                    role: "assistant".to_owned(),
                    content: text.clone(),
                    ..OllamaMessage::default()
                }));
            }
            StreamEvent::ThinkingDelta { thinking, .. } => {
                self.started = true;
                out.push(self.line(OllamaMessage {
                    role: "assistant".to_owned(),
                    thinking: Some(thinking.clone()),
                    ..OllamaMessage::default()
                }));
            }
            StreamEvent::ToolCallStart { index, name, .. } => {
                self.started = true;
                self.tools.insert(*index, (name.clone(), String::new()));
                self.tool_order.push(*index);
            }
            StreamEvent::ToolCallDelta { index, arguments_chunk } => {
                if let Some((_, arguments)) = self.tools.get_mut(index) {
                    arguments.push_str(arguments_chunk);
                }
            }
            StreamEvent::ToolCallEnd { index } => out.extend(self.flush_tool(*index)),
            StreamEvent::ContentBlockEnd { .. } => {}
            StreamEvent::MessageEnd {
                stop_reason,
                output_tokens,
            } => self.end(*stop_reason, *output_tokens, &mut out),
            StreamEvent::Error { message, .. } => {
                out.push(jsonl::encode(&json!({ "error": message })));
                self.finished = true;
            }
        }

        out
    }

    fn finish(&mut self) -> Vec<Bytes> {
        let mut out = Vec::new();
        if self.started && !self.finished {
            self.end(StopReason::EndTurn, 0, &mut out);
        }
        out
    }
}
