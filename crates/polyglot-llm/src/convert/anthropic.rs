//! Conversion between canonical types and the Anthropic wire format

use bytes::Bytes;
use serde_json::Value;

use crate::adapter::{InboundTransformer, OutboundTransformer};
use crate::codec::{SseDecoder, sse};
use crate::protocol::anthropic::{
    AnthropicContent, AnthropicContentBlock, AnthropicDeltaUsage, AnthropicErrorDetail, AnthropicImageSource,
    AnthropicMessage, AnthropicMessageDelta, AnthropicMetadata, AnthropicRequest, AnthropicResponse,
    AnthropicStreamContentBlock, AnthropicStreamDelta, AnthropicStreamEvent, AnthropicStreamMessage, AnthropicSystem,
    AnthropicTool, AnthropicToolChoice, AnthropicToolResultContent, AnthropicUsage,
};
use crate::types::{
    CompletionRequest, CompletionResponse, ContentPart, Message, Role, StopReason, StreamEvent, ToolChoice,
    ToolDefinition, Usage, arguments_from_value,
};

/// Anthropic requires `max_tokens`; used when the client sent none
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

// -- Inbound: Anthropic wire format -> canonical types --

impl From<AnthropicRequest> for CompletionRequest {
    fn from(req: AnthropicRequest) -> Self {
        let system_prompt = req.system.map(|system| match system {
            AnthropicSystem::Text(text) => text,
            AnthropicSystem::Blocks(blocks) => blocks
                .into_iter()
                .filter(|b| b.block_type.is_empty() || b.block_type == "text")
                .map(|b| b.text)
                .collect::<Vec<_>>()
                .join("\n"),
        });

        let has_tools = req.tools.as_ref().is_some_and(|t| !t.is_empty());

        Self {
            model: req.model,
            messages: req.messages.into_iter().map(Into::into).collect(),
            system_prompt,
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            top_p: req.top_p,
            top_k: req.top_k,
            stop_sequences: req.stop_sequences,
            stream: req.stream.unwrap_or(false),
            tools: req.tools.map(|tools| tools.into_iter().map(Into::into).collect()),
            tool_choice: req.tool_choice.filter(|_| has_tools).map(|tc| tool_choice_from_wire(&tc)),
            user_id: req.metadata.and_then(|m| m.user_id),
            extensions: serde_json::Map::new(),
        }
    }
}

impl From<AnthropicMessage> for Message {
    fn from(msg: AnthropicMessage) -> Self {
        let content: Vec<ContentPart> = match msg.content {
            AnthropicContent::Text(text) => vec![ContentPart::Text { text }],
            AnthropicContent::Blocks(blocks) => blocks.into_iter().filter_map(block_to_part).collect(),
        };

        let role = if content.iter().any(|p| matches!(p, ContentPart::ToolResult { .. })) {
            Role::Tool
        } else if msg.role == "assistant" {
            Role::Assistant
        } else {
            Role::User
        };

        Self {
            role,
            content,
            name: None,
        }
    }
}

fn block_to_part(block: AnthropicContentBlock) -> Option<ContentPart> {
    Some(match block {
        AnthropicContentBlock::Text { text } => ContentPart::Text { text },
        AnthropicContentBlock::Image { source } => ContentPart::Image {
            media_type: source.media_type.unwrap_or_else(|| "image/jpeg".to_owned()),
            data: source.data,
        },
        AnthropicContentBlock::ToolUse { id, name, input } => ContentPart::ToolCall {
            id,
            name,
            arguments: arguments_from_value(input),
        },
        AnthropicContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => ContentPart::ToolResult {
            tool_call_id: tool_use_id,
            content: match content {
                Some(AnthropicToolResultContent::Text(text)) => text,
                Some(AnthropicToolResultContent::Blocks(blocks)) => blocks
                    .into_iter()
                    .filter_map(|b| match b {
                        AnthropicContentBlock::Text { text } => Some(text),
                        _ => None,
                    })
                    .collect(),
                None => String::new(),
            },
            is_error,
        },
        AnthropicContentBlock::Thinking { thinking, .. } => ContentPart::Thinking { thinking },
        AnthropicContentBlock::Unsupported => return None,
    })
}

impl From<AnthropicTool> for ToolDefinition {
    fn from(tool: AnthropicTool) -> Self {
        Self {
            name: tool.name,
            description: tool.description,
            parameters: tool.input_schema,
        }
    }
}

fn tool_choice_from_wire(tc: &AnthropicToolChoice) -> ToolChoice {
    match tc.choice_type.as_str() {
        "any" => ToolChoice::Required,
        "none" => ToolChoice::None,
        "tool" => tc
            .name
            .clone()
            .map_or(ToolChoice::Required, |name| ToolChoice::Specific { name }),
        _ => ToolChoice::Auto,
    }
}

/// Map an Anthropic `stop_reason` onto the canonical enum
pub fn stop_reason_from_wire(reason: Option<&str>) -> StopReason {
    match reason {
        Some("max_tokens") => StopReason::MaxTokens,
        Some("tool_use") => StopReason::ToolUse,
        Some("stop_sequence") => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    }
}

impl From<AnthropicResponse> for CompletionResponse {
    fn from(resp: AnthropicResponse) -> Self {
        Self {
            id: resp.id,
            model: resp.model,
            content: resp.content.into_iter().filter_map(block_to_part).collect(),
            stop_reason: stop_reason_from_wire(resp.stop_reason.as_deref()),
            stop_sequence: resp.stop_sequence,
            usage: Usage {
                input_tokens: resp.usage.input_tokens,
                output_tokens: resp.usage.output_tokens,
            },
        }
    }
}

// -- Outbound: canonical types -> Anthropic wire format --

impl From<&CompletionRequest> for AnthropicRequest {
    fn from(req: &CompletionRequest) -> Self {
        // System-role messages have no place in `messages`
        let stray_system: Vec<String> = req
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(Message::text_content)
            .collect();

        let system = req
            .system_prompt
            .iter()
            .cloned()
            .chain(stray_system)
            .reduce(|a, b| format!("{a}\n{b}"))
            .map(AnthropicSystem::Text);

        let tools: Option<Vec<AnthropicTool>> = req.tools.as_ref().filter(|t| !t.is_empty()).map(|tools| {
            tools
                .iter()
                .map(|t| AnthropicTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.parameters.clone(),
                })
                .collect()
        });

        let tool_choice = tools
            .as_ref()
            .map(|_| tool_choice_to_wire(req.tool_choice.as_ref().unwrap_or(&ToolChoice::Auto)));

        Self {
            model: req.model.clone(),
            anthropic_version: None,
            max_tokens: Some(req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
            system,
            messages: req
                .messages
                .iter()
                .filter(|m| m.role != Role::System)
                .map(message_to_wire)
                .collect(),
            temperature: req.temperature,
            top_p: req.top_p,
            top_k: req.top_k,
            stop_sequences: req.stop_sequences.clone(),
            stream: Some(req.stream),
            tools,
            tool_choice,
            metadata: req.user_id.clone().map(|user_id| AnthropicMetadata { user_id: Some(user_id) }),
        }
    }
}

fn message_to_wire(msg: &Message) -> AnthropicMessage {
    let role = match msg.role {
        Role::Assistant => "assistant",
        Role::User | Role::Tool | Role::System => "user",
    };

    let blocks = msg
        .content
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => AnthropicContentBlock::Text { text: text.clone() },
            ContentPart::Image { media_type, data } => AnthropicContentBlock::Image {
                source: AnthropicImageSource {
                    source_type: "base64".to_owned(),
                    media_type: Some(media_type.clone()),
                    data: data.clone(),
                },
            },
            ContentPart::ToolCall { id, name, arguments } => AnthropicContentBlock::ToolUse {
                id: id.clone(),
                name: name.clone(),
                input: Value::Object(arguments.clone()),
            },
            ContentPart::ToolResult {
                tool_call_id,
                content,
                is_error,
            } => AnthropicContentBlock::ToolResult {
                tool_use_id: tool_call_id.clone(),
                content: Some(AnthropicToolResultContent::Text(content.clone())),
                is_error: *is_error,
            },
            ContentPart::Thinking { thinking } => AnthropicContentBlock::Thinking {
                thinking: thinking.clone(),
                signature: None,
            },
        })
        .collect();

    AnthropicMessage {
        role: role.to_owned(),
        content: AnthropicContent::Blocks(blocks),
    }
}

fn tool_choice_to_wire(choice: &ToolChoice) -> AnthropicToolChoice {
    let (choice_type, name) = match choice {
        ToolChoice::Auto => ("auto", None),
        ToolChoice::None => ("none", None),
        ToolChoice::Required => ("any", None),
        ToolChoice::Specific { name } => ("tool", Some(name.clone())),
    };

    AnthropicToolChoice {
        choice_type: choice_type.to_owned(),
        name,
    }
}

/// Canonical stop reason as an Anthropic `stop_reason`
pub const fn stop_reason_to_wire(reason: StopReason) -> &'static str {
    match reason {
        StopReason::EndTurn | StopReason::Error => "end_turn",
        StopReason::ToolUse => "tool_use",
        StopReason::MaxTokens => "max_tokens",
        StopReason::StopSequence => "stop_sequence",
    }
}

impl From<&CompletionResponse> for AnthropicResponse {
    fn from(resp: &CompletionResponse) -> Self {
        let content = resp
            .content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(AnthropicContentBlock::Text { text: text.clone() }),
                ContentPart::ToolCall { id, name, arguments } => Some(AnthropicContentBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: Value::Object(arguments.clone()),
                }),
                ContentPart::Thinking { thinking } => Some(AnthropicContentBlock::Thinking {
                    thinking: thinking.clone(),
                    signature: None,
                }),
                ContentPart::Image { .. } | ContentPart::ToolResult { .. } => None,
            })
            .collect();

        Self {
            id: resp.id.clone(),
            response_type: "message".to_owned(),
            role: "assistant".to_owned(),
            content,
            model: resp.model.clone(),
            stop_reason: Some(stop_reason_to_wire(resp.stop_reason).to_owned()),
            stop_sequence: resp.stop_sequence.clone(),
            usage: AnthropicUsage {
                input_tokens: resp.usage.input_tokens,
                output_tokens: resp.usage.output_tokens,
            },
        }
    }
}

// -- Streaming: Anthropic events -> canonical events --

/// Maps Anthropic stream events onto canonical events
///
/// Tracks open blocks in opening order, flagging tool blocks so their
/// `content_block_stop` becomes `ToolCallEnd` rather than `ContentBlockEnd`.
/// Blocks still open at `message_delta` are closed before `MessageEnd`.
#[derive(Debug, Default)]
pub struct AnthropicEventMapper {
    open: Vec<(u32, bool)>,
}

impl AnthropicEventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    fn track(&mut self, index: u32, is_tool: bool) {
        if !self.open.iter().any(|(i, _)| *i == index) {
            self.open.push((index, is_tool));
        }
    }

    const fn end_event(index: u32, is_tool: bool) -> StreamEvent {
        if is_tool {
            StreamEvent::ToolCallEnd { index }
        } else {
            StreamEvent::ContentBlockEnd { index }
        }
    }

    /// Convert a single Anthropic event
    pub fn convert_event(&mut self, event: AnthropicStreamEvent) -> Vec<StreamEvent> {
        match event {
            AnthropicStreamEvent::MessageStart { message } => vec![StreamEvent::MessageStart {
                id: message.id,
                model: message.model,
                input_tokens: message.usage.input_tokens,
            }],
            AnthropicStreamEvent::ContentBlockStart { index, content_block } => match content_block {
                AnthropicStreamContentBlock::ToolUse { id, name, .. } => {
                    self.track(index, true);
                    vec![StreamEvent::ToolCallStart { index, id, name }]
                }
                AnthropicStreamContentBlock::Text { text } => {
                    self.track(index, false);
                    if text.is_empty() {
                        Vec::new()
                    } else {
                        vec![StreamEvent::TextDelta { index, text }]
                    }
                }
                AnthropicStreamContentBlock::Thinking { thinking } => {
                    self.track(index, false);
                    if thinking.is_empty() {
                        Vec::new()
                    } else {
                        vec![StreamEvent::ThinkingDelta { index, thinking }]
                    }
                }
                AnthropicStreamContentBlock::Unsupported => {
                    self.track(index, false);
                    Vec::new()
                }
            },
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                AnthropicStreamDelta::TextDelta { text } => {
                    self.track(index, false);
                    vec![StreamEvent::TextDelta { index, text }]
                }
                AnthropicStreamDelta::InputJsonDelta { partial_json } => {
                    self.track(index, true);
                    vec![StreamEvent::ToolCallDelta {
                        index,
                        arguments_chunk: partial_json,
                    }]
                }
                AnthropicStreamDelta::ThinkingDelta { thinking } => {
                    self.track(index, false);
                    vec![StreamEvent::ThinkingDelta { index, thinking }]
                }
                AnthropicStreamDelta::Unsupported => Vec::new(),
            },
            AnthropicStreamEvent::ContentBlockStop { index } => {
                let is_tool = self
                    .open
                    .iter()
                    .position(|(i, _)| *i == index)
                    .is_some_and(|pos| self.open.remove(pos).1);
                vec![Self::end_event(index, is_tool)]
            }
            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                let mut events: Vec<StreamEvent> = self
                    .open
                    .drain(..)
                    .map(|(index, is_tool)| Self::end_event(index, is_tool))
                    .collect();
                events.push(StreamEvent::MessageEnd {
                    stop_reason: stop_reason_from_wire(delta.stop_reason.as_deref()),
                    output_tokens: usage.map_or(0, |u| u.output_tokens),
                });
                events
            }
            AnthropicStreamEvent::Error { error } => vec![StreamEvent::Error {
                message: error.message,
                code: None,
            }],
            AnthropicStreamEvent::MessageStop | AnthropicStreamEvent::Ping => Vec::new(),
        }
    }

    /// Parse one JSON event and convert it, skipping unknown shapes
    pub fn convert_value(&mut self, value: Value) -> Vec<StreamEvent> {
        match serde_json::from_value::<AnthropicStreamEvent>(value) {
            Ok(event) => self.convert_event(event),
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparseable Anthropic stream event");
                Vec::new()
            }
        }
    }
}

/// Anthropic SSE bytes -> canonical events
#[derive(Debug, Default)]
pub struct AnthropicInbound {
    decoder: SseDecoder,
    mapper: AnthropicEventMapper,
}

impl AnthropicInbound {
    fn convert_data(&mut self, data: &str) -> Vec<StreamEvent> {
        match serde_json::from_str::<Value>(data) {
            Ok(value) => self.mapper.convert_value(value),
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparseable Anthropic SSE data");
                Vec::new()
            }
        }
    }
}

impl InboundTransformer for AnthropicInbound {
    fn transform(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.decoder
            .feed(chunk)
            .into_iter()
            .flat_map(|frame| self.convert_data(&frame.data))
            .collect()
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        self.decoder
            .finish()
            .map(|frame| self.convert_data(&frame.data))
            .unwrap_or_default()
    }
}

// -- Streaming: canonical events -> Anthropic SSE --

/// Canonical events -> Anthropic SSE lifecycle
///
/// `message_start`, `ping`, one start/delta/stop triple per block,
/// `message_delta` with the stop reason and usage, then `message_stop`.
#[derive(Debug)]
pub struct AnthropicOutbound {
    model: String,
    message_id: String,
    started: bool,
    finished: bool,
    open: Vec<u32>,
}

impl AnthropicOutbound {
    pub fn new(model: &str, message_id: &str) -> Self {
        Self {
            model: model.to_owned(),
            message_id: message_id.to_owned(),
            started: false,
            finished: false,
            open: Vec::new(),
        }
    }

    fn start(&mut self, input_tokens: u32, out: &mut Vec<Bytes>) {
        if self.started {
            return;
        }
        self.started = true;

        out.push(frame(&AnthropicStreamEvent::MessageStart {
            message: AnthropicStreamMessage {
                id: self.message_id.clone(),
                message_type: "message".to_owned(),
                role: "assistant".to_owned(),
                content: Vec::new(),
                model: self.model.clone(),
                stop_reason: None,
                stop_sequence: None,
                usage: AnthropicUsage {
                    input_tokens,
                    output_tokens: 1,
                },
            },
        }));
        out.push(frame(&AnthropicStreamEvent::Ping));
    }

    fn open_block(&mut self, index: u32, block: AnthropicStreamContentBlock, out: &mut Vec<Bytes>) {
        if self.open.contains(&index) {
            return;
        }
        self.open.push(index);
        out.push(frame(&AnthropicStreamEvent::ContentBlockStart {
            index,
            content_block: block,
        }));
    }

    fn close_block(&mut self, index: u32, out: &mut Vec<Bytes>) {
        if let Some(position) = self.open.iter().position(|open| *open == index) {
            self.open.remove(position);
            out.push(frame(&AnthropicStreamEvent::ContentBlockStop { index }));
        }
    }

    fn end(&mut self, stop_reason: StopReason, output_tokens: u32, out: &mut Vec<Bytes>) {
        for index in std::mem::take(&mut self.open) {
            out.push(frame(&AnthropicStreamEvent::ContentBlockStop { index }));
        }

        out.push(frame(&AnthropicStreamEvent::MessageDelta {
            delta: AnthropicMessageDelta {
                stop_reason: Some(stop_reason_to_wire(stop_reason).to_owned()),
                stop_sequence: None,
            },
            usage: Some(AnthropicDeltaUsage { output_tokens }),
        }));
        out.push(frame(&AnthropicStreamEvent::MessageStop));
        self.finished = true;
    }
}

impl OutboundTransformer for AnthropicOutbound {
    fn transform(&mut self, event: &StreamEvent) -> Vec<Bytes> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }

        match event {
            StreamEvent::MessageStart { input_tokens, .. } => self.start(*input_tokens, &mut out),
            StreamEvent::TextDelta { index, text } => {
                self.start(0, &mut out);
                self.open_block(*index, AnthropicStreamContentBlock::Text { text: String::new() }, &mut out);
                out.push(frame(&AnthropicStreamEvent::ContentBlockDelta {
                    index: *index,
                    delta: AnthropicStreamDelta::TextDelta { text: text.clone() },
                }));
            }
            StreamEvent::ThinkingDelta { index, thinking } => {
                self.start(0, &mut out);
                self.open_block(
                    *index,
                    AnthropicStreamContentBlock::Thinking {
                        thinking: String::new(),
                    },
                    &mut out,
                );
                out.push(frame(&AnthropicStreamEvent::ContentBlockDelta {
                    index: *index,
                    delta: AnthropicStreamDelta::ThinkingDelta {
                        thinking: thinking.clone(),
                    },
                }));
            }
            StreamEvent::ToolCallStart { index, id, name } => {
                self.start(0, &mut out);
                self.open_block(
                    *index,
                    AnthropicStreamContentBlock::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                        input: Value::Object(serde_json::Map::new()),
                    },
                    &mut out,
                );
            }
            StreamEvent::ToolCallDelta { index, arguments_chunk } => {
                out.push(frame(&AnthropicStreamEvent::ContentBlockDelta {
                    index: *index,
                    delta: AnthropicStreamDelta::InputJsonDelta {
                        partial_json: arguments_chunk.clone(),
                    },
                }));
            }
            StreamEvent::ToolCallEnd { index } | StreamEvent::ContentBlockEnd { index } => {
                self.close_block(*index, &mut out);
            }
            StreamEvent::MessageEnd {
                stop_reason,
                output_tokens,
            } => {
                self.start(0, &mut out);
                self.end(*stop_reason, *output_tokens, &mut out);
            }
            StreamEvent::Error { message, .. } => {
                out.push(frame(&AnthropicStreamEvent::Error {
                    error: AnthropicErrorDetail {
                        error_type: "api_error".to_owned(),
                        message: message.clone(),
                    },
                }));
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

fn frame(event: &AnthropicStreamEvent) -> Bytes {
    sse::encode(Some(event.event_name()), event)
}
