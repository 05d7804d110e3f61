//! Conversion between canonical types and the Cohere v2 wire format

use std::collections::HashMap;

use bytes::Bytes;
use serde_json::{Value, json};

use super::blocks::BlockTracker;
use crate::adapter::{InboundTransformer, OutboundTransformer};
use crate::codec::{SseDecoder, sse};
use crate::protocol::cohere::{
    CohereBilledUnits, CohereContent, CohereContentPart, CohereDeltaContent, CohereDeltaFunction, CohereDeltaMessage,
    CohereDeltaToolCall, CohereEndDelta, CohereFunction, CohereFunctionCall, CohereMessage, CohereRequest,
    CohereResponse, CohereResponseMessage, CohereStreamDelta, CohereStreamEvent, CohereTool, CohereToolCall,
    CohereUsage,
};
use crate::types::{
    CompletionRequest, CompletionResponse, ContentPart, Message, Role, StopReason, StreamEvent, ToolChoice,
    ToolDefinition, Usage, parse_arguments, text_of,
};

// -- Inbound: Cohere wire format -> canonical types --

impl From<CohereRequest> for CompletionRequest {
    fn from(req: CohereRequest) -> Self {
        let mut system = Vec::new();
        let mut messages: Vec<Message> = Vec::with_capacity(req.messages.len());

        for msg in req.messages {
            if msg.role == "system" {
                system.push(content_text(msg.content));
            } else {
                messages.push(msg.into());
            }
        }

        Self {
            model: req.model,
            messages,
            system_prompt: (!system.is_empty()).then(|| system.join("\n")),
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            top_p: req.p,
            top_k: req.k,
            stop_sequences: req.stop_sequences,
            stream: req.stream,
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
            tool_choice: req.tool_choice.as_deref().and_then(|choice| match choice {
                "REQUIRED" => Some(ToolChoice::Required),
                "NONE" => Some(ToolChoice::None),
                _ => None,
            }),
            user_id: None,
            extensions: serde_json::Map::new(),
        }
    }
}

impl From<CohereMessage> for Message {
    fn from(msg: CohereMessage) -> Self {
        match msg.role.as_str() {
            "tool" => Self {
                role: Role::Tool,
                content: vec![ContentPart::ToolResult {
                    tool_call_id: msg.tool_call_id.unwrap_or_default(),
                    content: content_text(msg.content),
                    is_error: None,
                }],
                name: None,
            },
            role => {
                let mut content = Vec::new();
                if let Some(plan) = msg.tool_plan.filter(|p| !p.is_empty()) {
                    content.push(ContentPart::Thinking { thinking: plan });
                }
                let text = content_text(msg.content);
                if !text.is_empty() {
                    content.push(ContentPart::Text { text });
                }
                content.extend(msg.tool_calls.unwrap_or_default().into_iter().map(tool_call_to_canonical));

                Self {
                    role: if role == "assistant" { Role::Assistant } else { Role::User },
                    content,
                    name: None,
                }
            }
        }
    }
}

/// Text of a message; tool output documents are rendered as JSON
fn content_text(content: Option<CohereContent>) -> String {
    match content {
        Some(CohereContent::Text(text)) => text,
        Some(CohereContent::Parts(parts)) => parts
            .into_iter()
            .filter_map(|part| match part {
                CohereContentPart::Text { text } => Some(text),
                CohereContentPart::Document { document } => Some(document.to_string()),
                CohereContentPart::Unsupported => None,
            })
            .collect(),
        None => String::new(),
    }
}

fn tool_call_to_canonical(tc: CohereToolCall) -> ContentPart {
    ContentPart::ToolCall {
        id: tc.id,
        name: tc.function.name,
        arguments: parse_arguments(&tc.function.arguments),
    }
}

/// Map a Cohere `finish_reason` onto the canonical enum
pub fn stop_reason_from_wire(reason: Option<&str>) -> StopReason {
    match reason {
        Some("MAX_TOKENS") => StopReason::MaxTokens,
        Some("TOOL_CALL") => StopReason::ToolUse,
        Some("STOP_SEQUENCE") => StopReason::StopSequence,
        Some("ERROR") => StopReason::Error,
        _ => StopReason::EndTurn,
    }
}

impl From<CohereResponse> for CompletionResponse {
    fn from(resp: CohereResponse) -> Self {
        let mut content: Vec<ContentPart> = resp
            .message
            .content
            .into_iter()
            .filter_map(|part| match part {
                CohereContentPart::Text { text } => Some(ContentPart::Text { text }),
                _ => None,
            })
            .collect();
        content.extend(
            resp.message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(tool_call_to_canonical),
        );

        Self {
            id: resp.id,
            model: String::new(),
            content,
            stop_reason: stop_reason_from_wire(resp.finish_reason.as_deref()),
            stop_sequence: None,
            usage: Usage {
                input_tokens: resp.usage.billed_units.input_tokens,
                output_tokens: resp.usage.billed_units.output_tokens,
            },
        }
    }
}

// -- Outbound: canonical types -> Cohere wire format --

impl From<&CompletionRequest> for CohereRequest {
    fn from(req: &CompletionRequest) -> Self {
        let mut messages = Vec::with_capacity(req.messages.len() + 1);

        if let Some(system) = &req.system_prompt {
            messages.push(text_message("system", system.clone()));
        }

        for msg in &req.messages {
            match msg.role {
                Role::System => messages.push(text_message("system", msg.text_content())),
                Role::Assistant => {
                    let tool_calls: Vec<CohereToolCall> = msg
                        .content
                        .iter()
                        .filter_map(|part| match part {
                            ContentPart::ToolCall { id, name, arguments } => Some(CohereToolCall {
                                id: id.clone(),
                                tool_type: "function".to_owned(),
                                function: CohereFunctionCall {
                                    name: name.clone(),
                                    arguments: Value::Object(arguments.clone()).to_string(),
                                },
                            }),
                            _ => None,
                        })
                        .collect();
                    let plan: String = msg
                        .content
                        .iter()
                        .filter_map(|part| match part {
                            ContentPart::Thinking { thinking } => Some(thinking.as_str()),
                            _ => None,
                        })
                        .collect();
                    let text = msg.text_content();

                    messages.push(CohereMessage {
                        role: "assistant".to_owned(),
                        content: (!text.is_empty()).then_some(CohereContent::Text(text)),
                        tool_plan: (!plan.is_empty() && !tool_calls.is_empty()).then_some(plan),
                        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                        tool_call_id: None,
                    });
                }
                Role::User | Role::Tool => {
                    let mut results = false;
                    for part in &msg.content {
                        if let ContentPart::ToolResult {
                            tool_call_id, content, ..
                        } = part
                        {
                            results = true;
                            messages.push(CohereMessage {
                                role: "tool".to_owned(),
                                content: Some(CohereContent::Text(content.clone())),
                                tool_calls: None,
                                tool_plan: None,
                                tool_call_id: Some(tool_call_id.clone()),
                            });
                        }
                    }
                    let text = text_of(&msg.content);
                    if !results || !text.is_empty() {
                        messages.push(text_message("user", text));
                    }
                }
            }
        }

        Self {
            model: req.model.clone(),
            messages,
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            p: req.top_p,
            k: req.top_k,
            stop_sequences: req.stop_sequences.clone().filter(|s| !s.is_empty()),
            stream: req.stream,
            tools: req.tools.as_ref().filter(|t| !t.is_empty()).map(|tools| {
                tools
                    .iter()
                    .map(|t| CohereTool {
                        tool_type: "function".to_owned(),
                        function: CohereFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: Some(t.parameters.clone()),
                        },
                    })
                    .collect()
            }),
            tool_choice: req.tool_choice.as_ref().and_then(|choice| match choice {
                ToolChoice::Required | ToolChoice::Specific { .. } => Some("REQUIRED".to_owned()),
                ToolChoice::None => Some("NONE".to_owned()),
                ToolChoice::Auto => None,
            }),
        }
    }
}

fn text_message(role: &str, text: String) -> CohereMessage {
    CohereMessage {
        role: role.to_owned(),
        content: Some(CohereContent::Text(text)),
        tool_calls: None,
        tool_plan: None,
        tool_call_id: None,
    }
}

/// Canonical stop reason as a Cohere `finish_reason`
pub const fn stop_reason_to_wire(reason: StopReason) -> &'static str {
    match reason {
        StopReason::EndTurn => "COMPLETE",
        StopReason::ToolUse => "TOOL_CALL",
        StopReason::MaxTokens => "MAX_TOKENS",
        StopReason::StopSequence => "STOP_SEQUENCE",
        StopReason::Error => "ERROR",
    }
}

impl From<&CompletionResponse> for CohereResponse {
    fn from(resp: &CompletionResponse) -> Self {
        let content = resp
            .content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(CohereContentPart::Text { text: text.clone() }),
                _ => None,
            })
            .collect();
        let tool_calls: Vec<CohereToolCall> = resp
            .content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolCall { id, name, arguments } => Some(CohereToolCall {
                    id: id.clone(),
                    tool_type: "function".to_owned(),
                    function: CohereFunctionCall {
                        name: name.clone(),
                        arguments: Value::Object(arguments.clone()).to_string(),
                    },
                }),
                _ => None,
            })
            .collect();

        Self {
            id: resp.id.clone(),
            finish_reason: Some(stop_reason_to_wire(resp.stop_reason).to_owned()),
            message: CohereResponseMessage {
                role: "assistant".to_owned(),
                content,
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                tool_plan: None,
            },
            usage: CohereUsage {
                billed_units: CohereBilledUnits {
                    input_tokens: resp.usage.input_tokens,
                    output_tokens: resp.usage.output_tokens,
                },
            },
        }
    }
}

// -- Streaming: Cohere events -> canonical events --

/// Cohere SSE bytes -> canonical events
///
/// Cohere numbers text and tool calls in separate index spaces, so both are
/// remapped onto one sequence through a [`BlockTracker`].
#[derive(Debug, Default)]
pub struct CohereInbound {
    decoder: SseDecoder,
    blocks: BlockTracker,
    /// Cohere tool-call index -> canonical block index
    tools: HashMap<u32, u32>,
    started: bool,
    ended: bool,
}

impl CohereInbound {
    fn convert_data(&mut self, data: &str) -> Vec<StreamEvent> {
        if self.ended {
            return Vec::new();
        }

        let event = match serde_json::from_str::<CohereStreamEvent>(data) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparseable Cohere stream event");
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        if !self.started && !matches!(event, CohereStreamEvent::Unknown) {
            self.started = true;
            let id = match &event {
                CohereStreamEvent::MessageStart { id } if !id.is_empty() => id.clone(),
                _ => format!("msg_{}", uuid::Uuid::new_v4().simple()),
            };
            events.push(StreamEvent::MessageStart {
                id,
                model: String::new(),
                input_tokens: 0,
            });
        }

        match event {
            CohereStreamEvent::ContentDelta { delta, .. } => {
                if let Some(content) = delta.message.content.filter(|c| !c.text.is_empty()) {
                    events.extend(self.blocks.text(content.text));
                }
            }
            CohereStreamEvent::ContentEnd { .. } => events.extend(self.blocks.close_prose()),
            CohereStreamEvent::ToolPlanDelta { delta } => {
                if let Some(plan) = delta.message.tool_plan.filter(|p| !p.is_empty()) {
                    events.extend(self.blocks.thinking(plan));
                }
            }
            CohereStreamEvent::ToolCallStart { index, delta } => {
                let call = delta.message.tool_calls.unwrap_or_default();
                let (block, opened) = self
                    .blocks
                    .open_tool(call.id.unwrap_or_default(), call.function.name.unwrap_or_default());
                self.tools.insert(index, block);
                events.extend(opened);
                if let Some(arguments) = call.function.arguments.filter(|a| !a.is_empty()) {
                    events.push(StreamEvent::ToolCallDelta {
                        index: block,
                        arguments_chunk: arguments,
                    });
                }
            }
            CohereStreamEvent::ToolCallDelta { index, delta } => {
                let arguments = delta
                    .message
                    .tool_calls
                    .and_then(|call| call.function.arguments)
                    .filter(|a| !a.is_empty());
                if let (Some(block), Some(arguments)) = (self.tools.get(&index), arguments) {
                    events.push(StreamEvent::ToolCallDelta {
                        index: *block,
                        arguments_chunk: arguments,
                    });
                }
            }
            CohereStreamEvent::ToolCallEnd { index } => {
                if let Some(block) = self.tools.remove(&index) {
                    events.extend(self.blocks.close(block));
                }
            }
            CohereStreamEvent::MessageEnd { delta } => {
                events.extend(self.blocks.close_all());
                self.ended = true;
                events.push(StreamEvent::MessageEnd {
                    stop_reason: stop_reason_from_wire(delta.finish_reason.as_deref()),
                    output_tokens: delta.usage.billed_units.output_tokens,
                });
            }
            CohereStreamEvent::MessageStart { .. }
            | CohereStreamEvent::ContentStart { .. }
            | CohereStreamEvent::Unknown => {}
        }

        events
    }
}

impl InboundTransformer for CohereInbound {
    fn transform(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.decoder
            .feed(chunk)
            .into_iter()
            .flat_map(|frame| self.convert_data(&frame.data))
            .collect()
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = self
            .decoder
            .finish()
            .map(|frame| self.convert_data(&frame.data))
            .unwrap_or_default();

        if self.started && !self.ended {
            self.ended = true;
            events.extend(self.blocks.close_all());
            events.push(StreamEvent::MessageEnd {
                stop_reason: StopReason::EndTurn,
                output_tokens: 0,
            });
        }

        events
    }
}

// -- Streaming: canonical events -> Cohere events --

/// Canonical events -> Cohere data-only SSE
#[derive(Debug)]
pub struct CohereOutbound {
    message_id: String,
    input_tokens: u32,
    /// Canonical index -> Cohere text index
    content: HashMap<u32, u32>,
    next_content: u32,
    /// Canonical index -> Cohere tool-call index
    tools: HashMap<u32, u32>,
    next_tool: u32,
    started: bool,
    finished: bool,
}

impl CohereOutbound {
    pub fn new(message_id: &str) -> Self {
        Self {
            message_id: message_id.to_owned(),
            input_tokens: 0,
            content: HashMap::new(),
            next_content: 0,
            tools: HashMap::new(),
            next_tool: 0,
            started: false,
            finished: false,
        }
    }

    fn start(&mut self, out: &mut Vec<Bytes>) {
        if self.started {
            return;
        }
        self.started = true;
        out.push(frame(&CohereStreamEvent::MessageStart {
            id: self.message_id.clone(),
        }));
    }

    fn content_index(&mut self, index: u32, out: &mut Vec<Bytes>) -> u32 {
        if let Some(existing) = self.content.get(&index) {
            return *existing;
        }
        let position = self.next_content;
        self.next_content += 1;
        self.content.insert(index, position);
        out.push(frame(&CohereStreamEvent::ContentStart { index: position }));
        position
    }

    fn end(&mut self, stop_reason: StopReason, output_tokens: u32, out: &mut Vec<Bytes>) {
        let mut open: Vec<u32> = self.content.drain().map(|(_, position)| position).collect();
        open.sort_unstable();
        out.extend(open.into_iter().map(|index| frame(&CohereStreamEvent::ContentEnd { index })));

        let mut tools: Vec<u32> = self.tools.drain().map(|(_, position)| position).collect();
        tools.sort_unstable();
        out.extend(tools.into_iter().map(|index| frame(&CohereStreamEvent::ToolCallEnd { index })));

        out.push(frame(&CohereStreamEvent::MessageEnd {
            delta: CohereEndDelta {
                finish_reason: Some(stop_reason_to_wire(stop_reason).to_owned()),
                usage: CohereUsage {
                    billed_units: CohereBilledUnits {
                        input_tokens: self.input_tokens,
                        output_tokens,
                    },
                },
            },
        }));
        self.finished = true;
    }
}

impl OutboundTransformer for CohereOutbound {
    fn transform(&mut self, event: &StreamEvent) -> Vec<Bytes> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }

        match event {
            StreamEvent::MessageStart { input_tokens, .. } => {
                self.input_tokens = *input_tokens;
                self.start(&mut out);
            }
            StreamEvent::TextDelta { index, text } => {
                self.start(&mut out);
                let position = self.content_index(*index, &mut out);
                out.push(frame(&CohereStreamEvent::ContentDelta {
                    index: position,
                    delta: CohereStreamDelta {
                        message: CohereDeltaMessage {
                            content: Some(CohereDeltaContent {
                                content_type: None,
                                text: text.clone(),
                            }),
                            ..CohereDeltaMessage::default()
                        },
                    },
                }));
            }
            StreamEvent::ThinkingDelta { thinking, .. } => {
                self.start(&mut out);
                out.push(frame(&CohereStreamEvent::ToolPlanDelta {
                    delta: CohereStreamDelta {
                        message: CohereDeltaMessage {
                            tool_plan: Some(thinking.clone()),
                            ..CohereDeltaMessage::default()
                        },
                    },
                }));
            }
            StreamEvent::ContentBlockEnd { index } => {
                if let Some(position) = self.content.remove(index) {
                    out.push(frame(&CohereStreamEvent::ContentEnd { index: position }));
                }
            }
            StreamEvent::ToolCallStart { index, id, name } => {
                self.start(&mut out);
                let position = self.next_tool;
                self.next_tool += 1;
                self.tools.insert(*index, position);
                out.push(frame(&CohereStreamEvent::ToolCallStart {
                    index: position,
                    delta: tool_delta(Some(id.clone()), Some(name.clone()), String::new()),
                }));
            }
            StreamEvent::ToolCallDelta { index, arguments_chunk } => {
                if let Some(position) = self.tools.get(index) {
                    out.push(frame(&CohereStreamEvent::ToolCallDelta {
                        index: *position,
                        delta: tool_delta(None, None, arguments_chunk.clone()),
                    }));
                }
            }
            StreamEvent::ToolCallEnd { index } => {
                if let Some(position) = self.tools.remove(index) {
                    out.push(frame(&CohereStreamEvent::ToolCallEnd { index: position }));
                }
            }
            StreamEvent::MessageEnd {
                stop_reason,
                output_tokens,
            } => {
                self.start(&mut out);
                self.end(*stop_reason, *output_tokens, &mut out);
            }
            StreamEvent::Error { message, .. } => {
                out.push(sse::encode(
                    None,
                    &json!({"type": "message-end", "delta": {"finish_reason": "ERROR", "error": message}}),
                ));
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

fn tool_delta(id: Option<String>, name: Option<String>, arguments: String) -> CohereStreamDelta {
    CohereStreamDelta {
        message: CohereDeltaMessage {
            tool_calls: Some(CohereDeltaToolCall {
                tool_type: id.as_ref().map(|_| "function".to_owned()),
                id,
                function: CohereDeltaFunction {
                    name,
                    arguments: Some(arguments),
                },
            }),
            ..CohereDeltaMessage::default()
        },
    }
}

fn frame(event: &CohereStreamEvent) -> Bytes {
    sse::encode(None, event)
}
