//! Conversion between canonical types and the `OpenAI` wire format

use std::collections::HashMap;

use bytes::Bytes;
use serde_json::{Value, json};

use super::blocks::BlockTracker;
use crate::adapter::{InboundTransformer, OutboundTransformer};
use crate::codec::{SseDecoder, sse};
use crate::protocol::openai::{
    OpenAiChoice, OpenAiChoiceMessage, OpenAiContent, OpenAiContentPart, OpenAiFunction, OpenAiFunctionCall,
    OpenAiImageUrl, OpenAiMessage, OpenAiRequest, OpenAiResponse, OpenAiStop, OpenAiStreamChoice, OpenAiStreamChunk,
    OpenAiStreamDelta, OpenAiStreamError, OpenAiStreamFunctionCall, OpenAiStreamOptions, OpenAiStreamToolCall,
    OpenAiTool, OpenAiToolCall, OpenAiUsage,
};
use crate::types::{
    CompletionRequest, CompletionResponse, ContentPart, Message, Role, StopReason, StreamEvent, ToolChoice,
    ToolDefinition, Usage, parse_arguments, text_of,
};

// -- Inbound: OpenAI wire format -> canonical types --

impl From<OpenAiRequest> for CompletionRequest {
    fn from(req: OpenAiRequest) -> Self {
        let mut system = Vec::new();
        let mut messages: Vec<Message> = Vec::with_capacity(req.messages.len());

        for msg in req.messages {
            if matches!(msg.role.as_str(), "system" | "developer") {
                system.push(content_text(msg.content));
            } else {
                messages.push(msg.into());
            }
        }

        Self {
            model: req.model,
            messages,
            system_prompt: (!system.is_empty()).then(|| system.join("\n")),
            max_tokens: req.max_tokens.or(req.max_completion_tokens),
            temperature: req.temperature,
            top_p: req.top_p,
            top_k: None,
            stop_sequences: req.stop.map(Into::into),
            stream: req.stream.unwrap_or(false),
            tools: req.tools.map(|tools| tools.into_iter().map(Into::into).collect()),
            tool_choice: req.tool_choice.as_ref().and_then(tool_choice_from_wire),
            user_id: req.user,
            extensions: serde_json::Map::new(),
        }
    }
}

impl From<OpenAiMessage> for Message {
    fn from(msg: OpenAiMessage) -> Self {
        match msg.role.as_str() {
            "tool" => Self {
                role: Role::Tool,
                content: vec![ContentPart::ToolResult {
                    tool_call_id: msg.tool_call_id.unwrap_or_default(),
                    content: content_text(msg.content),
                    is_error: None,
                }],
                name: msg.name,
            },
            "assistant" => {
                let mut content = Vec::new();
                let text = content_text(msg.content);
                if !text.is_empty() {
                    content.push(ContentPart::Text { text });
                }
                for tc in msg.tool_calls.unwrap_or_default() {
                    content.push(ContentPart::ToolCall {
                        id: tc.id,
                        name: tc.function.name,
                        arguments: parse_arguments(&tc.function.arguments),
                    });
                }
                Self {
                    role: Role::Assistant,
                    content,
                    name: msg.name,
                }
            }
            _ => Self {
                role: Role::User,
                content: content_parts(msg.content),
                name: msg.name,
            },
        }
    }
}

fn content_parts(content: Option<OpenAiContent>) -> Vec<ContentPart> {
    match content {
        Some(OpenAiContent::Text(text)) => vec![ContentPart::Text { text }],
        Some(OpenAiContent::Parts(parts)) => parts
            .into_iter()
            .filter_map(|part| match part {
                OpenAiContentPart::Text { text } => Some(ContentPart::Text { text }),
                OpenAiContentPart::ImageUrl { image_url } => image_from_url(&image_url.url),
                OpenAiContentPart::Unsupported => None,
            })
            .collect(),
        None => Vec::new(),
    }
}

fn content_text(content: Option<OpenAiContent>) -> String {
    text_of(&content_parts(content))
}

/// Decode a `data:<media type>;base64,<data>` URI
///
/// Remote URLs cannot be carried as inline image data and are dropped.
fn image_from_url(url: &str) -> Option<ContentPart> {
    let Some(rest) = url.strip_prefix("data:") else {
        tracing::debug!("dropping remote image URL");
        return None;
    };

    let (meta, data) = rest.split_once(',').unwrap_or((rest, ""));
    let media_type = meta.split(';').next().filter(|mt| !mt.is_empty()).unwrap_or("image/jpeg");

    Some(ContentPart::Image {
        media_type: media_type.to_owned(),
        data: data.to_owned(),
    })
}

impl From<OpenAiTool> for ToolDefinition {
    fn from(tool: OpenAiTool) -> Self {
        Self {
            name: tool.function.name,
            description: tool.function.description,
            parameters: tool
                .function
                .parameters
                .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
        }
    }
}

fn tool_choice_from_wire(value: &Value) -> Option<ToolChoice> {
    match value {
        Value::String(s) => match s.as_str() {
            "none" => Some(ToolChoice::None),
            "auto" => Some(ToolChoice::Auto),
            "required" => Some(ToolChoice::Required),
            _ => None,
        },
        Value::Object(obj) => obj
            .get("function")
            .and_then(|f| f.get("name"))
            .and_then(Value::as_str)
            .map(|name| ToolChoice::Specific { name: name.to_owned() }),
        _ => None,
    }
}

/// Map an `OpenAI` `finish_reason` onto the canonical enum
pub fn stop_reason_from_wire(reason: Option<&str>) -> StopReason {
    match reason {
        Some("length") => StopReason::MaxTokens,
        Some("tool_calls" | "function_call") => StopReason::ToolUse,
        _ => StopReason::EndTurn,
    }
}

impl From<OpenAiResponse> for CompletionResponse {
    fn from(resp: OpenAiResponse) -> Self {
        let usage = resp.usage.unwrap_or_default();
        let (content, finish_reason) = resp
            .choices
            .into_iter()
            .next()
            .map(|choice| {
                let mut content = Vec::new();
                if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
                    content.push(ContentPart::Text { text });
                }
                for tc in choice.message.tool_calls.unwrap_or_default() {
                    content.push(ContentPart::ToolCall {
                        id: tc.id,
                        name: tc.function.name,
                        arguments: parse_arguments(&tc.function.arguments),
                    });
                }
                (content, choice.finish_reason)
            })
            .unwrap_or_default();

        Self {
            id: format!("msg_{}", resp.id),
            model: resp.model,
            content,
            stop_reason: stop_reason_from_wire(finish_reason.as_deref()),
            stop_sequence: None,
            usage: Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            },
        }
    }
}

// -- Outbound: canonical types -> OpenAI wire format --

impl From<&CompletionRequest> for OpenAiRequest {
    fn from(req: &CompletionRequest) -> Self {
        let mut messages = Vec::with_capacity(req.messages.len() + 1);

        if let Some(system) = &req.system_prompt {
            messages.push(text_message("system", system.clone()));
        }
        for msg in &req.messages {
            messages.extend(message_to_wire(msg));
        }

        Self {
            model: req.model.clone(),
            messages,
            temperature: req.temperature,
            top_p: req.top_p,
            max_tokens: req.max_tokens,
            max_completion_tokens: None,
            stop: req.stop_sequences.clone().map(OpenAiStop::Many),
            stream: Some(req.stream),
            stream_options: req.stream.then_some(OpenAiStreamOptions { include_usage: true }),
            tools: req.tools.as_ref().filter(|t| !t.is_empty()).map(|tools| {
                tools
                    .iter()
                    .map(|t| OpenAiTool {
                        tool_type: "function".to_owned(),
                        function: OpenAiFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: Some(t.parameters.clone()),
                        },
                    })
                    .collect()
            }),
            tool_choice: req.tool_choice.as_ref().map(tool_choice_to_wire),
            user: req.user_id.clone(),
        }
    }
}

fn text_message(role: &str, text: String) -> OpenAiMessage {
    OpenAiMessage {
        role: role.to_owned(),
        content: Some(OpenAiContent::Text(text)),
        name: None,
        tool_calls: None,
        tool_call_id: None,
    }
}

/// One canonical message may fan out into several wire messages: each tool
/// result becomes its own `tool` message.
fn message_to_wire(msg: &Message) -> Vec<OpenAiMessage> {
    match msg.role {
        Role::System => vec![text_message("system", msg.text_content())],
        Role::Assistant => {
            let tool_calls: Vec<OpenAiToolCall> = msg
                .content
                .iter()
                .filter_map(|part| match part {
                    ContentPart::ToolCall { id, name, arguments } => Some(tool_call_to_wire(id, name, arguments)),
                    _ => None,
                })
                .collect();
            let text = msg.text_content();

            vec![OpenAiMessage {
                role: "assistant".to_owned(),
                content: (!text.is_empty()).then_some(OpenAiContent::Text(text)),
                name: msg.name.clone(),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                tool_call_id: None,
            }]
        }
        Role::User | Role::Tool => {
            let mut out: Vec<OpenAiMessage> = msg
                .content
                .iter()
                .filter_map(|part| match part {
                    ContentPart::ToolResult {
                        tool_call_id, content, ..
                    } => Some(OpenAiMessage {
                        role: "tool".to_owned(),
                        content: Some(OpenAiContent::Text(content.clone())),
                        name: None,
                        tool_calls: None,
                        tool_call_id: Some(tool_call_id.clone()),
                    }),
                    _ => None,
                })
                .collect();

            let has_images = msg.content.iter().any(|p| matches!(p, ContentPart::Image { .. }));
            let text = msg.text_content();

            if has_images {
                let parts = msg
                    .content
                    .iter()
                    .filter_map(|part| match part {
                        ContentPart::Text { text } => Some(OpenAiContentPart::Text { text: text.clone() }),
                        ContentPart::Image { media_type, data } => Some(OpenAiContentPart::ImageUrl {
                            image_url: OpenAiImageUrl {
                                url: format!("data:{media_type};base64,{data}"),
                                detail: None,
                            },
                        }),
                        _ => None,
                    })
                    .collect();
                out.push(OpenAiMessage {
                    role: "user".to_owned(),
                    content: Some(OpenAiContent::Parts(parts)),
                    name: msg.name.clone(),
                    tool_calls: None,
                    tool_call_id: None,
                });
            } else if out.is_empty() || !text.is_empty() {
                let mut user = text_message("user", text);
                user.name.clone_from(&msg.name);
                out.push(user);
            }

            out
        }
    }
}

fn tool_call_to_wire(id: &str, name: &str, arguments: &serde_json::Map<String, Value>) -> OpenAiToolCall {
    OpenAiToolCall {
        id: id.to_owned(),
        tool_type: "function".to_owned(),
        function: OpenAiFunctionCall {
            name: name.to_owned(),
            arguments: Value::Object(arguments.clone()).to_string(),
        },
    }
}

fn tool_choice_to_wire(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::None => json!("none"),
        ToolChoice::Required => json!("required"),
        ToolChoice::Specific { name } => json!({"type": "function", "function": {"name": name}}),
    }
}

/// Canonical stop reason as an `OpenAI` `finish_reason`
pub const fn stop_reason_to_wire(reason: StopReason) -> &'static str {
    match reason {
        StopReason::EndTurn | StopReason::StopSequence | StopReason::Error => "stop",
        StopReason::ToolUse => "tool_calls",
        StopReason::MaxTokens => "length",
    }
}

impl From<&CompletionResponse> for OpenAiResponse {
    fn from(resp: &CompletionResponse) -> Self {
        let text = text_of(&resp.content);
        let tool_calls: Vec<OpenAiToolCall> = resp
            .content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolCall { id, name, arguments } => Some(tool_call_to_wire(id, name, arguments)),
                _ => None,
            })
            .collect();

        Self {
            id: resp.id.clone(),
            object: "chat.completion".to_owned(),
            created: jiff::Timestamp::now().as_second(),
            model: resp.model.clone(),
            choices: vec![OpenAiChoice {
                index: 0,
                message: OpenAiChoiceMessage {
                    role: "assistant".to_owned(),
                    content: (!text.is_empty()).then_some(text),
                    tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                },
                finish_reason: Some(stop_reason_to_wire(resp.stop_reason).to_owned()),
            }],
            usage: Some(OpenAiUsage {
                prompt_tokens: resp.usage.input_tokens,
                completion_tokens: resp.usage.output_tokens,
                total_tokens: resp.usage.total(),
            }),
        }
    }
}

// -- Streaming: OpenAI chunks -> canonical events --

/// `OpenAI` SSE bytes -> canonical events
///
/// `OpenAI` addresses tool calls by their position in `tool_calls` and never
/// numbers text, so indices come from a [`BlockTracker`]. The terminal
/// `MessageEnd` waits for the usage chunk that follows `finish_reason` when
/// `include_usage` is on.
#[derive(Debug, Default)]
pub struct OpenAiInbound {
    decoder: SseDecoder,
    blocks: BlockTracker,
    /// Upstream `tool_calls[].index` -> canonical block index
    tools: HashMap<u32, u32>,
    started: bool,
    input_tokens: u32,
    pending_end: Option<StopReason>,
    ended: bool,
}

impl OpenAiInbound {
    fn convert_data(&mut self, data: &str) -> Vec<StreamEvent> {
        if self.ended {
            return Vec::new();
        }
        if data == "[DONE]" {
            return self.flush_end(0);
        }

        let value = match serde_json::from_str::<Value>(data) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparseable OpenAI SSE data");
                return Vec::new();
            }
        };

        if value.get("error").is_some() {
            return match serde_json::from_value::<OpenAiStreamError>(value) {
                Ok(err) => {
                    self.ended = true;
                    vec![StreamEvent::Error {
                        message: err.error.message,
                        code: None,
                    }]
                }
                Err(_) => Vec::new(),
            };
        }

        match serde_json::from_value::<OpenAiStreamChunk>(value) {
            Ok(chunk) => self.convert_chunk(chunk),
            Err(e) => {
                tracing::debug!(error = %e, "skipping unrecognized OpenAI stream chunk");
                Vec::new()
            }
        }
    }

    fn convert_chunk(&mut self, chunk: OpenAiStreamChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if let Some(usage) = &chunk.usage {
            self.input_tokens = usage.prompt_tokens;
        }

        if !self.started {
            self.started = true;
            events.push(StreamEvent::MessageStart {
                id: format!("msg_{}", chunk.id),
                model: chunk.model.clone(),
                input_tokens: self.input_tokens,
            });
        }

        if let Some(choice) = chunk.choices.into_iter().next() {
            events.extend(self.convert_choice(choice));
        }

        if let Some(usage) = chunk.usage
            && self.pending_end.is_some()
        {
            events.extend(self.flush_end(usage.completion_tokens));
        }

        events
    }

    fn convert_choice(&mut self, choice: OpenAiStreamChoice) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            events.extend(self.blocks.text(text));
        }

        for tc in choice.delta.tool_calls.unwrap_or_default() {
            let function = tc.function.unwrap_or_default();

            if !self.tools.contains_key(&tc.index) && (tc.id.is_some() || function.name.is_some()) {
                let (index, opened) = self
                    .blocks
                    .open_tool(tc.id.unwrap_or_default(), function.name.unwrap_or_default());
                self.tools.insert(tc.index, index);
                events.extend(opened);
            }

            if let (Some(index), Some(arguments)) = (self.tools.get(&tc.index), function.arguments)
                && !arguments.is_empty()
            {
                events.push(StreamEvent::ToolCallDelta {
                    index: *index,
                    arguments_chunk: arguments,
                });
            }
        }

        if let Some(reason) = choice.finish_reason {
            events.extend(self.blocks.close_all());
            self.pending_end = Some(stop_reason_from_wire(Some(&reason)));
        }

        events
    }

    fn flush_end(&mut self, output_tokens: u32) -> Vec<StreamEvent> {
        if self.ended || !self.started {
            return Vec::new();
        }
        let Some(stop_reason) = self.pending_end.take() else {
            return Vec::new();
        };

        self.ended = true;
        vec![StreamEvent::MessageEnd {
            stop_reason,
            output_tokens,
        }]
    }
}

impl InboundTransformer for OpenAiInbound {
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
            events.extend(self.blocks.close_all());
            if self.pending_end.is_none() {
                self.pending_end = Some(StopReason::EndTurn);
            }
            events.extend(self.flush_end(0));
        }

        events
    }
}

// -- Streaming: canonical events -> OpenAI chunks --

/// Canonical events -> `OpenAI` `chat.completion.chunk` SSE
///
/// Tool calls are renumbered by arrival so the client sees positions
/// 0, 1, 2 regardless of the canonical block indices.
#[derive(Debug)]
pub struct OpenAiOutbound {
    model: String,
    message_id: String,
    created: i64,
    input_tokens: u32,
    tool_positions: HashMap<u32, u32>,
    started: bool,
    finished: bool,
}

impl OpenAiOutbound {
    pub fn new(model: &str, message_id: &str) -> Self {
        Self {
            model: model.to_owned(),
            message_id: message_id.to_owned(),
            created: jiff::Timestamp::now().as_second(),
            input_tokens: 0,
            tool_positions: HashMap::new(),
            started: false,
            finished: false,
        }
    }

    fn chunk(&self, delta: OpenAiStreamDelta, finish_reason: Option<&str>, usage: Option<OpenAiUsage>) -> Bytes {
        sse::encode(
            None,
            &OpenAiStreamChunk {
                id: self.message_id.clone(),
                object: "chat.completion.chunk".to_owned(),
                created: self.created,
                model: self.model.clone(),
                choices: vec![OpenAiStreamChoice {
                    index: 0,
                    delta,
                    finish_reason: finish_reason.map(str::to_owned),
                }],
                usage,
            },
        )
    }

    fn start(&mut self, out: &mut Vec<Bytes>) {
        if self.started {
            return;
        }
        self.started = true;
        out.push(self.chunk(
            OpenAiStreamDelta {
                role: Some("assistant".to_owned()),
                content: Some(String::new()),
                tool_calls: None,
            },
            None,
            None,
        ));
    }

    fn end(&mut self, stop_reason: StopReason, output_tokens: u32, out: &mut Vec<Bytes>) {
        out.push(self.chunk(
            OpenAiStreamDelta::default(),
            Some(stop_reason_to_wire(stop_reason)),
            Some(OpenAiUsage {
                prompt_tokens: self.input_tokens,
                completion_tokens: output_tokens,
                total_tokens: self.input_tokens.saturating_add(output_tokens),
            }),
        ));
        out.push(sse::done());
        self.finished = true;
    }

    fn tool_delta(&self, tool_call: OpenAiStreamToolCall) -> Bytes {
        self.chunk(
            OpenAiStreamDelta {
                role: None,
                content: None,
                tool_calls: Some(vec![tool_call]),
            },
            None,
            None,
        )
    }
}

impl OutboundTransformer for OpenAiOutbound {
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
            StreamEvent::TextDelta { text, .. } => {
                self.start(&mut out);
                out.push(self.chunk(
                    OpenAiStreamDelta {
                        role: None,
                        content: Some(text.clone()),
                        tool_calls: None,
                    },
                    None,
                    None,
                ));
            }
            StreamEvent::ToolCallStart { index, id, name } => {
                self.start(&mut out);
                let position = u32::try_from(self.tool_positions.len()).unwrap_or(u32::MAX);
                self.tool_positions.insert(*index, position);
                out.push(self.tool_delta(OpenAiStreamToolCall {
                    index: position,
                    id: Some(id.clone()),
                    tool_type: Some("function".to_owned()),
                    function: Some(OpenAiStreamFunctionCall {
                        name: Some(name.clone()),
                        arguments: Some(String::new()),
                    }),
                }));
            }
            StreamEvent::ToolCallDelta { index, arguments_chunk } => {
                if let Some(position) = self.tool_positions.get(index) {
                    out.push(self.tool_delta(OpenAiStreamToolCall {
                        index: *position,
                        id: None,
                        tool_type: None,
                        function: Some(OpenAiStreamFunctionCall {
                            name: None,
                            arguments: Some(arguments_chunk.clone()),
                        }),
                    }));
                }
            }
            StreamEvent::MessageEnd {
                stop_reason,
                output_tokens,
            } => {
                self.start(&mut out);
                self.end(*stop_reason, *output_tokens, &mut out);
            }
            StreamEvent::Error { message, code } => {
                out.push(sse::encode(
                    None,
                    &json!({"error": {"message": message, "type": "server_error", "code": code}}),
                ));
                out.push(sse::done());
                self.finished = true;
            }
            StreamEvent::ThinkingDelta { .. } | StreamEvent::ToolCallEnd { .. } | StreamEvent::ContentBlockEnd { .. } => {}
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::SseFrame;

    fn parse(body: Value) -> CompletionRequest {
        serde_json::from_value::<OpenAiRequest>(body).unwrap().into()
    }

    fn sse_chunks(chunks: &[Value]) -> String {
        let mut out: String = chunks.iter().map(|c| format!("data: {c}\n\n")).collect();
        out.push_str("data: [DONE]\n\n");
        out
    }

    fn run_inbound(body: &str) -> Vec<StreamEvent> {
        let mut inbound = OpenAiInbound::default();
        let mut events = inbound.transform(body.as_bytes());
        events.extend(inbound.finish());
        events
    }

    fn chunk(delta: Value, finish_reason: Option<&str>) -> Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1,
            "model": "gpt-4o",
            "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}]
        })
    }

    #[test]
    fn parses_system_and_tool_messages() {
        let req = parse(json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "system", "content": "one"},
                {"role": "system", "content": "two"},
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "call_1", "type": "function", "function": {"name": "f", "arguments": "{\"a\":1}"}}
                ]},
                {"role": "tool", "tool_call_id": "call_1", "content": "done"}
            ],
            "max_completion_tokens": 55,
            "stop": "END",
            "tool_choice": {"type": "function", "function": {"name": "f"}}
        }));

        assert_eq!(req.system_prompt.as_deref(), Some("one\ntwo"));
        assert_eq!(req.messages.len(), 3);
        assert_eq!(req.max_tokens, Some(55));
        assert_eq!(req.stop_sequences, Some(vec!["END".to_owned()]));
        assert_eq!(req.tool_choice, Some(ToolChoice::Specific { name: "f".into() }));
        assert!(matches!(&req.messages[1].content[0], ContentPart::ToolCall { arguments, .. } if arguments["a"] == 1));
        assert_eq!(req.messages[2].role, Role::Tool);
    }

    #[test]
    fn malformed_arguments_become_empty_object() {
        let req = parse(json!({
            "model": "m",
            "messages": [{"role": "assistant", "tool_calls": [
                {"id": "c", "type": "function", "function": {"name": "f", "arguments": "{not json"}}
            ]}]
        }));
        assert!(matches!(&req.messages[0].content[0], ContentPart::ToolCall { arguments, .. } if arguments.is_empty()));
    }

    #[test]
    fn data_uri_images_decode() {
        let req = parse(json!({
            "model": "m",
            "messages": [{"role": "user", "content": [
                {"type": "text", "text": "look"},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}},
                {"type": "image_url", "image_url": {"url": "https://example.com/cat.png"}}
            ]}]
        }));
        assert_eq!(
            req.messages[0].content,
            vec![
                ContentPart::Text { text: "look".into() },
                ContentPart::Image {
                    media_type: "image/png".into(),
                    data: "AAAA".into()
                }
            ]
        );
    }

    #[test]
    fn serializes_tool_results_as_tool_messages() {
        let req = CompletionRequest {
            model: "gpt-4o".into(),
            system_prompt: Some("sys".into()),
            messages: vec![
                Message {
                    role: Role::Assistant,
                    content: vec![ContentPart::ToolCall {
                        id: "c1".into(),
                        name: "f".into(),
                        arguments: parse_arguments("{\"x\":true}"),
                    }],
                    name: None,
                },
                Message {
                    role: Role::Tool,
                    content: vec![
                        ContentPart::ToolResult {
                            tool_call_id: "c1".into(),
                            content: "ok".into(),
                            is_error: None,
                        },
                        ContentPart::ToolResult {
                            tool_call_id: "c2".into(),
                            content: "also".into(),
                            is_error: None,
                        },
                    ],
                    name: None,
                },
            ],
            stream: true,
            ..CompletionRequest::default()
        };

        let wire = serde_json::to_value(OpenAiRequest::from(&req)).unwrap();
        assert_eq!(wire["messages"][0], json!({"role": "system", "content": "sys"}));
        assert!(wire["messages"][1]["content"].is_null());
        assert_eq!(wire["messages"][1]["tool_calls"][0]["function"]["arguments"], "{\"x\":true}");
        assert_eq!(wire["messages"][2], json!({"role": "tool", "content": "ok", "tool_call_id": "c1"}));
        assert_eq!(wire["messages"][3]["tool_call_id"], "c2");
        assert_eq!(wire["messages"].as_array().unwrap().len(), 4);
        assert_eq!(wire["stream_options"], json!({"include_usage": true}));
    }

    #[test]
    fn tool_call_round_trip_preserves_identity() {
        let canonical = parse(json!({
            "model": "m",
            "messages": [{"role": "assistant", "content": null, "tool_calls": [
                {"id": "call_9", "type": "function", "function": {"name": "search", "arguments": "{\"q\":\"rust\",\"n\":3}"}}
            ]}]
        }));

        let again = parse(serde_json::to_value(OpenAiRequest::from(&canonical)).unwrap());
        assert_eq!(again.messages, canonical.messages);
    }

    #[test]
    fn response_maps_finish_reason_and_usage() {
        let resp: CompletionResponse = serde_json::from_value::<OpenAiResponse>(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1,
            "model": "gpt-4o",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "hi"}, "finish_reason": "length"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 7}
        }))
        .unwrap()
        .into();

        assert_eq!(resp.id, "msg_chatcmpl-1");
        assert_eq!(resp.stop_reason, StopReason::MaxTokens);
        assert_eq!(resp.usage, Usage { input_tokens: 3, output_tokens: 4 });
        assert_eq!(stop_reason_from_wire(Some("content_filter")), StopReason::EndTurn);
    }

    #[test]
    fn serialized_response_has_total_usage() {
        let resp = CompletionResponse {
            id: "msg_1".into(),
            model: "claude".into(),
            content: vec![ContentPart::ToolCall {
                id: "t".into(),
                name: "f".into(),
                arguments: serde_json::Map::new(),
            }],
            stop_reason: StopReason::ToolUse,
            stop_sequence: None,
            usage: Usage {
                input_tokens: 2,
                output_tokens: 5,
            },
        };

        let wire = serde_json::to_value(OpenAiResponse::from(&resp)).unwrap();
        assert_eq!(wire["choices"][0]["finish_reason"], "tool_calls");
        assert!(wire["choices"][0]["message"]["content"].is_null());
        assert_eq!(wire["choices"][0]["message"]["tool_calls"][0]["function"]["arguments"], "{}");
        assert_eq!(wire["usage"]["total_tokens"], 7);
    }

    #[test]
    fn text_only_stream_lifecycle() {
        let body = sse_chunks(&[
            chunk(json!({"role": "assistant", "content": ""}), None),
            chunk(json!({"content": "Hello"}), None),
            chunk(json!({}), Some("stop")),
        ]);

        let kinds: Vec<_> = run_inbound(&body)
            .into_iter()
            .map(|e| serde_json::to_value(e).unwrap()["type"].as_str().unwrap().to_owned())
            .collect();
        assert_eq!(kinds, vec!["message_start", "text_delta", "content_block_end", "message_end"]);
    }

    #[test]
    fn text_then_tool_offsets_tool_index() {
        let body = sse_chunks(&[
            chunk(json!({"content": "Let me check"}), None),
            chunk(
                json!({"tool_calls": [{"index": 0, "id": "call_1", "type": "function", "function": {"name": "lookup", "arguments": ""}}]}),
                None,
            ),
            chunk(json!({"tool_calls": [{"index": 0, "function": {"arguments": "{\"q\":1}"}}]}), None),
            chunk(json!({}), Some("tool_calls")),
        ]);

        let events = run_inbound(&body);
        assert_eq!(
            &events[1..],
            &[
                StreamEvent::TextDelta {
                    index: 0,
                    text: "Let me check".into()
                },
                StreamEvent::ContentBlockEnd { index: 0 },
                StreamEvent::ToolCallStart {
                    index: 1,
                    id: "call_1".into(),
                    name: "lookup".into()
                },
                StreamEvent::ToolCallDelta {
                    index: 1,
                    arguments_chunk: "{\"q\":1}".into()
                },
                StreamEvent::ToolCallEnd { index: 1 },
                StreamEvent::MessageEnd {
                    stop_reason: StopReason::ToolUse,
                    output_tokens: 0
                },
            ]
        );
    }

    #[test]
    fn parallel_tools_in_one_chunk_get_distinct_indices() {
        let body = sse_chunks(&[
            chunk(json!({"content": "two calls"}), None),
            chunk(
                json!({"tool_calls": [
                    {"index": 0, "id": "a", "type": "function", "function": {"name": "f", "arguments": "{}"}},
                    {"index": 1, "id": "b", "type": "function", "function": {"name": "g", "arguments": "{}"}}
                ]}),
                None,
            ),
            chunk(json!({}), Some("tool_calls")),
        ]);

        let events = run_inbound(&body);
        let starts: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ToolCallStart { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        let ends: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ToolCallEnd { index } => Some(*index),
                _ => None,
            })
            .collect();

        assert_eq!(starts, vec![1, 2]);
        assert_eq!(ends, vec![1, 2]);
    }

    #[test]
    fn tools_only_start_at_zero() {
        let body = sse_chunks(&[
            chunk(
                json!({"tool_calls": [
                    {"index": 0, "id": "a", "type": "function", "function": {"name": "f", "arguments": ""}},
                    {"index": 1, "id": "b", "type": "function", "function": {"name": "g", "arguments": ""}}
                ]}),
                None,
            ),
            chunk(json!({}), Some("tool_calls")),
        ]);

        let events = run_inbound(&body);
        assert!(matches!(events[1], StreamEvent::ToolCallStart { index: 0, .. }));
        assert!(matches!(events[2], StreamEvent::ToolCallStart { index: 1, .. }));
    }

    #[test]
    fn message_end_waits_for_usage_chunk() {
        let mut usage_chunk = json!({"id": "chatcmpl-1", "model": "gpt-4o", "choices": []});
        usage_chunk["usage"] = json!({"prompt_tokens": 11, "completion_tokens": 22, "total_tokens": 33});
        let body = sse_chunks(&[chunk(json!({"content": "x"}), Some("stop")), usage_chunk]);

        let events = run_inbound(&body);
        assert_eq!(
            events.last(),
            Some(&StreamEvent::MessageEnd {
                stop_reason: StopReason::EndTurn,
                output_tokens: 22
            })
        );
        assert_eq!(
            events.iter().filter(|e| matches!(e, StreamEvent::MessageEnd { .. })).count(),
            1
        );
    }

    fn decode(frames: &[Bytes]) -> Vec<SseFrame> {
        let mut decoder = SseDecoder::new();
        frames.iter().flat_map(|f| decoder.feed(f)).collect()
    }

    #[test]
    fn outbound_renumbers_tools_and_ends_with_done() {
        let mut outbound = OpenAiOutbound::new("gpt-4o", "msg_1");
        let mut frames = Vec::new();
        for event in [
            StreamEvent::MessageStart {
                id: "x".into(),
                model: "m".into(),
                input_tokens: 4,
            },
            StreamEvent::TextDelta {
                index: 0,
                text: "hi".into(),
            },
            StreamEvent::ContentBlockEnd { index: 0 },
            StreamEvent::ToolCallStart {
                index: 1,
                id: "call_1".into(),
                name: "f".into(),
            },
            StreamEvent::ToolCallDelta {
                index: 1,
                arguments_chunk: "{}".into(),
            },
            StreamEvent::ToolCallEnd { index: 1 },
            StreamEvent::MessageEnd {
                stop_reason: StopReason::ToolUse,
                output_tokens: 6,
            },
        ] {
            frames.extend(outbound.transform(&event));
        }
        assert!(outbound.finish().is_empty());

        let decoded = decode(&frames);
        let values: Vec<Value> = decoded
            .iter()
            .filter(|f| !f.is_done())
            .map(|f| serde_json::from_str(&f.data).unwrap())
            .collect();

        assert_eq!(values[0]["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(values[1]["choices"][0]["delta"]["content"], "hi");
        assert_eq!(values[2]["choices"][0]["delta"]["tool_calls"][0]["index"], 0);
        assert_eq!(values[2]["choices"][0]["delta"]["tool_calls"][0]["id"], "call_1");
        assert_eq!(values[3]["choices"][0]["delta"]["tool_calls"][0]["function"]["arguments"], "{}");
        assert_eq!(values[4]["choices"][0]["finish_reason"], "tool_calls");
        assert_eq!(values[4]["usage"]["total_tokens"], 10);
        assert!(decoded.last().unwrap().is_done());
    }

    #[test]
    fn outbound_usage_total_saturates() {
        let mut outbound = OpenAiOutbound::new("m", "msg_1");
        let mut frames = outbound.transform(&StreamEvent::MessageStart {
            id: "x".into(),
            model: "m".into(),
            input_tokens: u32::MAX,
        });
        frames.extend(outbound.transform(&StreamEvent::MessageEnd {
            stop_reason: StopReason::EndTurn,
            output_tokens: 10,
        }));

        let decoded = decode(&frames);
        let last: Value = decoded
            .iter()
            .filter(|f| !f.is_done())
            .map(|f| serde_json::from_str(&f.data).unwrap())
            .next_back()
            .unwrap();
        assert_eq!(last["usage"]["total_tokens"], u32::MAX);
    }

    #[test]
    fn outbound_error_then_done() {
        let mut outbound = OpenAiOutbound::new("m", "msg_1");
        let frames = outbound.transform(&StreamEvent::Error {
            message: "upstream fell over".into(),
            code: Some(500),
        });
        let decoded = decode(&frames);
        let error: Value = serde_json::from_str(&decoded[0].data).unwrap();
        assert_eq!(error["error"]["type"], "server_error");
        assert_eq!(error["error"]["code"], 500);
        assert!(decoded[1].is_done());
    }
}
