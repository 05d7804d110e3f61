//! Conversion between canonical types and the Gemini wire format

use std::collections::HashMap;

use bytes::Bytes;
use serde_json::{Value, json};

use super::blocks::BlockTracker;
use crate::adapter::{InboundTransformer, OutboundTransformer};
use crate::codec::{SseDecoder, sse};
use crate::protocol::gemini::{
    GeminiCandidate, GeminiContent, GeminiError, GeminiFunctionCall, GeminiFunctionCallingConfig, GeminiFunctionDeclaration,
    GeminiFunctionResponse, GeminiGenerationConfig, GeminiInlineData, GeminiPart, GeminiRequest, GeminiResponse,
    GeminiTool, GeminiToolConfig, GeminiUsageMetadata,
};
use crate::types::{
    Arguments, CompletionRequest, CompletionResponse, ContentPart, Message, Role, StopReason, StreamEvent, ToolChoice,
    ToolDefinition, Usage, arguments_from_value, parse_arguments,
};

// -- Inbound: Gemini wire format -> canonical types --

/// Model and stream flag come from the URL, so the adapter fills them in.
impl From<GeminiRequest> for CompletionRequest {
    fn from(req: GeminiRequest) -> Self {
        let system_prompt = req.system_instruction.map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("\n")
        });

        let config = req.generation_config.unwrap_or_default();

        let tools: Vec<ToolDefinition> = req
            .tools
            .unwrap_or_default()
            .into_iter()
            .flat_map(|t| t.function_declarations)
            .map(|decl| ToolDefinition {
                name: decl.name,
                description: decl.description,
                parameters: decl.parameters.map_or_else(
                    || json!({"type": "object", "properties": {}}),
                    |mut schema| {
                        rewrite_schema_types(&mut schema, &str::to_lowercase);
                        schema
                    },
                ),
            })
            .collect();

        Self {
            model: String::new(),
            messages: req.contents.into_iter().map(Into::into).collect(),
            system_prompt,
            max_tokens: config.max_output_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
            stop_sequences: config.stop_sequences,
            stream: false,
            tool_choice: req.tool_config.and_then(|tc| tool_choice_from_wire(&tc.function_calling_config)),
            tools: (!tools.is_empty()).then_some(tools),
            user_id: None,
            extensions: serde_json::Map::new(),
        }
    }
}

impl From<GeminiContent> for Message {
    fn from(content: GeminiContent) -> Self {
        let parts: Vec<ContentPart> = content.parts.into_iter().filter_map(part_to_canonical).collect();

        let role = if parts.iter().any(|p| matches!(p, ContentPart::ToolResult { .. })) {
            Role::Tool
        } else if content.role.as_deref() == Some("model") {
            Role::Assistant
        } else {
            Role::User
        };

        Self {
            role,
            content: parts,
            name: None,
        }
    }
}

fn part_to_canonical(part: GeminiPart) -> Option<ContentPart> {
    if let Some(text) = part.text {
        return Some(if part.thought == Some(true) {
            ContentPart::Thinking { thinking: text }
        } else {
            ContentPart::Text { text }
        });
    }
    if let Some(call) = part.function_call {
        // Gemini has no call ids; the function name doubles as one
        return Some(ContentPart::ToolCall {
            id: call.name.clone(),
            name: call.name,
            arguments: arguments_from_value(call.args),
        });
    }
    if let Some(response) = part.function_response {
        return Some(ContentPart::ToolResult {
            tool_call_id: response.name,
            content: if response.response.is_null() {
                "{}".to_owned()
            } else {
                response.response.to_string()
            },
            is_error: None,
        });
    }
    part.inline_data.map(|data| ContentPart::Image {
        media_type: data.mime_type.unwrap_or_else(|| "image/jpeg".to_owned()),
        data: data.data,
    })
}

fn tool_choice_from_wire(config: &GeminiFunctionCallingConfig) -> Option<ToolChoice> {
    match config.mode.as_str() {
        "AUTO" => Some(ToolChoice::Auto),
        "NONE" => Some(ToolChoice::None),
        "ANY" => Some(
            match config.allowed_function_names.as_deref() {
                Some([name]) => ToolChoice::Specific { name: name.clone() },
                _ => ToolChoice::Required,
            },
        ),
        _ => None,
    }
}

/// Apply `case` to every `type` name in a JSON schema, descending into
/// `properties` and `items`
pub fn rewrite_schema_types(schema: &mut Value, case: &dyn Fn(&str) -> String) {
    let Some(obj) = schema.as_object_mut() else {
        return;
    };

    if let Some(Value::String(ty)) = obj.get_mut("type") {
        *ty = case(ty);
    }
    if let Some(Value::Object(properties)) = obj.get_mut("properties") {
        for property in properties.values_mut() {
            rewrite_schema_types(property, case);
        }
    }
    if let Some(items) = obj.get_mut("items") {
        rewrite_schema_types(items, case);
    }
}

/// Map a Gemini `finishReason` onto the canonical enum
///
/// Safety and recitation stops have no canonical counterpart.
pub fn stop_reason_from_wire(reason: Option<&str>) -> StopReason {
    match reason {
        Some("MAX_TOKENS") => StopReason::MaxTokens,
        _ => StopReason::EndTurn,
    }
}

impl From<GeminiResponse> for CompletionResponse {
    fn from(resp: GeminiResponse) -> Self {
        let usage = resp.usage_metadata.unwrap_or_default();
        let candidate = resp.candidates.into_iter().next().unwrap_or_default();
        let content: Vec<ContentPart> = candidate
            .content
            .parts
            .into_iter()
            .filter_map(part_to_canonical)
            .collect();

        let has_tool_call = content.iter().any(|p| matches!(p, ContentPart::ToolCall { .. }));

        Self {
            id: resp.response_id.unwrap_or_else(generated_id),
            model: resp.model_version.unwrap_or_default(),
            content,
            stop_reason: if has_tool_call {
                StopReason::ToolUse
            } else {
                stop_reason_from_wire(candidate.finish_reason.as_deref())
            },
            stop_sequence: None,
            usage: Usage {
                input_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count,
            },
        }
    }
}

fn generated_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}

// -- Outbound: canonical types -> Gemini wire format --

impl From<&CompletionRequest> for GeminiRequest {
    fn from(req: &CompletionRequest) -> Self {
        // Tool results reference calls by id; Gemini wants the function name
        let call_names: HashMap<&str, &str> = req
            .messages
            .iter()
            .flat_map(|m| &m.content)
            .filter_map(|part| match part {
                ContentPart::ToolCall { id, name, .. } => Some((id.as_str(), name.as_str())),
                _ => None,
            })
            .collect();

        let mut system: Vec<String> = req.system_prompt.iter().cloned().collect();
        let mut contents = Vec::with_capacity(req.messages.len());

        for msg in &req.messages {
            if msg.role == Role::System {
                system.push(msg.text_content());
                continue;
            }
            contents.push(GeminiContent {
                role: Some(if msg.role == Role::Assistant { "model" } else { "user" }.to_owned()),
                parts: msg.content.iter().map(|part| part_to_wire(part, &call_names)).collect(),
            });
        }

        let generation_config = GeminiGenerationConfig {
            temperature: req.temperature,
            top_p: req.top_p,
            top_k: req.top_k,
            max_output_tokens: req.max_tokens,
            stop_sequences: req.stop_sequences.clone().filter(|s| !s.is_empty()),
        };

        let tools = req.tools.as_ref().filter(|t| !t.is_empty()).map(|tools| {
            vec![GeminiTool {
                function_declarations: tools
                    .iter()
                    .map(|t| {
                        let mut parameters = t.parameters.clone();
                        rewrite_schema_types(&mut parameters, &str::to_uppercase);
                        GeminiFunctionDeclaration {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: Some(parameters),
                        }
                    })
                    .collect(),
            }]
        });

        Self {
            contents,
            system_instruction: (!system.is_empty()).then(|| GeminiContent {
                role: None,
                parts: vec![GeminiPart::text(system.join("\n"))],
            }),
            generation_config: (!generation_config.is_empty()).then_some(generation_config),
            tool_config: tools
                .as_ref()
                .and(req.tool_choice.as_ref())
                .map(tool_choice_to_wire),
            tools,
        }
    }
}

fn part_to_wire(part: &ContentPart, call_names: &HashMap<&str, &str>) -> GeminiPart {
    match part {
        ContentPart::Text { text } => GeminiPart::text(text.clone()),
        ContentPart::Thinking { thinking } => GeminiPart {
            thought: Some(true),
            ..GeminiPart::text(thinking.clone())
        },
        ContentPart::Image { media_type, data } => GeminiPart {
            inline_data: Some(GeminiInlineData {
                mime_type: Some(media_type.clone()),
                data: data.clone(),
            }),
            ..GeminiPart::default()
        },
        ContentPart::ToolCall { name, arguments, .. } => GeminiPart {
            function_call: Some(GeminiFunctionCall {
                name: name.clone(),
                args: Value::Object(arguments.clone()),
            }),
            ..GeminiPart::default()
        },
        ContentPart::ToolResult {
            tool_call_id, content, ..
        } => GeminiPart {
            function_response: Some(GeminiFunctionResponse {
                name: call_names
                    .get(tool_call_id.as_str())
                    .map_or_else(|| tool_call_id.clone(), |name| (*name).to_owned()),
                response: json!({ "content": content }),
            }),
            ..GeminiPart::default()
        },
    }
}

fn tool_choice_to_wire(choice: &ToolChoice) -> GeminiToolConfig {
    let (mode, allowed) = match choice {
        ToolChoice::Auto => ("AUTO", None),
        ToolChoice::None => ("NONE", None),
        ToolChoice::Required => ("ANY", None),
        ToolChoice::Specific { name } => ("ANY", Some(vec![name.clone()])),
    };

    GeminiToolConfig {
        function_calling_config: GeminiFunctionCallingConfig {
            mode: mode.to_owned(),
            allowed_function_names: allowed,
        },
    }
}

/// Canonical stop reason as a Gemini `finishReason`
pub const fn stop_reason_to_wire(reason: StopReason) -> &'static str {
    match reason {
        StopReason::EndTurn | StopReason::ToolUse | StopReason::StopSequence => "STOP",
        StopReason::MaxTokens => "MAX_TOKENS",
        StopReason::Error => "OTHER",
    }
}

fn usage_metadata(input_tokens: u32, output_tokens: u32) -> GeminiUsageMetadata {
    GeminiUsageMetadata {
        prompt_token_count: input_tokens,
        candidates_token_count: output_tokens,
        total_token_count: input_tokens.saturating_add(output_tokens),
    }
}

impl From<&CompletionResponse> for GeminiResponse {
    fn from(resp: &CompletionResponse) -> Self {
        let no_names = HashMap::new();
        let parts = resp
            .content
            .iter()
            .filter(|p| matches!(p, ContentPart::Text { .. } | ContentPart::ToolCall { .. }))
            .map(|p| part_to_wire(p, &no_names))
            .collect();

        Self {
            candidates: vec![GeminiCandidate {
                content: GeminiContent {
                    role: Some("model".to_owned()),
                    parts,
                },
                finish_reason: Some(stop_reason_to_wire(resp.stop_reason).to_owned()),
                index: 0,
            }],
            usage_metadata: Some(usage_metadata(resp.usage.input_tokens, resp.usage.output_tokens)),
            model_version: Some(resp.model.clone()),
            response_id: None,
        }
    }
}

// -- Streaming: Gemini chunks -> canonical events --

/// Gemini SSE bytes (`alt=sse`) -> canonical events
///
/// Every chunk is a full `GeminiResponse`. Function calls arrive whole, so
/// each one opens, fills, and closes its block within a single chunk.
#[derive(Debug, Default)]
pub struct GeminiInbound {
    decoder: SseDecoder,
    blocks: BlockTracker,
    started: bool,
    saw_tool_call: bool,
    ended: bool,
}

impl GeminiInbound {
    fn convert_data(&mut self, data: &str) -> Vec<StreamEvent> {
        if self.ended {
            return Vec::new();
        }

        let value = match serde_json::from_str::<Value>(data) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparseable Gemini stream chunk");
                return Vec::new();
            }
        };

        if value.get("error").is_some() {
            return match serde_json::from_value::<GeminiError>(value) {
                Ok(err) => {
                    self.ended = true;
                    vec![StreamEvent::Error {
                        message: err.error.message,
                        code: (err.error.code != 0).then_some(err.error.code),
                    }]
                }
                Err(_) => Vec::new(),
            };
        }

        let chunk = match serde_json::from_value::<GeminiResponse>(value) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparseable Gemini stream chunk");
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        let usage = chunk.usage_metadata.unwrap_or_default();

        if !self.started {
            self.started = true;
            events.push(StreamEvent::MessageStart {
                id: chunk.response_id.unwrap_or_else(generated_id),
                model: chunk.model_version.unwrap_or_default(),
                input_tokens: usage.prompt_token_count,
            });
        }

        let Some(candidate) = chunk.candidates.into_iter().next() else {
            return events;
        };

        for part in candidate.content.parts {
            if let Some(call) = part.function_call {
                self.saw_tool_call = true;
                let (index, opened) = self.blocks.open_tool(call.name.clone(), call.name);
                events.extend(opened);
                events.push(StreamEvent::ToolCallDelta {
                    index,
                    arguments_chunk: if call.args.is_null() {
                        "{}".to_owned()
                    } else {
                        call.args.to_string()
                    },
                });
                events.extend(self.blocks.close(index));
            } else if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                if part.thought == Some(true) {
                    events.extend(self.blocks.thinking(text));
                } else {
                    events.extend(self.blocks.text(text));
                }
            }
        }

        if let Some(reason) = candidate.finish_reason {
            events.extend(self.blocks.close_all());
            self.ended = true;
            events.push(StreamEvent::MessageEnd {
                stop_reason: if self.saw_tool_call {
                    StopReason::ToolUse
                } else {
                    stop_reason_from_wire(Some(&reason))
                },
                output_tokens: usage.candidates_token_count,
            });
        }

        events
    }
}

impl InboundTransformer for GeminiInbound {
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
                stop_reason: if self.saw_tool_call {
                    StopReason::ToolUse
                } else {
                    StopReason::EndTurn
                },
                output_tokens: 0,
            });
        }

        events
    }
}

// -- Streaming: canonical events -> Gemini chunks --

/// Canonical events -> Gemini SSE chunks
///
/// Tool arguments are buffered until the call closes, since Gemini clients
/// expect each `functionCall` whole.
#[derive(Debug)]
pub struct GeminiOutbound {
    model: String,
    input_tokens: u32,
    /// Open tool calls by canonical index: (name, accumulated JSON)
    tools: HashMap<u32, (String, String)>,
    /// Canonical indices of open tool calls in arrival order
    tool_order: Vec<u32>,
    started: bool,
    finished: bool,
}

impl GeminiOutbound {
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

    fn chunk(&self, parts: Vec<GeminiPart>, finish_reason: Option<&str>, usage: Option<GeminiUsageMetadata>) -> Bytes {
        sse::encode(
            None,
            &GeminiResponse {
                candidates: vec![GeminiCandidate {
                    content: GeminiContent {
                        role: Some("model".to_owned()),
                        parts,
                    },
                    finish_reason: finish_reason.map(str::to_owned),
                    index: 0,
                }],
                usage_metadata: usage,
                model_version: Some(self.model.clone()),
                response_id: None,
            },
        )
    }

    fn flush_tool(&mut self, index: u32) -> Option<Bytes> {
        let (name, arguments) = self.tools.remove(&index)?;
        self.tool_order.retain(|open| *open != index);

        let args: Arguments = parse_arguments(&arguments);
        Some(self.chunk(
            vec![GeminiPart {
                function_call: Some(GeminiFunctionCall {
                    name,
                    args: Value::Object(args),
                }),
                ..GeminiPart::default()
            }],
            None,
            None,
        ))
    }

    fn end(&mut self, stop_reason: StopReason, output_tokens: u32, out: &mut Vec<Bytes>) {
        for index in std::mem::take(&mut self.tool_order) {
            out.extend(self.flush_tool(index));
        }
        out.push(self.chunk(
            Vec::new(),
            Some(stop_reason_to_wire(stop_reason)),
            Some(usage_metadata(self.input_tokens, output_tokens)),
        ));
        self.finished = true;
    }
}

impl OutboundTransformer for GeminiOutbound {
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
                out.push(self.chunk(vec![GeminiPart::text(text.clone())], None, None));
            }
            StreamEvent::ThinkingDelta { thinking, .. } => {
                self.started = true;
                out.push(self.chunk(
                    vec![GeminiPart {
                        thought: Some(true),
                        ..GeminiPart::text(thinking.clone())
                    }],
                    None,
                    None,
                ));
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
            StreamEvent::Error { message, code } => {
                out.push(sse::encode(
                    None,
                    &json!({"error": {"code": code.unwrap_or(500), "message": message, "status": "INTERNAL"}}),
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

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: Value) -> CompletionRequest {
        serde_json::from_value::<GeminiRequest>(body).unwrap().into()
    }

    #[test]
    fn parses_contents_and_config() {
        let req = parse(json!({
            "systemInstruction": {"parts": [{"text": "be terse"}, {"text": "be kind"}]},
            "contents": [
                {"role": "user", "parts": [{"text": "hi"}, {"inlineData": {"mimeType": "image/png", "data": "AAAA"}}]},
                {"role": "model", "parts": [{"functionCall": {"name": "lookup", "args": {"q": "x"}}}]},
                {"role": "user", "parts": [{"functionResponse": {"name": "lookup", "response": {"result": 1}}}]}
            ],
            "generationConfig": {"maxOutputTokens": 64, "topK": 5, "stopSequences": ["END"]},
            "tools": [{"functionDeclarations": [{"name": "lookup", "parameters": {
                "type": "OBJECT",
                "properties": {"q": {"type": "STRING"}, "tags": {"type": "ARRAY", "items": {"type": "STRING"}}}
            }}]}]
        }));

        assert_eq!(req.system_prompt.as_deref(), Some("be terse\nbe kind"));
        assert_eq!(req.max_tokens, Some(64));
        assert_eq!(req.top_k, Some(5));
        assert_eq!(req.messages[0].role, Role::User);
        assert_eq!(
            req.messages[0].content[1],
            ContentPart::Image {
                media_type: "image/png".into(),
                data: "AAAA".into()
            }
        );
        assert_eq!(req.messages[1].role, Role::Assistant);
        assert!(matches!(&req.messages[1].content[0], ContentPart::ToolCall { id, name, .. } if id == "lookup" && name == "lookup"));
        assert_eq!(req.messages[2].role, Role::Tool);
        assert_eq!(
            req.messages[2].content[0],
            ContentPart::ToolResult {
                tool_call_id: "lookup".into(),
                content: "{\"result\":1}".into(),
                is_error: None
            }
        );

        let params = &req.tools.as_ref().unwrap()[0].parameters;
        assert_eq!(params["type"], "object");
        assert_eq!(params["properties"]["q"]["type"], "string");
        assert_eq!(params["properties"]["tags"]["items"]["type"], "string");
    }

    #[test]
    fn tool_call_round_trip_preserves_identity() {
        let canonical = parse(json!({
            "contents": [
                {"role": "model", "parts": [{"functionCall": {"name": "search", "args": {"q": "rust", "n": 3}}}]},
                {"role": "user", "parts": [{"functionResponse": {"name": "search", "response": {"content": "ok"}}}]}
            ]
        }));
        let again = parse(serde_json::to_value(GeminiRequest::from(&canonical)).unwrap());

        let ContentPart::ToolCall { id, name, arguments } = &again.messages[0].content[0] else {
            panic!("expected a tool call, got {:?}", again.messages[0].content);
        };
        assert_eq!(id, "search");
        assert_eq!(name, "search");
        assert_eq!(Value::Object(arguments.clone()), json!({"q": "rust", "n": 3}));
        assert_eq!(again.messages[0], canonical.messages[0]);
        assert!(
            matches!(&again.messages[1].content[0], ContentPart::ToolResult { tool_call_id, .. } if tool_call_id == "search")
        );
    }

    #[test]
    fn serializes_with_function_names_for_results() {
        let req = CompletionRequest {
            model: "gemini-2.0-flash".into(),
            system_prompt: Some("sys".into()),
            max_tokens: Some(10),
            messages: vec![
                Message {
                    role: Role::Assistant,
                    content: vec![ContentPart::ToolCall {
                        id: "call_abc".into(),
                        name: "weather".into(),
                        arguments: parse_arguments("{\"city\":\"Oslo\"}"),
                    }],
                    name: None,
                },
                Message {
                    role: Role::Tool,
                    content: vec![ContentPart::ToolResult {
                        tool_call_id: "call_abc".into(),
                        content: "sunny".into(),
                        is_error: None,
                    }],
                    name: None,
                },
            ],
            tools: Some(vec![ToolDefinition {
                name: "weather".into(),
                description: None,
                parameters: json!({"type": "object", "properties": {"city": {"type": "string"}}}),
            }]),
            tool_choice: Some(ToolChoice::Specific { name: "weather".into() }),
            ..CompletionRequest::default()
        };

        let wire = serde_json::to_value(GeminiRequest::from(&req)).unwrap();
        assert!(wire.get("model").is_none());
        assert_eq!(wire["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(wire["generationConfig"], json!({"maxOutputTokens": 10}));
        assert_eq!(wire["contents"][0]["role"], "model");
        assert_eq!(wire["contents"][0]["parts"][0]["functionCall"]["args"]["city"], "Oslo");
        assert_eq!(
            wire["contents"][1]["parts"][0]["functionResponse"],
            json!({"name": "weather", "response": {"content": "sunny"}})
        );
        assert_eq!(wire["tools"][0]["functionDeclarations"][0]["parameters"]["type"], "OBJECT");
        assert_eq!(
            wire["tools"][0]["functionDeclarations"][0]["parameters"]["properties"]["city"]["type"],
            "STRING"
        );
        assert_eq!(
            wire["toolConfig"]["functionCallingConfig"],
            json!({"mode": "ANY", "allowedFunctionNames": ["weather"]})
        );
    }

    #[test]
    fn response_with_function_call_is_tool_use() {
        let resp: CompletionResponse = serde_json::from_value::<GeminiResponse>(json!({
            "candidates": [{"content": {"role": "model", "parts": [
                {"text": "calling"},
                {"functionCall": {"name": "f", "args": {}}}
            ]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 8, "candidatesTokenCount": 2, "totalTokenCount": 10}
        }))
        .unwrap()
        .into();

        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        assert_eq!(resp.usage, Usage { input_tokens: 8, output_tokens: 2 });
        assert!(resp.id.starts_with("msg_"));
        assert_eq!(stop_reason_from_wire(Some("SAFETY")), StopReason::EndTurn);
        assert_eq!(stop_reason_from_wire(Some("MAX_TOKENS")), StopReason::MaxTokens);
    }

    #[test]
    fn serialized_response_uses_gemini_vocabulary() {
        let resp = CompletionResponse {
            id: "msg_1".into(),
            model: "claude".into(),
            content: vec![ContentPart::Text { text: "hi".into() }],
            stop_reason: StopReason::Error,
            stop_sequence: None,
            usage: Usage {
                input_tokens: 1,
                output_tokens: 2,
            },
        };
        let wire = serde_json::to_value(GeminiResponse::from(&resp)).unwrap();
        assert_eq!(wire["candidates"][0]["finishReason"], "OTHER");
        assert_eq!(wire["candidates"][0]["content"]["parts"][0]["text"], "hi");
        assert_eq!(wire["usageMetadata"]["totalTokenCount"], 3);
    }

    #[test]
    fn stream_text_then_function_call() {
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Let me look\"}]}}],\"usageMetadata\":{\"promptTokenCount\":7}}\r\n\r\n",
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"functionCall\":{\"name\":\"search\",\"args\":{\"q\":\"x\"}}}]},\"finishReason\":\"STOP\"}],\"usageMetadata\":{\"promptTokenCount\":7,\"candidatesTokenCount\":5}}\r\n\r\n",
        );

        let mut inbound = GeminiInbound::default();
        let mut events = inbound.transform(body.as_bytes());
        events.extend(inbound.finish());

        assert!(matches!(events[0], StreamEvent::MessageStart { input_tokens: 7, .. }));
        assert_eq!(
            &events[1..],
            &[
                StreamEvent::TextDelta {
                    index: 0,
                    text: "Let me look".into()
                },
                StreamEvent::ContentBlockEnd { index: 0 },
                StreamEvent::ToolCallStart {
                    index: 1,
                    id: "search".into(),
                    name: "search".into()
                },
                StreamEvent::ToolCallDelta {
                    index: 1,
                    arguments_chunk: "{\"q\":\"x\"}".into()
                },
                StreamEvent::ToolCallEnd { index: 1 },
                StreamEvent::MessageEnd {
                    stop_reason: StopReason::ToolUse,
                    output_tokens: 5
                },
            ]
        );
    }

    #[test]
    fn stream_error_chunk_becomes_error_event() {
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Hel\"}]}}]}\r\n\r\n",
            "data: {\"error\":{\"code\":503,\"message\":\"model overloaded\",\"status\":\"UNAVAILABLE\"}}\r\n\r\n",
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"lo\"}]}}]}\r\n\r\n",
        );

        let mut inbound = GeminiInbound::default();
        let mut events = inbound.transform(body.as_bytes());
        events.extend(inbound.finish());

        assert_eq!(events.len(), 3);
        assert_eq!(
            events[2],
            StreamEvent::Error {
                message: "model overloaded".into(),
                code: Some(503)
            }
        );
    }

    #[test]
    fn usage_total_saturates() {
        assert_eq!(usage_metadata(u32::MAX, 7).total_token_count, u32::MAX);
    }

    #[test]
    fn outbound_emits_whole_function_calls() {
        let mut outbound = GeminiOutbound::new("gemini-2.0-flash");
        let mut frames = Vec::new();
        for event in [
            StreamEvent::MessageStart {
                id: "m".into(),
                model: "x".into(),
                input_tokens: 3,
            },
            StreamEvent::ToolCallStart {
                index: 0,
                id: "t".into(),
                name: "f".into(),
            },
            StreamEvent::ToolCallDelta {
                index: 0,
                arguments_chunk: "{\"a\":".into(),
            },
            StreamEvent::ToolCallDelta {
                index: 0,
                arguments_chunk: "1}".into(),
            },
            StreamEvent::ToolCallEnd { index: 0 },
            StreamEvent::MessageEnd {
                stop_reason: StopReason::ToolUse,
                output_tokens: 4,
            },
        ] {
            frames.extend(outbound.transform(&event));
        }

        let mut decoder = SseDecoder::new();
        let chunks: Vec<Value> = frames
            .iter()
            .flat_map(|f| decoder.feed(f))
            .map(|f| serde_json::from_str(&f.data).unwrap())
            .collect();

        assert_eq!(chunks.len(), 2);
        assert_eq!(
            chunks[0]["candidates"][0]["content"]["parts"][0]["functionCall"],
            json!({"name": "f", "args": {"a": 1}})
        );
        assert_eq!(chunks[1]["candidates"][0]["finishReason"], "STOP");
        assert_eq!(chunks[1]["usageMetadata"]["totalTokenCount"], 7);
    }
}
