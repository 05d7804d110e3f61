//! Streaming translation pipeline
//!
//! Upstream bytes -> target inbound transformer -> canonical events ->
//! source outbound transformer -> client bytes. One upstream read per
//! step; dropping the returned stream drops the upstream body.

use std::convert::Infallible;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::adapter::{InboundTransformer, OutboundTransformer};
use crate::types::StreamEvent;

/// Paired transformers for one streamed call
pub struct StreamPipeline {
    inbound: Box<dyn InboundTransformer>,
    outbound: Box<dyn OutboundTransformer>,
}

impl StreamPipeline {
    pub fn new(inbound: Box<dyn InboundTransformer>, outbound: Box<dyn OutboundTransformer>) -> Self {
        Self { inbound, outbound }
    }

    /// Translate one upstream chunk
    pub fn process_chunk(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        let events = self.inbound.transform(chunk);
        self.encode(&events)
    }

    /// Surface a failed upstream read as a canonical error
    pub fn fail(&mut self, message: String) -> Vec<Bytes> {
        self.encode(&[StreamEvent::Error { message, code: None }])
    }

    /// Flush both transformers, inbound first
    pub fn finish(&mut self) -> Vec<Bytes> {
        let events = self.inbound.finish();
        let mut out = self.encode(&events);
        out.extend(self.outbound.finish());
        out
    }

    fn encode(&mut self, events: &[StreamEvent]) -> Vec<Bytes> {
        events.iter().flat_map(|event| self.outbound.transform(event)).collect()
    }

    /// Drive `upstream` through the pipeline
    pub fn into_stream<S, E>(mut self, upstream: S) -> impl Stream<Item = Result<Bytes, Infallible>> + Send
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        async_stream::stream! {
            let mut upstream = std::pin::pin!(upstream);

            while let Some(chunk) = upstream.next().await {
                match chunk {
                    Ok(bytes) => {
                        for frame in self.process_chunk(&bytes) {
                            yield Ok(frame);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "upstream stream failed");
                        for frame in self.fail(e.to_string()) {
                            yield Ok(frame);
                        }
                        break;
                    }
                }
            }

            for frame in self.finish() {
                yield Ok(frame);
            }
        }
    }
}

impl std::fmt::Debug for StreamPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamPipeline").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use futures_util::stream;
    use serde_json::Value;

    use super::*;
    use crate::codec::SseDecoder;
    use crate::convert::anthropic::{AnthropicInbound, AnthropicOutbound};
    use crate::convert::openai::{OpenAiInbound, OpenAiOutbound};

    fn openai_to_anthropic() -> StreamPipeline {
        StreamPipeline::new(
            Box::new(OpenAiInbound::default()),
            Box::new(AnthropicOutbound::new("claude-sonnet-4-6", "msg_test")),
        )
    }

    fn events_of(bytes: &[Bytes]) -> Vec<(String, Value)> {
        let mut decoder = SseDecoder::new();
        bytes
            .iter()
            .flat_map(|b| decoder.feed(b))
            .map(|frame| {
                (
                    frame.event.unwrap_or_default(),
                    serde_json::from_str(&frame.data).unwrap(),
                )
            })
            .collect()
    }

    const OPENAI_TEXT_THEN_TOOL: &[&str] = &[
        "data: {\"id\":\"c1\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Let me check\"}}]}\n\n",
        "data: {\"id\":\"c1\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"type\":\"function\",\"function\":{\"name\":\"get_weather\",\"arguments\":\"\"}}]}}]}\n\n",
        "data: {\"id\":\"c1\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"city\\\":\\\"Paris\\\"}\"}}]}}]}\n\n",
        "data: {\"id\":\"c1\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n",
        "data: {\"id\":\"c1\",\"model\":\"gpt-4o\",\"choices\":[],\"usage\":{\"prompt_tokens\":12,\"completion_tokens\":7,\"total_tokens\":19}}\n\n",
        "data: [DONE]\n\n",
    ];

    #[tokio::test]
    async fn openai_text_then_tool_becomes_anthropic_lifecycle() {
        let upstream = stream::iter(
            OPENAI_TEXT_THEN_TOOL
                .iter()
                .map(|chunk| Ok::<_, std::io::Error>(Bytes::from_static(chunk.as_bytes()))),
        );
        let frames: Vec<Bytes> = openai_to_anthropic()
            .into_stream(upstream)
            .map(|frame| match frame {
                Ok(bytes) => bytes,
                Err(never) => match never {},
            })
            .collect()
            .await;

        let events = events_of(&frames);
        let names: Vec<&str> = events.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(
            names,
            [
                "message_start",
                "ping",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );

        assert_eq!(events[2].1["content_block"]["type"], "text");
        assert_eq!(events[5].1["index"], 1);
        assert_eq!(events[5].1["content_block"]["type"], "tool_use");
        assert_eq!(events[5].1["content_block"]["name"], "get_weather");
        assert_eq!(events[6].1["delta"]["partial_json"], "{\"city\":\"Paris\"}");
        assert_eq!(events[8].1["delta"]["stop_reason"], "tool_use");
        assert_eq!(events[8].1["usage"]["output_tokens"], 7);
    }

    #[test]
    fn chunk_boundaries_do_not_matter() {
        let joined: String = OPENAI_TEXT_THEN_TOOL.concat();
        let bytes = joined.as_bytes();

        let mut whole = openai_to_anthropic();
        let mut expected = whole.process_chunk(bytes);
        expected.extend(whole.finish());

        let mut split = openai_to_anthropic();
        let mut actual = Vec::new();
        for piece in bytes.chunks(7) {
            actual.extend(split.process_chunk(piece));
        }
        actual.extend(split.finish());

        assert_eq!(events_of(&expected), events_of(&actual));
    }

    #[tokio::test]
    async fn upstream_failure_becomes_client_error_frame() {
        let upstream = stream::iter(vec![
            Ok(Bytes::from_static(
                b"event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"m\",\"model\":\"c\",\"usage\":{\"input_tokens\":1,\"output_tokens\":0}}}\n\n",
            )),
            Err("connection reset"),
        ]);
        let pipeline = StreamPipeline::new(
            Box::new(AnthropicInbound::default()),
            Box::new(OpenAiOutbound::new("gpt-4o", "msg_1")),
        );

        let frames: Vec<Bytes> = pipeline
            .into_stream(upstream)
            .filter_map(|frame| async move { frame.ok() })
            .collect()
            .await;
        let text: String = frames.iter().map(|b| String::from_utf8_lossy(b).into_owned()).collect();

        assert!(text.contains("connection reset"));
        assert!(text.trim_end().ends_with("data: [DONE]"));
        assert_eq!(text.matches("[DONE]").count(), 1);
    }
}
