//! Server-Sent Events

use bytes::{Bytes, BytesMut};
use serde::Serialize;

/// Terminal frame used by the `OpenAI` family
pub const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

/// One decoded SSE frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` line, if present
    pub event: Option<String>,
    /// Value of the `data:` line
    pub data: String,
}

impl SseFrame {
    /// Whether this is the `[DONE]` sentinel
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

/// Incremental SSE decoder
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every frame completed by them
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some((end, delimiter)) = frame_boundary(&self.buffer) {
            let raw = self.buffer.split_to(end + delimiter);
            if let Some(frame) = parse_frame(&raw[..end]) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing frame that never got its blank line
    pub fn finish(&mut self) -> Option<SseFrame> {
        let rest = self.buffer.split();
        parse_frame(&rest)
    }
}

/// Earliest blank-line delimiter as `(frame_end, delimiter_len)`
fn frame_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = find(buf, b"\n\n").map(|at| (at, 2));
    let crlf = find(buf, b"\r\n\r\n").map(|at| (at, 4));

    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if b.0 < a.0 { b } else { a }),
        (a, b) => a.or(b),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Parse one frame; the last `event:` and `data:` lines win
fn parse_frame(raw: &[u8]) -> Option<SseFrame> {
    let text = String::from_utf8_lossy(raw);

    let mut event = None;
    let mut data = None;

    for line in text.lines() {
        if let Some(value) = field(line, "event:") {
            event = Some(value.to_string());
        } else if let Some(value) = field(line, "data:") {
            data = Some(value.to_string());
        }
    }

    data.map(|data| SseFrame { event, data })
}

fn field<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    line.strip_prefix(name).map(|value| value.strip_prefix(' ').unwrap_or(value))
}

/// Encode a frame with an optional event name and a JSON payload
pub fn encode<T: Serialize>(event: Option<&str>, data: &T) -> Bytes {
    let json = serde_json::to_string(data).unwrap_or_default();

    let mut out = String::with_capacity(json.len() + 32);
    if let Some(event) = event {
        out.push_str("event: ");
        out.push_str(event);
        out.push('\n');
    }
    out.push_str("data: ");
    out.push_str(&json);
    out.push_str("\n\n");

    Bytes::from(out)
}

/// The `data: [DONE]` sentinel frame
pub const fn done() -> Bytes {
    Bytes::from_static(DONE_FRAME)
}
