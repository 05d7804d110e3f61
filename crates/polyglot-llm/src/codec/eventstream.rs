//! AWS binary event-stream framing
//!
//! ```text
//! [total_len:u32][headers_len:u32][prelude_crc:u32][headers][payload][message_crc:u32]
//! ```
//!
//! All integers are big-endian. Each header is
//! `[name_len:u8][name][type:u8][value]`; only string values (type 7,
//! `[len:u16][utf8]`) are understood.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::{BufMut, Bytes, BytesMut};
use serde_json::Value;

const PRELUDE_LEN: usize = 12;
const CRC_LEN: usize = 4;
const MIN_FRAME_LEN: usize = PRELUDE_LEN + CRC_LEN;
const STRING_HEADER: u8 = 7;

/// One decoded frame
#[derive(Debug, Clone, PartialEq)]
pub struct EventStreamMessage {
    /// `:event-type`, else `:exception-type`, else `unknown`
    pub event_type: String,
    /// String headers in the frame
    pub headers: HashMap<String, String>,
    /// JSON payload
    pub payload: Value,
}

impl EventStreamMessage {
    /// Whether the frame reports a service exception
    pub fn is_exception(&self) -> bool {
        self.headers.get(":message-type").is_some_and(|t| t == "exception")
            || self.headers.contains_key(":exception-type")
    }

    /// Decode a `chunk` payload of the form `{"bytes": "<base64 json>"}`
    pub fn chunk_json(&self) -> Option<Value> {
        let encoded = self.payload.get("bytes")?.as_str()?;

        let decoded = STANDARD
            .decode(encoded)
            .map_err(|e| tracing::debug!(error = %e, "dropping chunk with invalid base64"))
            .ok()?;

        serde_json::from_slice(&decoded)
            .map_err(|e| tracing::debug!(error = %e, "dropping chunk with invalid JSON"))
            .ok()
    }
}

/// Incremental event-stream decoder
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    buffer: BytesMut,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every frame completed by them
    ///
    /// A frame is only decoded once all `total_len` bytes have arrived.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<EventStreamMessage> {
        self.buffer.extend_from_slice(chunk);

        let mut messages = Vec::new();
        while let Some(total_len) = read_u32(&self.buffer, 0).map(|n| n as usize) {
            if total_len < MIN_FRAME_LEN {
                // No way to find the next frame boundary
                tracing::warn!(total_len, "discarding event stream with corrupt prelude");
                self.buffer.clear();
                break;
            }

            if self.buffer.len() < total_len {
                break;
            }

            let frame = self.buffer.split_to(total_len).freeze();
            messages.extend(decode_frame(&frame));
        }
        messages
    }

    /// Bytes still waiting for the rest of their frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    let bytes = buf.get(at..at + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn decode_frame(frame: &[u8]) -> Option<EventStreamMessage> {
    let total_len = frame.len();
    let headers_len = read_u32(frame, 4)? as usize;
    let prelude_crc = read_u32(frame, 8)?;
    let message_crc = read_u32(frame, total_len - CRC_LEN)?;

    if crc32fast::hash(&frame[..8]) != prelude_crc || crc32fast::hash(&frame[..total_len - CRC_LEN]) != message_crc {
        tracing::debug!(total_len, "dropping event stream frame with bad checksum");
        return None;
    }

    let headers_end = PRELUDE_LEN + headers_len;
    if headers_end > total_len - CRC_LEN {
        tracing::debug!(headers_len, total_len, "dropping event stream frame with oversized headers");
        return None;
    }

    let headers = parse_headers(&frame[PRELUDE_LEN..headers_end]);
    let payload = serde_json::from_slice(&frame[headers_end..total_len - CRC_LEN])
        .map_err(|e| tracing::debug!(error = %e, "dropping event stream frame with invalid payload"))
        .ok()?;

    let event_type = headers
        .get(":event-type")
        .or_else(|| headers.get(":exception-type"))
        .cloned()
        .unwrap_or_else(|| "unknown".to_string());

    Some(EventStreamMessage {
        event_type,
        headers,
        payload,
    })
}

/// Read string headers; stops at the first non-string value type
fn parse_headers(mut block: &[u8]) -> HashMap<String, String> {
    let mut headers = HashMap::new();

    while let Some((&name_len, rest)) = block.split_first() {
        let name_len = usize::from(name_len);
        let Some((name, rest)) = rest.split_at_checked(name_len) else { break };
        let Some((&value_type, rest)) = rest.split_first() else { break };

        if value_type != STRING_HEADER {
            break;
        }

        let Some((len, rest)) = rest.split_at_checked(2) else { break };
        let value_len = usize::from(u16::from_be_bytes([len[0], len[1]]));
        let Some((value, rest)) = rest.split_at_checked(value_len) else { break };

        headers.insert(
            String::from_utf8_lossy(name).into_owned(),
            String::from_utf8_lossy(value).into_owned(),
        );
        block = rest;
    }

    headers
}

/// Encode a frame with string headers and a raw payload
#[allow(clippy::cast_possible_truncation)]
pub fn encode_frame(headers: &[(&str, &str)], payload: &[u8]) -> Bytes {
    let mut header_block = BytesMut::new();
    for (name, value) in headers {
        header_block.put_u8(name.len() as u8);
        header_block.put_slice(name.as_bytes());
        header_block.put_u8(STRING_HEADER);
        header_block.put_u16(value.len() as u16);
        header_block.put_slice(value.as_bytes());
    }

    let total_len = PRELUDE_LEN + header_block.len() + payload.len() + CRC_LEN;

    let mut frame = BytesMut::with_capacity(total_len);
    frame.put_u32(total_len as u32);
    frame.put_u32(header_block.len() as u32);
    let prelude_crc = crc32fast::hash(&frame);
    frame.put_u32(prelude_crc);
    frame.put_slice(&header_block);
    frame.put_slice(payload);
    let message_crc = crc32fast::hash(&frame);
    frame.put_u32(message_crc);

    frame.freeze()
}

/// Encode a Bedrock `chunk` event wrapping `event` as base64 JSON
pub fn encode_chunk(event: &Value) -> Bytes {
    let payload = serde_json::json!({ "bytes": STANDARD.encode(event.to_string()) });
    encode_frame(
        &[
            (":event-type", "chunk"),
            (":content-type", "application/json"),
            (":message-type", "event"),
        ],
        payload.to_string().as_bytes(),
    )
}

/// Encode an exception frame
pub fn encode_exception(exception_type: &str, message: &str) -> Bytes {
    let payload = serde_json::json!({ "message": message });
    encode_frame(
        &[
            (":exception-type", exception_type),
            (":content-type", "application/json"),
            (":message-type", "exception"),
        ],
        payload.to_string().as_bytes(),
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn frame_split_across_chunks_waits_for_all_bytes() {
        let frame = encode_chunk(&json!({"type": "message_stop"}));
        let (head, tail) = frame.split_at(frame.len() / 2);

        let mut decoder = EventStreamDecoder::new();
        assert!(decoder.feed(head).is_empty());
        assert_eq!(decoder.pending(), head.len());

        let messages = decoder.feed(tail);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].event_type, "chunk");
        assert_eq!(messages[0].chunk_json(), Some(json!({"type": "message_stop"})));
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn prelude_split_inside_length_field() {
        let frame = encode_chunk(&json!({"n": 1}));

        let mut decoder = EventStreamDecoder::new();
        assert!(decoder.feed(&frame[..3]).is_empty());
        assert_eq!(decoder.feed(&frame[3..]).len(), 1);
    }

    #[test]
    fn multiple_frames_in_one_chunk_decode_in_order() {
        let mut bytes = BytesMut::new();
        for n in 0..3 {
            bytes.extend_from_slice(&encode_chunk(&json!({"n": n})));
        }

        let mut decoder = EventStreamDecoder::new();
        let values: Vec<_> = decoder.feed(&bytes).iter().filter_map(EventStreamMessage::chunk_json).collect();
        assert_eq!(values, vec![json!({"n": 0}), json!({"n": 1}), json!({"n": 2})]);
    }

    #[test]
    fn exception_type_used_when_event_type_missing() {
        let mut decoder = EventStreamDecoder::new();
        let messages = decoder.feed(&encode_exception("throttlingException", "slow down"));
        assert_eq!(messages[0].event_type, "throttlingException");
        assert!(messages[0].is_exception());
        assert_eq!(messages[0].payload["message"], "slow down");
    }

    #[test]
    fn missing_type_headers_yield_unknown() {
        let mut decoder = EventStreamDecoder::new();
        let messages = decoder.feed(&encode_frame(&[], b"{}"));
        assert_eq!(messages[0].event_type, "unknown");
    }

    #[test]
    fn unsupported_header_type_stops_header_parsing() {
        // Header block: ":event-type"=chunk, then a bool header (type 0), then a string header
        let mut block = BytesMut::new();
        block.put_u8(11);
        block.put_slice(b":event-type");
        block.put_u8(STRING_HEADER);
        block.put_u16(5);
        block.put_slice(b"chunk");
        block.put_u8(4);
        block.put_slice(b"flag");
        block.put_u8(0);
        block.put_u8(5);
        block.put_slice(b"after");
        block.put_u8(STRING_HEADER);
        block.put_u16(1);
        block.put_slice(b"x");

        let headers = parse_headers(&block);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[":event-type"], "chunk");
    }

    #[test]
    fn bad_payloads_are_dropped_without_stopping_the_stream() {
        let mut bytes = BytesMut::new();
        bytes.extend_from_slice(&encode_frame(&[(":event-type", "chunk")], b"not json"));
        bytes.extend_from_slice(&encode_frame(&[(":event-type", "chunk")], br#"{"bytes":"!!!"}"#));
        bytes.extend_from_slice(&encode_chunk(&json!({"ok": true})));

        let mut decoder = EventStreamDecoder::new();
        let messages = decoder.feed(&bytes);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].chunk_json(), None);
        assert_eq!(messages[1].chunk_json(), Some(json!({"ok": true})));
    }

    #[test]
    fn corrupted_checksum_drops_frame() {
        let mut frame = BytesMut::from(&encode_chunk(&json!({"a": 1}))[..]);
        let last = frame.len() - 1;
        frame[last] ^= 0xff;

        let mut decoder = EventStreamDecoder::new();
        assert!(decoder.feed(&frame).is_empty());
        assert_eq!(decoder.pending(), 0);
    }
}
