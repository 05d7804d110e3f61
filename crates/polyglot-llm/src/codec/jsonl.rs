//! Newline-delimited JSON

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use serde_json::Value;

/// Incremental JSON-Lines decoder
#[derive(Debug, Default)]
pub struct JsonLinesDecoder {
    buffer: BytesMut,
}

impl JsonLinesDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every complete line that parsed
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.buffer.extend_from_slice(chunk);

        let mut values = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(newline + 1);
            values.extend(parse_line(&line[..newline]));
        }
        values
    }

    /// Parse the trailing unterminated line, if any
    pub fn finish(&mut self) -> Option<Value> {
        let rest = self.buffer.split();
        parse_line(&rest)
    }
}

fn parse_line(line: &[u8]) -> Option<Value> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_slice(line) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(error = %e, "skipping malformed JSON line");
            None
        }
    }
}

/// Encode one value as a JSON line
pub fn encode<T: Serialize>(value: &T) -> Bytes {
    let mut line = serde_json::to_vec(value).unwrap_or_default();
    line.push(b'\n');
    Bytes::from(line)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn lines_split_across_chunks() {
        let mut decoder = JsonLinesDecoder::new();
        assert!(decoder.feed(b"{\"a\":").is_empty());
        assert_eq!(decoder.feed(b"1}\n{\"b\":2}\n"), vec![json!({"a": 1}), json!({"b": 2})]);
    }

    #[test]
    fn malformed_and_blank_lines_skipped() {
        let mut decoder = JsonLinesDecoder::new();
        let values = decoder.feed(b"not json\n\n  \r\n{\"ok\":true}\r\n");
        assert_eq!(values, vec![json!({"ok": true})]);
    }

    #[test]
    fn trailing_line_parsed_at_finish() {
        let mut decoder = JsonLinesDecoder::new();
        assert!(decoder.feed(b"{\"done\":true}").is_empty());
        assert_eq!(decoder.finish(), Some(json!({"done": true})));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn encode_appends_newline() {
        assert_eq!(&encode(&json!({"x": 1}))[..], b"{\"x\":1}\n");
    }
}
