//! Event-Stream Decoder
//!
//! Turns arbitrarily sliced chunks of a `text/event-stream` body into
//! [`ProtocolEvent`]s, strictly in arrival order.
//!
//! # Wire Format
//!
//! ```text
//! event: token
//! data: {"text": "Hel"}
//!
//! event: final
//! data: {"response": "Hello", "tool_calls": []}
//!
//! ```
//!
//! - `\r\n` and bare `\r` are normalized to `\n` before boundaries are
//!   searched, including when a chunk ends between `\r` and `\n`.
//! - A blank line ends a record. Multiple `data:` lines are joined with `\n`.
//! - Lines starting with `:` are comments.
//! - UTF-8 sequences split across chunks are reassembled.
//! - A record whose JSON does not parse is dropped. If it was a terminal
//!   record that is remembered, so a stream that then closes is reported as
//!   [`ProtocolViolation::MalformedTerminal`].
//! - Once a terminal event is produced, everything after it is discarded.
//! - Pending text that grows past the limit without a record boundary stops
//!   the decoder with [`ProtocolViolation::RecordTooLarge`].

use serde_json::Value;

use super::event::ProtocolEvent;
use crate::error::ProtocolViolation;

/// Default bound on buffered text awaiting a record boundary
pub const MAX_PENDING_BYTES: usize = 16 * 1024 * 1024;

/// Resumable decoder for one turn's event stream
#[derive(Debug)]
pub struct StreamDecoder {
    /// Bytes of an incomplete UTF-8 sequence from the previous chunk
    utf8_tail: Vec<u8>,
    /// Last normalized character was a `\r`; a following `\n` is swallowed
    pending_cr: bool,
    /// Normalized text not yet split into records
    buffer: String,
    /// Prefix of `buffer` already known to hold no record boundary
    scanned: usize,
    /// Bound on `buffer`
    limit: usize,
    /// Set once `buffer` outgrew `limit`
    overflow: Option<ProtocolViolation>,
    /// A terminal event has been produced
    terminated: bool,
    /// Events produced so far
    events_seen: usize,
    /// Last terminal record that failed to parse
    malformed_terminal: Option<ProtocolViolation>,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::with_limit(MAX_PENDING_BYTES)
    }
}

impl StreamDecoder {
    /// Create a decoder for a fresh stream
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder with a custom bound on buffered text
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            utf8_tail: Vec::new(),
            pending_cr: false,
            buffer: String::new(),
            scanned: 0,
            limit,
            terminated: false,
            events_seen: 0,
            malformed_terminal: None,
            overflow: None,
        }
    }

    /// Violation that stopped decoding early, if any
    #[must_use]
    pub fn overflow(&self) -> Option<&ProtocolViolation> {
        self.overflow.as_ref()
    }

    /// Whether a terminal event has been produced
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Number of events produced so far
    #[must_use]
    pub fn events_seen(&self) -> usize {
        self.events_seen
    }

    /// Feed one chunk, returning every event it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ProtocolEvent> {
        if self.terminated || self.overflow.is_some() {
            return Vec::new();
        }
        let text = self.take_utf8(chunk);
        self.normalize_into_buffer(&text);
        let events = self.drain_records();
        if !self.terminated && self.buffer.len() > self.limit {
            tracing::warn!(limit = self.limit, "Event record too large, stopping decoder");
            self.overflow = Some(ProtocolViolation::RecordTooLarge { limit: self.limit });
            self.clear_pending();
        }
        events
    }

    /// Signal end of input, flushing a trailing record with no blank line
    pub fn finish(&mut self) -> Vec<ProtocolEvent> {
        if self.terminated || self.overflow.is_some() {
            return Vec::new();
        }
        if !self.utf8_tail.is_empty() {
            let tail = String::from_utf8_lossy(&self.utf8_tail).into_owned();
            self.utf8_tail.clear();
            self.normalize_into_buffer(&tail);
        }

        let mut events = self.drain_records();
        if !self.terminated && !self.buffer.trim().is_empty() {
            let record = std::mem::take(&mut self.buffer);
            if let Some(event) = self.parse_record(&record) {
                self.accept(event, &mut events);
            }
        }
        self.clear_pending();
        events
    }

    /// Check that the stream ended properly
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolViolation`] if no terminal event was produced.
    pub fn ensure_terminal(&self) -> Result<(), ProtocolViolation> {
        if self.terminated {
            return Ok(());
        }
        if let Some(overflow) = &self.overflow {
            return Err(overflow.clone());
        }
        Err(self
            .malformed_terminal
            .clone()
            .unwrap_or(ProtocolViolation::MissingTerminal {
                events_seen: self.events_seen,
            }))
    }

    fn take_utf8(&mut self, chunk: &[u8]) -> String {
        self.utf8_tail.extend_from_slice(chunk);
        let mut out = String::with_capacity(self.utf8_tail.len());

        loop {
            match std::str::from_utf8(&self.utf8_tail) {
                Ok(s) => {
                    out.push_str(s);
                    self.utf8_tail.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(std::str::from_utf8(&self.utf8_tail[..valid]).unwrap_or_default());
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.utf8_tail.drain(..valid + bad);
                        }
                        None => {
                            // Incomplete sequence at the end; wait for more bytes.
                            self.utf8_tail.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    fn normalize_into_buffer(&mut self, text: &str) {
        for c in text.chars() {
            if self.pending_cr {
                self.pending_cr = false;
                if c == '\n' {
                    continue;
                }
            }
            if c == '\r' {
                self.buffer.push('\n');
                self.pending_cr = true;
            } else {
                self.buffer.push(c);
            }
        }
    }

    fn drain_records(&mut self) -> Vec<ProtocolEvent> {
        let mut events = Vec::new();
        while !self.terminated {
            let Some(found) = self.buffer[self.scanned..].find("\n\n") else {
                // A boundary may still start at a trailing newline.
                self.scanned = self.buffer.len() - usize::from(self.buffer.ends_with('\n'));
                break;
            };
            let end = self.scanned + found + 2;
            let record: String = self.buffer.drain(..end).collect();
            self.scanned = 0;
            if let Some(event) = self.parse_record(&record) {
                self.accept(event, &mut events);
            }
        }
        events
    }

    fn accept(&mut self, event: ProtocolEvent, events: &mut Vec<ProtocolEvent>) {
        self.events_seen += 1;
        if event.is_terminal() {
            self.terminated = true;
            self.clear_pending();
            self.utf8_tail.clear();
        }
        events.push(event);
    }

    fn clear_pending(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }

    fn parse_record(&mut self, record: &str) -> Option<ProtocolEvent> {
        let mut name: Option<&str> = None;
        let mut data_lines: Vec<&str> = Vec::new();

        for line in record.split('\n') {
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => name = Some(value.trim()),
                "data" => data_lines.push(value),
                _ => {}
            }
        }

        if data_lines.is_empty() {
            return None;
        }
        let data = data_lines.join("\n");
        if data.trim().is_empty() {
            return None;
        }

        let value = match serde_json::from_str::<Value>(&data) {
            Ok(value) => value,
            Err(e) => {
                self.note_malformed(name, &e.to_string());
                return None;
            }
        };

        let value = Self::tag_payload(name, value)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match serde_json::from_value::<ProtocolEvent>(value) {
            Ok(event) => Some(event),
            Err(e) => {
                self.note_malformed(Some(&kind), &e.to_string());
                None
            }
        }
    }

    /// Fold the `event:` name into the payload as `type`
    fn tag_payload(name: Option<&str>, value: Value) -> Option<Value> {
        match (name, value) {
            (Some(name), Value::Object(mut map)) => {
                map.insert("type".to_string(), Value::String(name.to_string()));
                Some(Value::Object(map))
            }
            (None, Value::Object(map)) if map.contains_key("type") => Some(Value::Object(map)),
            // Bare string payloads for the simple event kinds.
            (Some(name), Value::String(s)) => {
                let field = match name {
                    "token" => "text",
                    "status" => "message",
                    "error" => "detail",
                    "final" => "response",
                    _ => return None,
                };
                let mut map = serde_json::Map::new();
                map.insert("type".to_string(), Value::String(name.to_string()));
                map.insert(field.to_string(), Value::String(s));
                Some(Value::Object(map))
            }
            _ => None,
        }
    }

    fn note_malformed(&mut self, name: Option<&str>, reason: &str) {
        match name {
            Some(event) if ProtocolEvent::is_terminal_name(event) => {
                tracing::warn!(event = %event, reason = %reason, "Dropped malformed terminal record");
                self.malformed_terminal = Some(ProtocolViolation::MalformedTerminal {
                    event: event.to_string(),
                    reason: reason.to_string(),
                });
            }
            _ => {
                tracing::debug!(reason = %reason, "Dropped malformed record");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::event::FinalPayload;
    use pretty_assertions::assert_eq;

    const STREAM: &str = "event: status\r\ndata: {\"message\": \"Thinking\"}\r\n\r\n\
: keep-alive\r\n\r\n\
event: token\r\ndata: {\"text\": \"caf\u{e9} \"}\r\n\r\n\
event: token\ndata: {\"text\": \"ok\"}\n\n\
event: final\ndata: {\"response\": \"caf\u{e9} ok\"}\n\n";

    fn decode_all(chunks: &[&[u8]]) -> Vec<ProtocolEvent> {
        let mut decoder = StreamDecoder::new();
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(decoder.push(chunk));
        }
        events.extend(decoder.finish());
        events
    }

    #[test]
    fn test_decodes_whole_stream() {
        let events = decode_all(&[STREAM.as_bytes()]);
        assert_eq!(
            events,
            vec![
                ProtocolEvent::Status {
                    message: "Thinking".to_string(),
                    tool_name: None
                },
                ProtocolEvent::Token {
                    text: "caf\u{e9} ".to_string()
                },
                ProtocolEvent::Token {
                    text: "ok".to_string()
                },
                ProtocolEvent::Final(FinalPayload::new("caf\u{e9} ok")),
            ]
        );
    }

    #[test]
    fn test_every_two_way_split_matches_unsplit() {
        let bytes = STREAM.as_bytes();
        let expected = decode_all(&[bytes]);
        for split in 0..=bytes.len() {
            let (a, b) = bytes.split_at(split);
            assert_eq!(decode_all(&[a, b]), expected, "split at {split}");
        }
    }

    #[test]
    fn test_byte_at_a_time_matches_unsplit() {
        let bytes = STREAM.as_bytes();
        let expected = decode_all(&[bytes]);
        let chunks: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(decode_all(&chunks), expected);
    }

    #[test]
    fn test_cr_split_from_lf_is_one_newline() {
        let mut decoder = StreamDecoder::new();
        assert!(decoder.push(b"event: token\r").is_empty());
        assert!(decoder.push(b"\ndata: {\"text\": \"a\"}\r").is_empty());
        let events = decoder.push(b"\n\r\n");
        assert_eq!(
            events,
            vec![ProtocolEvent::Token {
                text: "a".to_string()
            }]
        );
    }

    #[test]
    fn test_multiline_data_is_joined() {
        let mut decoder = StreamDecoder::new();
        let events = decoder.push(b"event: token\ndata: {\"text\":\ndata: \"x\"}\n\n");
        assert_eq!(
            events,
            vec![ProtocolEvent::Token {
                text: "x".to_string()
            }]
        );
    }

    #[test]
    fn test_finish_flushes_partial_terminal() {
        let mut decoder = StreamDecoder::new();
        assert!(decoder
            .push(b"event: final\ndata: {\"response\": \"done\"}")
            .is_empty());
        let events = decoder.finish();
        assert_eq!(events, vec![ProtocolEvent::Final(FinalPayload::new("done"))]);
        assert!(decoder.ensure_terminal().is_ok());
    }

    #[test]
    fn test_terminal_stops_decoding() {
        let mut decoder = StreamDecoder::new();
        let events = decoder.push(
            b"event: error\ndata: {\"detail\": \"quota\"}\n\nevent: token\ndata: {\"text\": \"late\"}\n\n",
        );
        assert_eq!(
            events,
            vec![ProtocolEvent::Error {
                detail: "quota".to_string()
            }]
        );
        assert!(decoder.push(b"event: token\ndata: {\"text\": \"later\"}\n\n").is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_malformed_record_is_dropped() {
        let mut decoder = StreamDecoder::new();
        let events = decoder.push(
            b"event: token\ndata: {not json\n\nevent: token\ndata: {\"text\": \"b\"}\n\n",
        );
        assert_eq!(
            events,
            vec![ProtocolEvent::Token {
                text: "b".to_string()
            }]
        );
    }

    #[test]
    fn test_missing_terminal_is_violation() {
        let mut decoder = StreamDecoder::new();
        decoder.push(b"event: status\ndata: {\"message\": \"a\"}\n\n");
        decoder.push(b"event: status\ndata: {\"message\": \"b\"}\n\n");
        decoder.finish();
        assert_eq!(
            decoder.ensure_terminal(),
            Err(ProtocolViolation::MissingTerminal { events_seen: 2 })
        );
    }

    #[test]
    fn test_malformed_final_is_reported() {
        let mut decoder = StreamDecoder::new();
        decoder.push(b"event: final\ndata: {\"response\": \n\n");
        decoder.finish();
        assert!(matches!(
            decoder.ensure_terminal(),
            Err(ProtocolViolation::MalformedTerminal { ref event, .. }) if event == "final"
        ));
    }

    #[test]
    fn test_final_with_null_fields_terminates() {
        let mut decoder = StreamDecoder::new();
        let events = decoder.push(
            b"event: final\ndata: {\"response\": \"ok\", \"tool_calls\": null, \"usage\": null}\n\n",
        );
        assert_eq!(events, vec![ProtocolEvent::Final(FinalPayload::new("ok"))]);
        assert_eq!(decoder.ensure_terminal(), Ok(()));

        let mut decoder = StreamDecoder::new();
        let events = decoder.push(b"event: final\ndata: {\"response\": null}\n\n");
        assert_eq!(events, vec![ProtocolEvent::Final(FinalPayload::default())]);
        assert_eq!(decoder.ensure_terminal(), Ok(()));
    }

    #[test]
    fn test_large_record_in_small_chunks() {
        let text = "x".repeat(10_000);
        let record = format!("event: final\ndata: {{\"response\": \"{text}\"}}\n\n");
        let mut decoder = StreamDecoder::new();
        let mut events = Vec::new();
        for chunk in record.as_bytes().chunks(3) {
            events.extend(decoder.push(chunk));
        }
        assert_eq!(events, vec![ProtocolEvent::Final(FinalPayload::new(text))]);
    }

    #[test]
    fn test_boundary_split_across_pushes() {
        let mut decoder = StreamDecoder::new();
        assert!(decoder.push(b"event: token\ndata: {\"text\": \"a\"}\n").is_empty());
        let events = decoder.push(b"\nevent: token\ndata: {\"text\": \"b\"}\n\n");
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_oversized_record_stops_decoder() {
        let mut decoder = StreamDecoder::with_limit(64);
        assert!(decoder.push(b"event: token\ndata: {\"text\": \"").is_empty());
        assert!(decoder.overflow().is_none());
        assert!(decoder.push(&[b'a'; 100]).is_empty());
        assert_eq!(
            decoder.overflow(),
            Some(&ProtocolViolation::RecordTooLarge { limit: 64 })
        );
        assert!(decoder.push(b"\"}\n\n").is_empty());
        assert!(decoder.finish().is_empty());
        assert_eq!(
            decoder.ensure_terminal(),
            Err(ProtocolViolation::RecordTooLarge { limit: 64 })
        );
    }

    #[test]
    fn test_comment_and_empty_records_ignored() {
        let mut decoder = StreamDecoder::new();
        assert!(decoder.push(b": ping\n\n\n\nevent: token\n\n").is_empty());
        assert_eq!(decoder.events_seen(), 0);
    }

    #[test]
    fn test_bare_string_token_payload() {
        let mut decoder = StreamDecoder::new();
        let events = decoder.push(b"event: token\ndata: \"hi\"\n\n");
        assert_eq!(
            events,
            vec![ProtocolEvent::Token {
                text: "hi".to_string()
            }]
        );
    }
}
