//! Turn Reconciliation
//!
//! Pure functions that turn a final payload plus the streamed token buffer
//! into the one assistant [`Message`] a turn commits.

use std::time::Duration;

use crate::conversation::Message;
use crate::streaming::FinalPayload;

/// Canonical answer text: the server's response, or the token buffer if empty
#[must_use]
pub fn canonical_content<'a>(response: &'a str, buffer: &'a str) -> &'a str {
    if response.is_empty() {
        buffer
    } else {
        response
    }
}

/// Text streamed ahead of the canonical answer
///
/// The trimmed answer is searched for from the end of the buffer; whatever
/// precedes its last occurrence is the trace. An empty answer makes the whole
/// trimmed buffer the trace. An answer that never appears verbatim yields no
/// trace.
#[must_use]
pub fn thinking_trace(content: &str, buffer: &str) -> String {
    let content = content.trim();
    if content.is_empty() {
        return buffer.trim().to_string();
    }
    match buffer.rfind(content) {
        Some(pos) => buffer[..pos].trim().to_string(),
        None => String::new(),
    }
}

/// Build the assistant message for a settled turn
#[must_use]
pub fn compose_reply(
    payload: FinalPayload,
    buffer: &str,
    model: &str,
    elapsed: Duration,
) -> Message {
    let content = canonical_content(&payload.response, buffer).to_string();
    let trace = thinking_trace(&content, buffer);

    let mut message = Message::assistant(content);
    message.thinking_trace = (!trace.is_empty()).then_some(trace);
    message.tool_calls = (!payload.tool_calls.is_empty()).then_some(payload.tool_calls);
    message.usage = payload.usage;
    message.model = Some(model.to_string());
    message.tool_time = payload.tool_time;
    message.total_time = Some(elapsed.as_secs_f64());
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Role, ToolCall};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_canonical_prefers_response() {
        assert_eq!(canonical_content("AB", "xxAB"), "AB");
        assert_eq!(canonical_content("", "streamed"), "streamed");
    }

    #[test]
    fn test_trace_empty_when_answer_is_whole_buffer() {
        assert_eq!(thinking_trace("AB", "AB"), "");
    }

    #[test]
    fn test_trace_is_text_before_answer() {
        assert_eq!(thinking_trace("AB", "Let me think...AB"), "Let me think...");
    }

    #[test]
    fn test_trace_uses_last_occurrence() {
        assert_eq!(thinking_trace("AB", "AB draft, then AB"), "AB draft, then");
    }

    #[test]
    fn test_trace_empty_when_answer_not_found() {
        assert_eq!(thinking_trace("final", "something else"), "");
    }

    #[test]
    fn test_trace_is_whole_buffer_for_empty_answer() {
        assert_eq!(thinking_trace("  ", "  pondering  "), "pondering");
    }

    #[test]
    fn test_compose_reply_fields() {
        let mut payload = FinalPayload::new("");
        payload.tool_calls = vec![ToolCall::new("query_costs", json!({"days": 7}))];
        payload.tool_time = Some(0.75);

        let message = compose_reply(payload, "Checking...$42", "m1", Duration::from_millis(1500));

        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.content, "Checking...$42");
        assert_eq!(message.thinking_trace, None);
        assert_eq!(message.tool_calls.as_ref().map(Vec::len), Some(1));
        assert_eq!(message.model.as_deref(), Some("m1"));
        assert_eq!(message.tool_time, Some(0.75));
        assert_eq!(message.total_time, Some(1.5));
        assert!(!message.is_error);
    }

    #[test]
    fn test_degenerate_empty_turn() {
        let message = compose_reply(FinalPayload::default(), "", "m", Duration::ZERO);
        assert_eq!(message.content, "");
        assert_eq!(message.thinking_trace, None);
        assert_eq!(message.tool_calls, None);
    }
}
