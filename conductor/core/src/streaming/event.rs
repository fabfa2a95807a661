//! Protocol Events
//!
//! The typed union carried by `POST /chat/stream`. Every record on the wire
//! names its kind with an `event:` line; the decoder folds that name into the
//! JSON payload as `type` before deserializing into [`ProtocolEvent`].

use serde::{Deserialize, Deserializer, Serialize};

use crate::conversation::{ToolCall, UsageStats};

/// One decoded record of a turn's event stream
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    /// Progress update ("Querying costs...")
    Status {
        /// Human-readable phase description
        #[serde(default, deserialize_with = "null_as_default")]
        message: String,
        /// Tool currently running, if any
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
    },

    /// A fragment of streamed text
    Token {
        /// Text fragment
        text: String,
    },

    /// Successful end of the turn
    Final(FinalPayload),

    /// Server-side failure; ends the turn
    Error {
        /// Failure description
        #[serde(default, deserialize_with = "null_as_default")]
        detail: String,
    },
}

impl ProtocolEvent {
    /// Wire names of the event kinds that end a stream
    pub const TERMINAL_NAMES: [&'static str; 2] = ["final", "error"];

    /// Whether this event ends decoding
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Final(_) | Self::Error { .. })
    }

    /// Whether a wire name denotes a terminal event
    #[must_use]
    pub fn is_terminal_name(name: &str) -> bool {
        Self::TERMINAL_NAMES.contains(&name)
    }
}

/// Body of a `final` event, and of the non-streaming `POST /chat` response
///
/// Missing fields and explicit `null`s both take their defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinalPayload {
    /// Canonical answer text (may be empty)
    #[serde(deserialize_with = "null_as_default")]
    pub response: String,
    /// Tools invoked while answering
    #[serde(deserialize_with = "null_as_default")]
    pub tool_calls: Vec<ToolCall>,
    /// Token usage summary
    pub usage: Option<UsageStats>,
    /// Seconds spent in tools
    pub tool_time: Option<f64>,
    /// Identifier for `GET /tool-outputs/{request_id}`
    #[serde(deserialize_with = "string_or_number")]
    pub request_id: Option<String>,
    /// Tool outputs were omitted or shortened for transport
    #[serde(deserialize_with = "null_as_default")]
    pub tool_outputs_truncated: bool,
}

impl FinalPayload {
    /// Create a payload with just a response text
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            ..Default::default()
        }
    }

    /// Whether a secondary fetch could recover complete tool outputs
    #[must_use]
    pub fn needs_tool_outputs(&self) -> bool {
        self.request_id.is_some()
            && (self.tool_outputs_truncated
                || self.tool_calls.iter().any(ToolCall::needs_full_output))
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_status_event_parses() {
        let event: ProtocolEvent = serde_json::from_value(json!({
            "type": "status",
            "message": "Querying costs",
            "tool_name": "query_costs"
        }))
        .unwrap();
        assert_eq!(
            event,
            ProtocolEvent::Status {
                message: "Querying costs".to_string(),
                tool_name: Some("query_costs".to_string()),
            }
        );
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_final_event_defaults() {
        let event: ProtocolEvent = serde_json::from_value(json!({"type": "final"})).unwrap();
        assert_eq!(event, ProtocolEvent::Final(FinalPayload::default()));
        assert!(event.is_terminal());
    }

    #[test]
    fn test_error_event_null_detail() {
        let event: ProtocolEvent =
            serde_json::from_value(json!({"type": "error", "detail": null})).unwrap();
        assert_eq!(event, ProtocolEvent::Error { detail: String::new() });
    }

    #[test]
    fn test_final_event_null_fields() {
        let event: ProtocolEvent = serde_json::from_value(json!({
            "type": "final",
            "response": null,
            "tool_calls": null,
            "usage": null,
            "tool_time": null,
            "request_id": null,
            "tool_outputs_truncated": null
        }))
        .unwrap();
        assert_eq!(event, ProtocolEvent::Final(FinalPayload::default()));
    }

    #[test]
    fn test_numeric_request_id() {
        let payload: FinalPayload =
            serde_json::from_value(json!({"response": "x", "request_id": 42})).unwrap();
        assert_eq!(payload.request_id.as_deref(), Some("42"));
    }

    #[test]
    fn test_needs_tool_outputs_requires_request_id() {
        let mut payload = FinalPayload::new("x");
        payload.tool_outputs_truncated = true;
        assert!(!payload.needs_tool_outputs());

        payload.request_id = Some("r1".to_string());
        assert!(payload.needs_tool_outputs());

        payload.tool_outputs_truncated = false;
        payload.tool_calls = vec![ToolCall::new("t", json!({})).with_output(json!(1))];
        assert!(!payload.needs_tool_outputs());

        payload.tool_calls[0].truncated = true;
        assert!(payload.needs_tool_outputs());
    }
}
