//! Conversation Data Model
//!
//! Messages, tool calls, usage summaries, accounts and saved conversations,
//! plus [`ConversationState`], the in-memory history a session owns.
//!
//! # Design Philosophy
//!
//! History is append-only while a turn runs. The only whole-history
//! mutations are explicit user actions (load, switch account, new
//! conversation), all of which go through [`ConversationState::replace`] or
//! [`ConversationState::clear`]. Role alternation is not enforced: inline
//! error messages are assistant-role messages flagged with `is_error`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who authored a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person asking
    User,
    /// The assistant (answers and inline errors)
    Assistant,
}

impl Role {
    /// Wire name of the role
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One tool invocation made by the upstream model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name
    pub name: String,
    /// Arguments passed to the tool
    #[serde(default)]
    pub input: Value,
    /// Tool result; may be truncated until a full fetch replaces it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Set when the tool invocation failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<bool>,
    /// Output was shortened for transport
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

impl ToolCall {
    /// Create a tool call with no output yet
    pub fn new(name: impl Into<String>, input: Value) -> Self {
        Self {
            name: name.into(),
            input,
            output: None,
            error: None,
            truncated: false,
        }
    }

    /// Set the output
    #[must_use]
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    /// Mark the output as truncated
    #[must_use]
    pub fn truncated(mut self) -> Self {
        self.truncated = true;
        self
    }

    /// Whether the output is missing or known to be partial
    #[must_use]
    pub fn needs_full_output(&self) -> bool {
        self.truncated || self.output.is_none()
    }
}

/// Token usage and cost summary for one answer
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageStats {
    /// Model that produced the answer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Prompt tokens
    pub input_tokens: u64,
    /// Completion tokens
    pub output_tokens: u64,
    /// Tokens written to the prompt cache
    pub cache_creation_input_tokens: u64,
    /// Tokens served from the prompt cache
    pub cache_read_input_tokens: u64,
    /// Sum of all token counts
    pub total_tokens: u64,
    /// Estimated cost in US dollars
    pub estimated_cost_usd: f64,
}

/// A single entry of the visible history
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Author
    pub role: Role,
    /// Displayed text
    pub content: String,
    /// Text streamed ahead of the final answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_trace: Option<String>,
    /// Tools invoked while producing this answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Token usage summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageStats>,
    /// Model selected when the answer was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Seconds the server spent in tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_time: Option<f64>,
    /// Seconds from submit to commit, measured client-side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time: Option<f64>,
    /// Inline failure notice rather than an answer
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl Message {
    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content.into())
    }

    /// Create an assistant message with no metadata
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content.into())
    }

    /// Create an assistant-role error notice
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::plain(Role::Assistant, content.into())
        }
    }

    fn plain(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            thinking_trace: None,
            tool_calls: None,
            usage: None,
            model: None,
            tool_time: None,
            total_time: None,
            is_error: false,
        }
    }

    /// Reduce to the `{role, content}` shape sent back to the server
    #[must_use]
    pub fn to_history_entry(&self) -> HistoryEntry {
        HistoryEntry {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Prior-turn context as sent in a chat request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Author
    pub role: Role,
    /// Text
    pub content: String,
}

/// A data scope the session can query
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Stable identifier
    #[serde(rename = "accountId")]
    pub account_id: String,
    /// Display name
    pub name: String,
}

impl Account {
    /// Create an account
    pub fn new(account_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            name: name.into(),
        }
    }
}

/// A conversation as stored by the server
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Server-assigned identifier
    pub id: String,
    /// Display name (derived from the first question)
    pub name: String,
    /// Account the conversation belongs to
    pub account_id: String,
    /// Model selected when last saved
    pub model: String,
    /// Full message list
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Every tool call across all messages, flattened
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Free-form note attached by the user
    #[serde(default)]
    pub user_note: Option<String>,
    /// Token granting read-only access
    #[serde(default)]
    pub share_token: Option<String>,
    /// Creation time (server local, no zone)
    pub created_at: Option<NaiveDateTime>,
    /// Last update time (server local, no zone)
    pub updated_at: Option<NaiveDateTime>,
}

/// Index entry for a saved conversation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Server-assigned identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Owning account
    pub account_id: String,
    /// Model selected when last saved
    pub model: String,
    /// Creation time
    pub created_at: Option<NaiveDateTime>,
    /// Last update time
    pub updated_at: Option<NaiveDateTime>,
    /// Number of messages stored
    #[serde(default)]
    pub message_count: usize,
}

// ============================================================================
// In-memory history
// ============================================================================

/// The visible message history of the active conversation
#[derive(Clone, Debug, Default)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    /// Create an empty history
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages in order
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the history is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a message, returning its index
    pub fn push(&mut self, message: Message) -> usize {
        self.messages.push(message);
        self.messages.len() - 1
    }

    /// History reduced to `{role, content}` for a chat request
    #[must_use]
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.messages.iter().map(Message::to_history_entry).collect()
    }

    /// Content of the first user message, used to name the conversation
    #[must_use]
    pub fn first_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// Every tool call across the history, in order
    #[must_use]
    pub fn all_tool_calls(&self) -> Vec<ToolCall> {
        self.messages
            .iter()
            .filter_map(|m| m.tool_calls.as_ref())
            .flatten()
            .cloned()
            .collect()
    }

    /// Replace the whole history
    pub fn replace(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// Drop every message
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_history_strips_derived_fields() {
        let mut state = ConversationState::new();
        state.push(Message::user("What did EC2 cost?"));
        let mut answer = Message::assistant("$120");
        answer.usage = Some(UsageStats {
            total_tokens: 50,
            ..Default::default()
        });
        answer.tool_calls = Some(vec![ToolCall::new("query_costs", json!({"service": "ec2"}))]);
        answer.total_time = Some(1.5);
        state.push(answer);

        let history = serde_json::to_value(state.history()).unwrap();
        assert_eq!(
            history,
            json!([
                {"role": "user", "content": "What did EC2 cost?"},
                {"role": "assistant", "content": "$120"}
            ])
        );
    }

    #[test]
    fn test_all_tool_calls_flattens_in_order() {
        let mut state = ConversationState::new();
        let mut first = Message::assistant("a");
        first.tool_calls = Some(vec![
            ToolCall::new("one", json!({})),
            ToolCall::new("two", json!({})),
        ]);
        let mut second = Message::assistant("b");
        second.tool_calls = Some(vec![ToolCall::new("three", json!({}))]);
        state.push(Message::user("q"));
        state.push(first);
        state.push(second);

        let names: Vec<_> = state.all_tool_calls().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_first_user_message_skips_assistant() {
        let mut state = ConversationState::new();
        assert_eq!(state.first_user_message(), None);
        state.push(Message::error("offline"));
        state.push(Message::user("hello"));
        state.push(Message::user("again"));
        assert_eq!(state.first_user_message(), Some("hello"));
    }

    #[test]
    fn test_message_serialization_omits_empty_fields() {
        let value = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(value, json!({"role": "user", "content": "hi"}));

        let value = serde_json::to_value(Message::error("boom")).unwrap();
        assert_eq!(
            value,
            json!({"role": "assistant", "content": "boom", "is_error": true})
        );
    }

    #[test]
    fn test_account_wire_name() {
        let account: Account =
            serde_json::from_value(json!({"accountId": "acc-1", "name": "Prod"})).unwrap();
        assert_eq!(account, Account::new("acc-1", "Prod"));
    }

    #[test]
    fn test_conversation_parses_server_shape() {
        let conv: Conversation = serde_json::from_value(json!({
            "id": "c1",
            "name": "EC2 costs",
            "account_id": "acc-1",
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "tool_calls": null,
            "user_note": null,
            "share_token": "tok",
            "created_at": "2025-01-02T03:04:05.123456",
            "updated_at": "2025-01-02T03:04:05"
        }))
        .unwrap();
        assert_eq!(conv.messages.len(), 1);
        assert_eq!(conv.share_token.as_deref(), Some("tok"));
        assert!(conv.created_at.is_some());
    }

    #[test]
    fn test_tool_call_needs_full_output() {
        assert!(ToolCall::new("t", json!({})).needs_full_output());
        assert!(ToolCall::new("t", json!({}))
            .with_output(json!("partial"))
            .truncated()
            .needs_full_output());
        assert!(!ToolCall::new("t", json!({}))
            .with_output(json!([1, 2]))
            .needs_full_output());
    }
}
