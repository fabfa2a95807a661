//! Chat Server Traits
//!
//! Trait definitions for the three collaborators a session talks to. The
//! controller only ever sees these traits, so tests can swap the HTTP
//! implementation for an in-memory one.
//!
//! # Design Philosophy
//!
//! Each trait maps to one group of server endpoints:
//! - [`ChatTransport`]: asking questions (streaming or batch) and fetching
//!   complete tool outputs
//! - [`AccountService`]: listing and activating data scopes
//! - [`ConversationStore`]: saving, loading and sharing conversations
//!
//! [`ChatBackend`] bundles all three and is implemented automatically.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::conversation::{
    Account, Conversation, ConversationSummary, HistoryEntry, Message, ToolCall,
};
use crate::error::{PersistenceError, ScopeActivationError, ToolOutputFetchError, TransportError};
use crate::streaming::FinalPayload;

/// Boxed, sendable stream
pub type BoxedStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

/// Raw body chunks of a streaming chat response
pub type ByteStream = BoxedStream<Result<Bytes, TransportError>>;

/// Body of `POST /chat` and `POST /chat/stream`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The new question
    pub message: String,
    /// Prior turns reduced to `{role, content}`
    pub conversation_history: Vec<HistoryEntry>,
    /// Model identifier
    pub model: String,
    /// Scope to evaluate the question against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

impl ChatRequest {
    /// Create a request with no history
    pub fn new(message: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            conversation_history: Vec::new(),
            model: model.into(),
            account_id: None,
        }
    }

    /// Set prior history
    #[must_use]
    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.conversation_history = history;
        self
    }

    /// Set the scope
    #[must_use]
    pub fn with_account(mut self, account_id: Option<String>) -> Self {
        self.account_id = account_id;
        self
    }
}

/// Response of `GET /accounts`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountsResponse {
    /// Every scope the user can query
    #[serde(default)]
    pub accounts: Vec<Account>,
    /// Scope the server currently has active for this session
    #[serde(default)]
    pub current_account_id: Option<String>,
    /// Whether the list came from the server's cache
    #[serde(default)]
    pub cached: bool,
}

/// Body of `POST /conversations/save`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SaveConversationRequest {
    /// Display name
    pub name: String,
    /// Owning account
    pub account_id: String,
    /// Selected model
    pub model: String,
    /// Full message list
    pub messages: Vec<Message>,
    /// Every tool call across all messages
    pub tool_calls: Vec<ToolCall>,
    /// Existing record to update; `None` creates one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// Response of `POST /conversations/save`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveConversationResponse {
    /// Whether the server stored the record
    #[serde(default = "default_success")]
    pub success: bool,
    /// Identifier of the stored record
    pub conversation_id: String,
    /// Read-only access token
    #[serde(default)]
    pub share_token: Option<String>,
}

fn default_success() -> bool {
    true
}

/// Asking questions
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Check if the server is reachable
    async fn health_check(&self) -> bool;

    /// Ask and wait for the complete answer (`POST /chat`)
    async fn chat(&self, request: &ChatRequest) -> Result<FinalPayload, TransportError>;

    /// Ask and receive the raw event stream (`POST /chat/stream`)
    ///
    /// Resolves once response headers arrive; the body is read through the
    /// returned stream.
    async fn chat_stream(&self, request: &ChatRequest) -> Result<ByteStream, TransportError>;

    /// Fetch untruncated tool calls for a prior streamed answer
    async fn fetch_tool_outputs(
        &self,
        request_id: &str,
    ) -> Result<Vec<ToolCall>, ToolOutputFetchError>;
}

/// Listing and activating scopes
#[async_trait]
pub trait AccountService: Send + Sync {
    /// List scopes and the one the server considers current
    async fn list_accounts(&self) -> Result<AccountsResponse, TransportError>;

    /// Activate a scope for this session
    async fn switch_account(&self, account_id: &str) -> Result<(), ScopeActivationError>;
}

/// Saved conversations
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create or update a conversation
    async fn save_conversation(
        &self,
        request: &SaveConversationRequest,
    ) -> Result<SaveConversationResponse, PersistenceError>;

    /// Load one conversation
    async fn get_conversation(&self, conversation_id: &str)
        -> Result<Conversation, PersistenceError>;

    /// Index of an account's conversations, newest first
    async fn list_conversations(
        &self,
        account_id: &str,
        search: Option<&str>,
    ) -> Result<Vec<ConversationSummary>, PersistenceError>;

    /// Load a conversation by share token (read-only)
    async fn get_shared_conversation(&self, share_token: &str)
        -> Result<Conversation, PersistenceError>;

    /// Replace a conversation's note
    async fn update_note(&self, conversation_id: &str, note: &str)
        -> Result<(), PersistenceError>;
}

/// Everything a session needs from the server
pub trait ChatBackend: ChatTransport + AccountService + ConversationStore {}

impl<T> ChatBackend for T where T: ChatTransport + AccountService + ConversationStore + ?Sized {}

/// Server connection settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendConfig {
    /// Base URL including the `/api` prefix
    pub base_url: String,
    /// Ceiling for chat calls
    pub request_timeout: std::time::Duration,
    /// Ceiling for every other call
    pub api_timeout: std::time::Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            request_timeout: std::time::Duration::from_secs(300),
            api_timeout: std::time::Duration::from_secs(30),
        }
    }
}
