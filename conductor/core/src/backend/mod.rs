//! Chat Server Integration
//!
//! This module provides abstracted access to the costchat server through a
//! set of trait interfaces, one per endpoint group.
//!
//! # Available Backends
//!
//! - **HTTP**: the JSON API served under `/api` (default)
//!
//! # Usage
//!
//! ```ignore
//! use costchat_core::backend::{BackendConfig, ChatRequest, ChatTransport, HttpBackend};
//!
//! let backend = HttpBackend::new(&BackendConfig::default())?;
//! let request = ChatRequest::new("What did we spend on EC2?", "claude-sonnet-4-5-20250929");
//! let stream = backend.chat_stream(&request).await?;
//! ```

mod http;
mod traits;

pub use http::HttpBackend;
pub use traits::{
    AccountService, AccountsResponse, BackendConfig, BoxedStream, ByteStream, ChatBackend,
    ChatRequest, ChatTransport, ConversationStore, SaveConversationRequest,
    SaveConversationResponse,
};
