//! Costchat Core - Headless Chat Session Controller for a Cost-Reporting Server
//!
//! This crate provides the client-side logic of a conversational assistant
//! that answers questions about cloud costs, completely independent of any
//! UI framework. It can drive a terminal REPL, a TUI, or run headless for
//! testing/automation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Surfaces                                │
//! │        ┌─────────┐      ┌─────────┐      ┌──────────────┐       │
//! │        │   CLI   │      │   TUI   │      │   Headless   │       │
//! │        └────┬────┘      └────┬────┘      └──────┬───────┘       │
//! │             └────────────────┴──────────────────┘               │
//! │                              │                                   │
//! │                     SessionEvent (up)                            │
//! │                    SessionMessage (down)                         │
//! └──────────────────────────────┼───────────────────────────────────┘
//!                                │
//! ┌──────────────────────────────┼───────────────────────────────────┐
//! │                       COSTCHAT CORE                               │
//! │  ┌───────────────────────────┴──────────────────────────────────┐ │
//! │  │                        Conductor                              │ │
//! │  │  ┌───────────┐  ┌──────────────┐  ┌───────────┐  ┌─────────┐ │ │
//! │  │  │ Bootstrap │  │ Conversation │  │   Turn    │  │ Persist │ │ │
//! │  │  │ (account) │  │    State     │  │  (SSE)    │  │  (save) │ │ │
//! │  │  └───────────┘  └──────────────┘  └───────────┘  └─────────┘ │ │
//! │  └──────────────────────────────────────────────────────────────┘ │
//! │                               │                                    │
//! │                          HttpBackend                               │
//! └───────────────────────────────┼────────────────────────────────────┘
//!                                 ▼
//!                     Chat server (HTTP + SSE)
//! ```
//!
//! # Key Types
//!
//! - [`Conductor`]: The session controller that owns history and turns
//! - [`SessionMessage`]: Messages sent from the Conductor to a surface
//! - [`SessionEvent`]: Events sent from a surface to the Conductor
//! - [`StreamDecoder`]: Incremental decoder for the turn event stream
//! - [`HttpBackend`]: The chat server client
//!
//! # Quick Start
//!
//! ```ignore
//! use costchat_core::{Conductor, ConductorConfig, HttpBackend, SessionEvent};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (tx, mut rx) = mpsc::channel(100);
//!
//!     let config = ConductorConfig::default();
//!     let backend = HttpBackend::new(&config.backend).unwrap();
//!     let mut conductor = Conductor::new(backend, config, tx);
//!
//!     // Load accounts and activate one
//!     conductor.start().await;
//!
//!     conductor.handle_event(SessionEvent::submit("Top services?")).await;
//!     conductor.run_until_idle().await;
//!
//!     while let Ok(msg) = rx.try_recv() {
//!         // Render message
//!     }
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: Chat server abstraction and the HTTP client
//! - [`bootstrap`]: Account list, scope resolution, last-account memory
//! - [`conductor`]: Main Conductor struct
//! - [`config`]: TOML + environment configuration
//! - [`conversation`]: Messages, tool calls, accounts, conversation records
//! - [`error`]: Error types for each failure family
//! - [`events`]: Events from surfaces to the Conductor
//! - [`messages`]: Messages from the Conductor to surfaces
//! - [`persistence`]: Auto-save and conversation index
//! - [`streaming`]: Event stream decoding and turn execution
//! - [`turn`]: Composing the committed answer of a turn
//!
//! # No UI Dependencies
//!
//! This crate has **zero** dependencies on any terminal or UI framework.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod bootstrap;
pub mod conductor;
pub mod config;
pub mod conversation;
pub mod error;
pub mod events;
pub mod messages;
pub mod persistence;
pub mod streaming;
pub mod turn;

// Re-exports for convenience
pub use backend::{
    AccountService, AccountsResponse, BackendConfig, ByteStream, ChatBackend, ChatRequest,
    ChatTransport, ConversationStore, HttpBackend, SaveConversationRequest,
    SaveConversationResponse,
};
pub use bootstrap::{
    resolve_scope, FileAccountStore, LastAccountStore, MemoryAccountStore, ScopeWatcher,
    SessionBootstrap,
};
pub use conductor::Conductor;
pub use events::SessionEvent;
pub use messages::{ConductorState, NotifyLevel, SessionMessage};

// Conversation exports
pub use conversation::{
    Account, Conversation, ConversationState, ConversationSummary, HistoryEntry, Message, Role,
    ToolCall, UsageStats,
};

// Error exports
pub use error::{
    PersistenceError, ProtocolViolation, ScopeActivationError, ToolOutputFetchError,
    TransportError, TurnError,
};

// Persistence exports
pub use persistence::{ConversationPersistence, SaveOutcome};

// Streaming exports
pub use streaming::{spawn_turn, FinalPayload, ProtocolEvent, StreamDecoder, TurnItem, TurnSpec};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, load_config_with_env,
    ConductorConfig, ConfigError, ConfigOverrides, ConfigSource, CostchatToml,
};
