//! Session Messages
//!
//! Messages sent from the controller to a surface (terminal, web view, test
//! harness). They describe everything a surface needs to render a chat
//! session; the surface holds no business logic of its own.
//!
//! # Design Philosophy
//!
//! Transient display state (the current phase, streamed tokens) and committed
//! history travel as different messages. A surface may drop every `Token`
//! and `Status` and still show a correct transcript from
//! `MessageAppended`/`MessageCommitted` alone.

use serde::{Deserialize, Serialize};

use crate::conversation::{Account, Conversation, ConversationSummary, Message};

/// Messages from controller to surface
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SessionMessage {
    // ============================================
    // Turn Messages
    // ============================================
    /// Controller state changed
    State {
        /// New state
        state: ConductorState,
    },

    /// A message was appended to history (user question or inline error)
    MessageAppended {
        /// Position in history
        index: usize,
        /// The message
        message: Message,
    },

    /// The assistant answer of a turn was committed
    MessageCommitted {
        /// Position in history
        index: usize,
        /// The message
        message: Message,
    },

    /// Current phase of the running turn
    Status {
        /// Phase description
        message: String,
        /// Tool currently running, if any
        tool_name: Option<String>,
    },

    /// A streamed text fragment, for progressive display only
    Token {
        /// Text fragment
        text: String,
    },

    /// The running turn failed
    TurnFailed {
        /// Failure description
        error: String,
        /// Whether resubmitting could succeed
        retryable: bool,
    },

    /// Transient notice
    Notify {
        /// Severity
        level: NotifyLevel,
        /// Text
        message: String,
    },

    // ============================================
    // Session Messages
    // ============================================
    /// The account list was (re)loaded
    AccountsLoaded {
        /// Known accounts
        accounts: Vec<Account>,
        /// Currently active account id
        active: Option<String>,
    },

    /// An account was activated
    AccountActivated {
        /// Account id
        account_id: String,
    },

    /// Readiness to accept questions changed
    Ready {
        /// Whether questions may be submitted
        ready: bool,
    },

    /// Model selection changed
    ModelChanged {
        /// Model identifier
        model: String,
    },

    // ============================================
    // Persistence Messages
    // ============================================
    /// The active conversation was saved
    ConversationSaved {
        /// Server-assigned id
        conversation_id: String,
        /// Read-only access token
        share_token: Option<String>,
    },

    /// A saved conversation replaced the active one
    ConversationLoaded {
        /// The loaded conversation
        conversation: Conversation,
    },

    /// The active conversation was cleared
    ConversationCleared,

    /// Index of saved conversations
    ConversationIndex {
        /// Account the index belongs to
        account_id: String,
        /// Search term used, if any
        search: Option<String>,
        /// Matching conversations, newest first
        conversations: Vec<ConversationSummary>,
    },

    /// A shared conversation opened read-only
    SharedConversation {
        /// The shared conversation
        conversation: Conversation,
    },

    /// Request surface to quit
    Quit,
}

/// Notification severity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyLevel {
    /// Informational
    Info,
    /// Success
    Success,
    /// Something degraded but work continues
    Warning,
    /// An operation failed
    Error,
}

/// Turn state machine
///
/// `Idle → Sending → Streaming → Settling → Idle`, with
/// `Sending/Streaming/Settling → Failed → Idle` on failure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConductorState {
    /// Ready for a submission
    #[default]
    Idle,
    /// Request sent, waiting for the response to open
    Sending,
    /// Receiving events
    Streaming,
    /// Final event received, composing the answer
    Settling,
    /// Turn failed; returns to `Idle` once the error is recorded
    Failed,
}

impl ConductorState {
    /// Human-readable description
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Idle => "Ready",
            Self::Sending => "Sending...",
            Self::Streaming => "Responding...",
            Self::Settling => "Finishing up...",
            Self::Failed => "Error",
        }
    }

    /// Whether a turn is in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_busy() {
        assert!(!ConductorState::Idle.is_busy());
        assert!(ConductorState::Sending.is_busy());
        assert!(ConductorState::Settling.is_busy());
        assert_eq!(ConductorState::default(), ConductorState::Idle);
    }

    #[test]
    fn test_state_descriptions_distinct() {
        let states = [
            ConductorState::Idle,
            ConductorState::Sending,
            ConductorState::Streaming,
            ConductorState::Settling,
            ConductorState::Failed,
        ];
        for (i, a) in states.iter().enumerate() {
            for b in &states[i + 1..] {
                assert_ne!(a.description(), b.description());
            }
        }
    }
}
