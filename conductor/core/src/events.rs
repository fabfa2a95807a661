//! Session Events
//!
//! Events sent from a surface to the controller: user input and explicit
//! user actions. Every event is handled by
//! [`Conductor::handle_event`](crate::Conductor::handle_event).

use serde::{Deserialize, Serialize};

/// Events from surface to controller
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Ask a question; ignored unless the controller is idle and ready
    Submit {
        /// Question text
        content: String,
    },

    /// Abort the running turn
    Cancel,

    /// Activate another account and start a fresh conversation
    SwitchAccount {
        /// Account to activate
        account_id: String,
    },

    /// Reload the account list (and resolve a scope if none is active)
    RefreshAccounts,

    /// Start a fresh conversation on the active account
    NewConversation,

    /// Replace the active conversation with a saved one
    LoadConversation {
        /// Saved conversation id
        conversation_id: String,
    },

    /// Open a shared conversation read-only
    OpenShared {
        /// Share token
        share_token: String,
    },

    /// List saved conversations of the active account
    ListConversations {
        /// Name filter
        search: Option<String>,
    },

    /// Set the note of the active (saved) conversation
    UpdateNote {
        /// Note text
        note: String,
    },

    /// Select the model for later questions
    SetModel {
        /// Model identifier
        model: String,
    },

    /// End the session
    Quit,
}

impl SessionEvent {
    /// Create a submit event
    pub fn submit(content: impl Into<String>) -> Self {
        Self::Submit {
            content: content.into(),
        }
    }
}
