//! Conversation Persistence
//!
//! Saves the active conversation after every committed turn, upserting by a
//! server-assigned id.
//!
//! # Design Philosophy
//!
//! The id used for the next save lives in one plain field of
//! [`ConversationPersistence`] and is written the moment a save completes.
//! There is no rendered snapshot to lag behind it, so the second turn of a
//! conversation always updates the record the first turn created.
//!
//! Saves never overlap. A commit that arrives while a save is in flight
//! marks the conversation dirty; when the in-flight save completes the
//! caller is told to save again, now with the known id.
//!
//! Every reset (new conversation, load, account switch) bumps a generation
//! counter. A save that completes for an older generation is ignored, so a
//! late response can never attach a stale id to a fresh conversation.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::backend::{ConversationStore, SaveConversationRequest, SaveConversationResponse};
use crate::conversation::{Conversation, ConversationState, ConversationSummary};
use crate::error::PersistenceError;

/// Default maximum length of a derived conversation name, in characters
pub const DEFAULT_NAME_MAX_CHARS: usize = 50;

/// Name used when there is no user message to derive one from
pub const UNTITLED_NAME: &str = "New conversation";

type SaveResult = Result<SaveConversationResponse, PersistenceError>;

struct PendingSave {
    generation: u64,
    account_id: String,
    rx: oneshot::Receiver<SaveResult>,
}

/// Result of a completed save
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Server stored the conversation
    Saved {
        /// Id to use for every later save
        conversation_id: String,
        /// Read-only access token
        share_token: Option<String>,
        /// This save created the record
        created: bool,
        /// A commit happened while saving; save again
        resave: bool,
    },
    /// Save failed; the next commit will try again
    Failed(PersistenceError),
    /// Conversation was reset while the save was in flight
    Stale,
}

/// Save bookkeeping for the active conversation
pub struct ConversationPersistence {
    /// Id for the next save
    conversation_id: Option<String>,
    /// Share token of the saved record
    share_token: Option<String>,
    /// Bumped on every reset
    generation: u64,
    /// In-flight save
    pending: Option<PendingSave>,
    /// A commit was skipped while a save was in flight
    dirty: bool,
    /// Derived names are cut to this many characters
    name_max_chars: usize,
    /// Unfiltered conversation index per account
    index_cache: HashMap<String, Vec<ConversationSummary>>,
}

impl Default for ConversationPersistence {
    fn default() -> Self {
        Self::new(DEFAULT_NAME_MAX_CHARS)
    }
}

impl ConversationPersistence {
    /// Create with a name length limit
    #[must_use]
    pub fn new(name_max_chars: usize) -> Self {
        Self {
            conversation_id: None,
            share_token: None,
            generation: 0,
            pending: None,
            dirty: false,
            name_max_chars: name_max_chars.max(1),
            index_cache: HashMap::new(),
        }
    }

    /// Id of the saved record, if any
    #[must_use]
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Share token of the saved record, if any
    #[must_use]
    pub fn share_token(&self) -> Option<&str> {
        self.share_token.as_deref()
    }

    /// Whether a save is in flight
    #[must_use]
    pub fn is_saving(&self) -> bool {
        self.pending.is_some()
    }

    /// Derive a conversation name from its first question
    #[must_use]
    pub fn derive_name(&self, first_user_message: Option<&str>) -> String {
        let text = first_user_message
            .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
            .unwrap_or_default();
        if text.is_empty() {
            return UNTITLED_NAME.to_string();
        }
        text.chars()
            .take(self.name_max_chars)
            .collect::<String>()
            .trim_end()
            .to_string()
    }

    /// Start saving the conversation unless a save is already in flight
    ///
    /// Returns `true` if a save was started.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::MissingAccount`] without an active account.
    pub fn schedule_save<B>(
        &mut self,
        backend: Arc<B>,
        account_id: Option<&str>,
        model: &str,
        state: &ConversationState,
    ) -> Result<bool, PersistenceError>
    where
        B: ConversationStore + ?Sized + 'static,
    {
        let account_id = account_id.ok_or(PersistenceError::MissingAccount)?;
        if self.pending.is_some() {
            tracing::debug!("Save already in flight, deferring");
            self.dirty = true;
            return Ok(false);
        }

        let request = SaveConversationRequest {
            name: self.derive_name(state.first_user_message()),
            account_id: account_id.to_string(),
            model: model.to_string(),
            messages: state.messages().to_vec(),
            tool_calls: state.all_tool_calls(),
            conversation_id: self.conversation_id.clone(),
        };

        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let result = backend.save_conversation(&request).await;
            let _ = tx.send(result);
        });

        self.dirty = false;
        self.pending = Some(PendingSave {
            generation: self.generation,
            account_id: account_id.to_string(),
            rx,
        });
        Ok(true)
    }

    /// Wait for the in-flight save; pends forever if there is none
    ///
    /// Cancel safe: dropping the future leaves the save pending.
    pub async fn next_completion(&mut self) -> SaveOutcome {
        let Some(pending) = self.pending.as_mut() else {
            return std::future::pending().await;
        };
        let result = (&mut pending.rx).await.unwrap_or_else(|_| {
            Err(PersistenceError::Rejected("save task ended without a result".to_string()))
        });
        let Some(pending) = self.pending.take() else {
            return SaveOutcome::Stale;
        };
        self.complete(pending.generation, &pending.account_id, result)
    }

    /// Non-blocking variant of [`next_completion`](Self::next_completion)
    pub fn try_completion(&mut self) -> Option<SaveOutcome> {
        let pending = self.pending.as_mut()?;
        let result = match pending.rx.try_recv() {
            Ok(result) => result,
            Err(oneshot::error::TryRecvError::Empty) => return None,
            Err(oneshot::error::TryRecvError::Closed) => Err(PersistenceError::Rejected(
                "save task ended without a result".to_string(),
            )),
        };
        let pending = self.pending.take()?;
        Some(self.complete(pending.generation, &pending.account_id, result))
    }

    fn complete(&mut self, generation: u64, account_id: &str, result: SaveResult) -> SaveOutcome {
        if generation != self.generation {
            tracing::debug!("Ignoring save for a reset conversation");
            return SaveOutcome::Stale;
        }
        let resave = std::mem::take(&mut self.dirty);

        match result {
            Ok(response) => {
                let created = self.conversation_id.as_deref() != Some(&response.conversation_id);
                if created {
                    tracing::info!(conversation_id = %response.conversation_id, "Conversation created");
                    self.index_cache.remove(account_id);
                }
                self.conversation_id = Some(response.conversation_id.clone());
                if response.share_token.is_some() {
                    self.share_token.clone_from(&response.share_token);
                }
                SaveOutcome::Saved {
                    conversation_id: response.conversation_id,
                    share_token: self.share_token.clone(),
                    created,
                    resave,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Conversation save failed");
                SaveOutcome::Failed(e)
            }
        }
    }

    /// Forget the saved record; the next save creates a new one
    pub fn reset(&mut self) {
        self.generation += 1;
        self.conversation_id = None;
        self.share_token = None;
        self.pending = None;
        self.dirty = false;
    }

    /// Adopt a loaded conversation's id and share token
    pub fn restore(&mut self, conversation: &Conversation) {
        self.reset();
        self.conversation_id = Some(conversation.id.clone());
        self.share_token.clone_from(&conversation.share_token);
    }

    // ========================================================================
    // Conversation index
    // ========================================================================

    /// Cached unfiltered index for an account
    #[must_use]
    pub fn cached_index(&self, account_id: &str) -> Option<&[ConversationSummary]> {
        self.index_cache.get(account_id).map(Vec::as_slice)
    }

    /// Drop cached indexes (all accounts if `None`)
    pub fn invalidate_index(&mut self, account_id: Option<&str>) {
        match account_id {
            Some(id) => {
                self.index_cache.remove(id);
            }
            None => self.index_cache.clear(),
        }
    }

    /// Fetch an account's conversation index
    ///
    /// Unfiltered listings are cached until invalidated.
    ///
    /// # Errors
    ///
    /// Returns the store's failure.
    pub async fn list<B>(
        &mut self,
        backend: &B,
        account_id: &str,
        search: Option<&str>,
    ) -> Result<Vec<ConversationSummary>, PersistenceError>
    where
        B: ConversationStore + ?Sized,
    {
        let search = search.map(str::trim).filter(|s| !s.is_empty());
        if search.is_none() {
            if let Some(cached) = self.cached_index(account_id) {
                return Ok(cached.to_vec());
            }
        }
        let list = backend.list_conversations(account_id, search).await?;
        if search.is_none() {
            self.index_cache.insert(account_id.to_string(), list.clone());
        }
        Ok(list)
    }

    /// Replace the note of the saved conversation
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::NotSaved`] before the first save.
    pub async fn update_note<B>(&self, backend: &B, note: &str) -> Result<(), PersistenceError>
    where
        B: ConversationStore + ?Sized,
    {
        let id = self.conversation_id.as_deref().ok_or(PersistenceError::NotSaved)?;
        backend.update_note(id, note).await
    }
}
