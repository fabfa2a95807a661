//! Conductor - The Chat Session Controller
//!
//! The Conductor owns one user's chat session. It orchestrates:
//! - Account bootstrap and switching
//! - The turn state machine (send, stream, settle, fail, cancel)
//! - Auto-persistence of the conversation after every committed answer
//! - Communication with a surface
//!
//! # Design Philosophy
//!
//! The Conductor is UI-agnostic. It communicates through:
//! - `SessionMessage`: what to display, sent TO the surface
//! - `SessionEvent`: user input, received FROM the surface
//!
//! All mutation of the message history happens inside `&mut self` methods,
//! so the single-flight rule (one turn at a time) is the only serialization
//! needed. Network waits of a turn run in a spawned task that reports back
//! over a channel; [`Conductor::next_update`] applies those reports one at a
//! time, in arrival order.
//!
//! # Turn State Machine
//!
//! ```text
//!          submit            Opened           final
//!   Idle ─────────► Sending ────────► Streaming ──────► Settling ──► Idle
//!                      │                  │                 (commit + save)
//!                      └──────────┬───────┘
//!                   error/abort   ▼
//!                               Failed ──► Idle   (inline error message)
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::backend::{ChatBackend, ChatRequest};
use crate::bootstrap::{
    FileAccountStore, LastAccountStore, MemoryAccountStore, ScopeWatcher, SessionBootstrap,
};
use crate::config::ConductorConfig;
use crate::conversation::{Account, ConversationState, Message};
use crate::error::{TransportError, TurnError};
use crate::events::SessionEvent;
use crate::messages::{ConductorState, NotifyLevel, SessionMessage};
use crate::persistence::{ConversationPersistence, SaveOutcome};
use crate::streaming::{spawn_turn, FinalPayload, ProtocolEvent, TurnItem, TurnSpec};
use crate::turn::compose_reply;

/// The turn currently in flight
struct ActiveTurn {
    /// Items from the turn task
    rx: mpsc::Receiver<TurnItem>,
    /// Turn task, aborted on cancel
    task: JoinHandle<()>,
    /// Concatenated token text
    buffer: String,
    /// When the user submitted
    started: Instant,
}

enum Update {
    Turn(Option<TurnItem>),
    Save(SaveOutcome),
}

/// The Conductor - headless chat session controller
pub struct Conductor<B: ChatBackend> {
    /// Configuration
    config: ConductorConfig,
    /// Chat server
    backend: Arc<B>,
    /// Visible history of the active conversation
    conversation: ConversationState,
    /// Account list, active scope, readiness
    bootstrap: SessionBootstrap,
    /// Detects scope changes across refreshes
    scope_watcher: ScopeWatcher,
    /// Save bookkeeping
    persistence: ConversationPersistence,
    /// Model for the next question
    model: String,
    /// Current turn state
    state: ConductorState,
    /// Phase text of the running turn
    phase: Option<String>,
    /// Turn in flight
    turn: Option<ActiveTurn>,
    /// Quit was requested
    quitting: bool,
    /// Channel to send messages to the surface
    tx: mpsc::Sender<SessionMessage>,
}

impl<B: ChatBackend + 'static> Conductor<B> {
    /// Create a new Conductor
    ///
    /// The last chosen account is remembered under the configured state
    /// directory (or the platform default); without one it is kept in memory.
    pub fn new(backend: B, config: ConductorConfig, tx: mpsc::Sender<SessionMessage>) -> Self {
        let store: Arc<dyn LastAccountStore> = match config
            .state_dir
            .clone()
            .or_else(FileAccountStore::default_dir)
        {
            Some(dir) => Arc::new(FileAccountStore::in_dir(dir)),
            None => Arc::new(MemoryAccountStore::default()),
        };
        Self::with_account_store(backend, config, store, tx)
    }

    /// Create a new Conductor with an explicit last-account store
    pub fn with_account_store(
        backend: B,
        config: ConductorConfig,
        store: Arc<dyn LastAccountStore>,
        tx: mpsc::Sender<SessionMessage>,
    ) -> Self {
        Self {
            model: config.default_model.clone(),
            persistence: ConversationPersistence::new(config.conversation_name_max_chars),
            config,
            backend: Arc::new(backend),
            conversation: ConversationState::new(),
            bootstrap: SessionBootstrap::new(store),
            scope_watcher: ScopeWatcher::new(),
            state: ConductorState::Idle,
            phase: None,
            turn: None,
            quitting: false,
            tx,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Get current turn state
    pub fn state(&self) -> ConductorState {
        self.state
    }

    /// Whether questions may be submitted (an account is active)
    pub fn is_ready(&self) -> bool {
        self.bootstrap.is_ready()
    }

    /// Whether a turn is in flight
    pub fn is_busy(&self) -> bool {
        self.turn.is_some()
    }

    /// Whether a turn or a save is in flight, so [`Self::next_update`] has work
    pub fn has_pending_work(&self) -> bool {
        self.turn.is_some() || self.persistence.is_saving()
    }

    /// Whether quit was requested
    pub fn is_quitting(&self) -> bool {
        self.quitting
    }

    /// Committed history
    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    /// Text streamed so far in the running turn
    pub fn streaming_text(&self) -> Option<&str> {
        self.turn.as_ref().map(|t| t.buffer.as_str())
    }

    /// Phase text of the running turn
    pub fn phase(&self) -> Option<&str> {
        self.phase.as_deref()
    }

    /// Id of the saved conversation, if any
    pub fn conversation_id(&self) -> Option<&str> {
        self.persistence.conversation_id()
    }

    /// Share token of the saved conversation, if any
    pub fn share_token(&self) -> Option<&str> {
        self.persistence.share_token()
    }

    /// Model for the next question
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Known accounts, `None` until loaded
    pub fn accounts(&self) -> Option<&[Account]> {
        self.bootstrap.accounts()
    }

    /// Active account id
    pub fn active_account(&self) -> Option<&str> {
        self.bootstrap.active()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start the session: check the server, load accounts, resolve a scope
    pub async fn start(&mut self) {
        if !self.backend.health_check().await {
            self.notify(
                NotifyLevel::Warning,
                &format!("{} server not reachable - requests may fail", self.backend.name()),
            )
            .await;
        }

        self.send(SessionMessage::ModelChanged {
            model: self.model.clone(),
        })
        .await;
        self.send(SessionMessage::Ready { ready: false }).await;
        self.refresh_accounts().await;
    }

    /// Handle an event from the surface
    pub async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Submit { content } => self.submit(content).await,
            SessionEvent::Cancel => self.cancel().await,
            SessionEvent::SwitchAccount { account_id } => self.switch_account(account_id).await,
            SessionEvent::RefreshAccounts => self.refresh_accounts().await,
            SessionEvent::NewConversation => {
                self.abandon_turn().await;
                self.reset_conversation().await;
            }
            SessionEvent::LoadConversation { conversation_id } => {
                self.load_conversation(&conversation_id).await;
            }
            SessionEvent::OpenShared { share_token } => self.open_shared(&share_token).await,
            SessionEvent::ListConversations { search } => {
                self.list_conversations(search).await;
            }
            SessionEvent::UpdateNote { note } => self.update_note(&note).await,
            SessionEvent::SetModel { model } => self.set_model(model).await,
            SessionEvent::Quit => self.shutdown().await,
        }
    }

    /// Wait for the next turn item or save completion and apply it
    ///
    /// Returns `false` immediately when nothing is in flight. Cancel safe, so
    /// it can sit in a `select!` next to user input.
    pub async fn next_update(&mut self) -> bool {
        let saving = self.persistence.is_saving();
        let update = match self.turn.as_mut() {
            Some(turn) => {
                tokio::select! {
                    biased;
                    item = turn.rx.recv() => Update::Turn(item),
                    outcome = self.persistence.next_completion(), if saving => Update::Save(outcome),
                }
            }
            None if saving => Update::Save(self.persistence.next_completion().await),
            None => return false,
        };

        match update {
            Update::Turn(Some(item)) => self.dispatch(item).await,
            Update::Turn(None) => {
                self.fail_turn(TurnError::Transport(TransportError::Aborted))
                    .await;
            }
            Update::Save(outcome) => self.on_save(outcome).await,
        }
        true
    }

    /// Apply updates until no turn or save is in flight
    pub async fn run_until_idle(&mut self) {
        while self.next_update().await {}
    }

    /// Apply every update that is already available, without waiting
    ///
    /// Returns true if there was activity.
    pub async fn poll_streaming(&mut self) -> bool {
        let mut activity = false;

        while let Some(turn) = self.turn.as_mut() {
            match turn.rx.try_recv() {
                Ok(item) => {
                    activity = true;
                    self.dispatch(item).await;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    activity = true;
                    self.fail_turn(TurnError::Transport(TransportError::Aborted))
                        .await;
                }
            }
        }

        if let Some(outcome) = self.persistence.try_completion() {
            activity = true;
            self.on_save(outcome).await;
        }
        activity
    }

    /// End the session
    pub async fn shutdown(&mut self) {
        self.abandon_turn().await;
        self.quitting = true;
        self.send(SessionMessage::Quit).await;
    }

    // ========================================================================
    // Turns
    // ========================================================================

    /// Start a turn; a no-op unless idle, ready, and the text is acceptable
    async fn submit(&mut self, content: String) {
        if self.turn.is_some() || self.state != ConductorState::Idle {
            tracing::debug!(state = ?self.state, "Ignoring submit while a turn is in flight");
            return;
        }
        if !self.bootstrap.is_ready() {
            self.notify(NotifyLevel::Warning, "No active account yet").await;
            return;
        }
        let text = content.trim();
        if text.is_empty() {
            return;
        }
        if text.chars().count() > self.config.max_input_length {
            self.notify(
                NotifyLevel::Warning,
                &format!(
                    "Message too long (max {} characters)",
                    self.config.max_input_length
                ),
            )
            .await;
            return;
        }

        let history = self.conversation.history();
        let message = Message::user(text);
        let index = self.conversation.push(message.clone());
        self.send(SessionMessage::MessageAppended { index, message })
            .await;

        let started = Instant::now();
        self.set_state(ConductorState::Sending).await;

        let request = ChatRequest::new(text, self.model.clone())
            .with_history(history)
            .with_account(self.bootstrap.active().map(str::to_string));
        let spec = TurnSpec {
            request,
            streaming: self.config.streaming,
            deadline: started + self.config.backend.request_timeout,
        };

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let task = spawn_turn(Arc::clone(&self.backend), spec, tx);
        self.turn = Some(ActiveTurn {
            rx,
            task,
            buffer: String::new(),
            started,
        });
    }

    /// Apply one item of the running turn
    async fn dispatch(&mut self, item: TurnItem) {
        match item {
            TurnItem::Opened => {
                if self.state == ConductorState::Sending {
                    self.set_state(ConductorState::Streaming).await;
                }
            }
            TurnItem::Settling => self.set_state(ConductorState::Settling).await,
            TurnItem::Failed(error) => self.fail_turn(error).await,
            TurnItem::Event(ProtocolEvent::Status { message, tool_name }) => {
                self.phase = Some(message.clone());
                self.send(SessionMessage::Status { message, tool_name })
                    .await;
            }
            TurnItem::Event(ProtocolEvent::Token { text }) => {
                if let Some(turn) = self.turn.as_mut() {
                    turn.buffer.push_str(&text);
                }
                self.send(SessionMessage::Token { text }).await;
            }
            TurnItem::Event(ProtocolEvent::Final(payload)) => self.settle(payload).await,
            TurnItem::Event(ProtocolEvent::Error { detail }) => {
                self.fail_turn(TurnError::Server { detail }).await;
            }
        }
    }

    /// Commit the answer of the running turn, then save
    async fn settle(&mut self, payload: FinalPayload) {
        let Some(turn) = self.turn.take() else {
            return;
        };
        if self.state != ConductorState::Settling {
            self.set_state(ConductorState::Settling).await;
        }

        let message = compose_reply(payload, &turn.buffer, &self.model, turn.started.elapsed());
        let index = self.conversation.push(message.clone());
        self.send(SessionMessage::MessageCommitted { index, message })
            .await;

        self.phase = None;
        self.set_state(ConductorState::Idle).await;
        self.save_conversation().await;
    }

    /// Record a failed turn as an inline error; history is never rolled back
    async fn fail_turn(&mut self, error: TurnError) {
        let Some(turn) = self.turn.take() else {
            return;
        };
        turn.task.abort();
        self.phase = None;

        self.set_state(ConductorState::Failed).await;
        self.send(SessionMessage::TurnFailed {
            error: error.to_string(),
            retryable: error.is_retryable(),
        })
        .await;

        let message = Message::error(error.display_text());
        let index = self.conversation.push(message.clone());
        self.send(SessionMessage::MessageAppended { index, message })
            .await;

        self.set_state(ConductorState::Idle).await;
    }

    /// Abort the running turn, recording it as cancelled
    async fn cancel(&mut self) {
        if self.turn.is_some() {
            self.fail_turn(TurnError::Cancelled).await;
        }
    }

    /// Drop the running turn without recording anything
    async fn abandon_turn(&mut self) {
        if let Some(turn) = self.turn.take() {
            turn.task.abort();
            self.phase = None;
            self.set_state(ConductorState::Idle).await;
        }
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    async fn refresh_accounts(&mut self) {
        match self.backend.list_accounts().await {
            Ok(response) => {
                let upstream = response.current_account_id.clone();
                self.bootstrap.set_accounts(response);
                self.send(SessionMessage::AccountsLoaded {
                    accounts: self.bootstrap.accounts().map(<[_]>::to_vec).unwrap_or_default(),
                    active: self.bootstrap.active().map(str::to_string),
                })
                .await;
                if self.bootstrap.accounts().is_some_and(<[_]>::is_empty) {
                    self.notify(NotifyLevel::Warning, "No accounts available").await;
                }
                if self.bootstrap.needs_resolution() {
                    self.resolve_scope().await;
                } else {
                    self.follow_upstream(upstream.as_deref()).await;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load accounts");
                self.notify(NotifyLevel::Error, &format!("Failed to load accounts: {e}"))
                    .await;
            }
        }
    }

    async fn resolve_scope(&mut self) {
        if !self.bootstrap.needs_resolution() {
            return;
        }
        match self.bootstrap.resolve(&*self.backend).await {
            Ok(Some(account_id)) => {
                self.scope_watcher.observe(Some(&account_id));
                self.on_activated(account_id).await;
            }
            Ok(None) => {}
            Err(e) => {
                self.send(SessionMessage::Ready { ready: false }).await;
                self.notify(NotifyLevel::Error, &format!("Failed to activate account: {e}"))
                    .await;
            }
        }
    }

    /// Follow a change of the active account made outside this session
    ///
    /// A `None` reading means the server did not report an account for this
    /// refetch and never counts as a change.
    async fn follow_upstream(&mut self, reading: Option<&str>) {
        if !self.scope_watcher.observe(reading) {
            return;
        }
        let Some(account_id) = reading else {
            return;
        };
        if self.bootstrap.active() == Some(account_id) {
            return;
        }
        if !self.bootstrap.knows(account_id) {
            tracing::debug!(account_id = %account_id, "Upstream account not in list, ignoring");
            return;
        }

        tracing::info!(account_id = %account_id, "Active account changed upstream");
        self.abandon_turn().await;
        self.reset_conversation().await;
        self.send(SessionMessage::Ready { ready: false }).await;

        match self.bootstrap.activate(&*self.backend, account_id).await {
            Ok(()) => self.on_activated(account_id.to_string()).await,
            Err(e) => {
                self.notify(NotifyLevel::Error, &format!("Failed to activate account: {e}"))
                    .await;
            }
        }
    }

    /// Explicit switch: always a fresh conversation
    async fn switch_account(&mut self, account_id: String) {
        if !self.bootstrap.knows(&account_id) {
            self.notify(NotifyLevel::Error, &format!("Unknown account: {account_id}"))
                .await;
            return;
        }
        self.abandon_turn().await;
        self.reset_conversation().await;
        self.send(SessionMessage::Ready { ready: false }).await;

        match self.bootstrap.activate(&*self.backend, &account_id).await {
            Ok(()) => {
                self.scope_watcher.observe(Some(&account_id));
                self.on_activated(account_id).await;
            }
            Err(e) => {
                self.notify(NotifyLevel::Error, &format!("Failed to switch account: {e}"))
                    .await;
            }
        }
    }

    async fn on_activated(&mut self, account_id: String) {
        self.persistence.invalidate_index(None);
        self.send(SessionMessage::AccountActivated { account_id })
            .await;
        self.send(SessionMessage::Ready { ready: true }).await;
    }

    // ========================================================================
    // Conversations
    // ========================================================================

    async fn reset_conversation(&mut self) {
        self.conversation.clear();
        self.persistence.reset();
        self.send(SessionMessage::ConversationCleared).await;
    }

    async fn save_conversation(&mut self) {
        let result = self.persistence.schedule_save(
            Arc::clone(&self.backend),
            self.bootstrap.active(),
            &self.model,
            &self.conversation,
        );
        if let Err(e) = result {
            tracing::warn!(error = %e, "Conversation not saved");
            self.notify(NotifyLevel::Warning, &format!("Conversation not saved: {e}"))
                .await;
        }
    }

    async fn on_save(&mut self, outcome: SaveOutcome) {
        match outcome {
            SaveOutcome::Saved {
                conversation_id,
                share_token,
                resave,
                ..
            } => {
                self.send(SessionMessage::ConversationSaved {
                    conversation_id,
                    share_token,
                })
                .await;
                if resave {
                    self.save_conversation().await;
                }
            }
            SaveOutcome::Failed(e) => {
                self.notify(NotifyLevel::Warning, &format!("Failed to save conversation: {e}"))
                    .await;
            }
            SaveOutcome::Stale => {}
        }
    }

    async fn load_conversation(&mut self, conversation_id: &str) {
        match self.backend.get_conversation(conversation_id).await {
            Ok(conversation) => {
                self.abandon_turn().await;
                self.conversation.replace(conversation.messages.clone());
                self.persistence.restore(&conversation);
                if !conversation.model.is_empty() && conversation.model != self.model {
                    self.model.clone_from(&conversation.model);
                    self.send(SessionMessage::ModelChanged {
                        model: self.model.clone(),
                    })
                    .await;
                }
                tracing::info!(conversation_id = %conversation.id, "Conversation loaded");
                self.send(SessionMessage::ConversationLoaded { conversation })
                    .await;
            }
            Err(e) => {
                self.notify(NotifyLevel::Error, &format!("Failed to load conversation: {e}"))
                    .await;
            }
        }
    }

    async fn open_shared(&mut self, share_token: &str) {
        match self.backend.get_shared_conversation(share_token).await {
            Ok(conversation) => {
                self.send(SessionMessage::SharedConversation { conversation })
                    .await;
            }
            Err(e) => {
                self.notify(
                    NotifyLevel::Error,
                    &format!("Failed to open shared conversation: {e}"),
                )
                .await;
            }
        }
    }

    async fn list_conversations(&mut self, search: Option<String>) {
        let Some(account_id) = self.bootstrap.active().map(str::to_string) else {
            self.notify(NotifyLevel::Warning, "No active account yet").await;
            return;
        };
        match self
            .persistence
            .list(&*self.backend, &account_id, search.as_deref())
            .await
        {
            Ok(conversations) => {
                self.send(SessionMessage::ConversationIndex {
                    account_id,
                    search,
                    conversations,
                })
                .await;
            }
            Err(e) => {
                self.notify(NotifyLevel::Error, &format!("Failed to list conversations: {e}"))
                    .await;
            }
        }
    }

    async fn update_note(&mut self, note: &str) {
        match self.persistence.update_note(&*self.backend, note).await {
            Ok(()) => self.notify(NotifyLevel::Success, "Note saved").await,
            Err(e) => {
                self.notify(NotifyLevel::Error, &format!("Failed to save note: {e}"))
                    .await;
            }
        }
    }

    async fn set_model(&mut self, model: String) {
        let model = model.trim();
        if model.is_empty() || model == self.model {
            return;
        }
        self.model = model.to_string();
        self.send(SessionMessage::ModelChanged {
            model: self.model.clone(),
        })
        .await;
    }

    // ========================================================================
    // Surface helpers
    // ========================================================================

    /// Set state and notify the surface
    async fn set_state(&mut self, state: ConductorState) {
        self.state = state;
        self.send(SessionMessage::State { state }).await;
    }

    /// Send notification
    async fn notify(&self, level: NotifyLevel, message: &str) {
        self.send(SessionMessage::Notify {
            level,
            message: message.to_string(),
        })
        .await;
    }

    /// Send a message to the surface
    async fn send(&self, msg: SessionMessage) {
        if let Err(e) = self.tx.send(msg).await {
            tracing::warn!("Failed to send message to surface: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        AccountService, AccountsResponse, ByteStream, ChatTransport, ConversationStore,
        SaveConversationRequest, SaveConversationResponse,
    };
    use crate::conversation::{Conversation, ConversationSummary, ToolCall};
    use crate::error::{PersistenceError, ScopeActivationError, ToolOutputFetchError};
    use async_trait::async_trait;
    use futures::StreamExt;

    // Mock backend for testing
    struct MockBackend;

    #[async_trait]
    impl ChatTransport for MockBackend {
        fn name(&self) -> &str {
            "Mock"
        }

        async fn health_check(&self) -> bool {
            true
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<FinalPayload, TransportError> {
            Ok(FinalPayload::new("Hello!"))
        }

        async fn chat_stream(&self, _request: &ChatRequest) -> Result<ByteStream, TransportError> {
            let body = "event: token\ndata: {\"text\": \"Hello \"}\n\n\
                        event: token\ndata: {\"text\": \"world!\"}\n\n\
                        event: final\ndata: {\"response\": \"Hello world!\"}\n\n";
            Ok(futures::stream::iter(vec![Ok(bytes::Bytes::from(body))]).boxed())
        }

        async fn fetch_tool_outputs(
            &self,
            _request_id: &str,
        ) -> Result<Vec<ToolCall>, ToolOutputFetchError> {
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl AccountService for MockBackend {
        async fn list_accounts(&self) -> Result<AccountsResponse, TransportError> {
            Ok(AccountsResponse {
                accounts: vec![Account::new("acc-1", "Prod")],
                current_account_id: None,
                cached: false,
            })
        }

        async fn switch_account(&self, _account_id: &str) -> Result<(), ScopeActivationError> {
            Ok(())
        }
    }

    #[async_trait]
    impl ConversationStore for MockBackend {
        async fn save_conversation(
            &self,
            request: &SaveConversationRequest,
        ) -> Result<SaveConversationResponse, PersistenceError> {
            Ok(SaveConversationResponse {
                success: true,
                conversation_id: request
                    .conversation_id
                    .clone()
                    .unwrap_or_else(|| "conv-1".to_string()),
                share_token: Some("tok".to_string()),
            })
        }

        async fn get_conversation(&self, _id: &str) -> Result<Conversation, PersistenceError> {
            Err(PersistenceError::NotSaved)
        }

        async fn list_conversations(
            &self,
            _account_id: &str,
            _search: Option<&str>,
        ) -> Result<Vec<ConversationSummary>, PersistenceError> {
            Ok(Vec::new())
        }

        async fn get_shared_conversation(&self, _t: &str) -> Result<Conversation, PersistenceError> {
            Err(PersistenceError::NotSaved)
        }

        async fn update_note(&self, _id: &str, _note: &str) -> Result<(), PersistenceError> {
            Ok(())
        }
    }

    fn conductor(tx: mpsc::Sender<SessionMessage>) -> Conductor<MockBackend> {
        Conductor::with_account_store(
            MockBackend,
            ConductorConfig::default(),
            Arc::new(MemoryAccountStore::default()),
            tx,
        )
    }

    #[tokio::test]
    async fn test_conductor_creation() {
        let (tx, _rx) = mpsc::channel(100);
        let conductor = conductor(tx);

        assert_eq!(conductor.state(), ConductorState::Idle);
        assert!(!conductor.is_ready());
        assert_eq!(conductor.model(), crate::config::DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn test_conductor_start_activates_account() {
        let (tx, _rx) = mpsc::channel(100);
        let mut conductor = conductor(tx);

        conductor.start().await;

        assert!(conductor.is_ready());
        assert_eq!(conductor.active_account(), Some("acc-1"));
    }

    #[tokio::test]
    async fn test_submit_before_ready_is_noop() {
        let (tx, _rx) = mpsc::channel(100);
        let mut conductor = conductor(tx);

        conductor.handle_event(SessionEvent::submit("hi")).await;

        assert!(conductor.messages().is_empty());
        assert!(!conductor.is_busy());
    }

    #[tokio::test]
    async fn test_full_turn_commits_and_saves() {
        let (tx, _rx) = mpsc::channel(1000);
        let mut conductor = conductor(tx);
        conductor.start().await;

        conductor.handle_event(SessionEvent::submit("hi")).await;
        assert_eq!(conductor.state(), ConductorState::Sending);
        conductor.run_until_idle().await;

        assert_eq!(conductor.state(), ConductorState::Idle);
        assert_eq!(conductor.messages().len(), 2);
        assert_eq!(conductor.messages()[1].content, "Hello world!");
        assert_eq!(conductor.conversation_id(), Some("conv-1"));
        assert_eq!(conductor.share_token(), Some("tok"));
    }

    #[tokio::test]
    async fn test_set_model() {
        let (tx, mut rx) = mpsc::channel(100);
        let mut conductor = conductor(tx);

        conductor
            .handle_event(SessionEvent::SetModel {
                model: "other".to_string(),
            })
            .await;

        assert_eq!(conductor.model(), "other");
        assert_eq!(
            rx.recv().await,
            Some(SessionMessage::ModelChanged {
                model: "other".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_quit() {
        let (tx, mut rx) = mpsc::channel(100);
        let mut conductor = conductor(tx);

        conductor.handle_event(SessionEvent::Quit).await;

        assert!(conductor.is_quitting());
        assert_eq!(rx.recv().await, Some(SessionMessage::Quit));
    }
}
