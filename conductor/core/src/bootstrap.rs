//! Session Bootstrap
//!
//! Decides which data scope (account) a session queries, and gates whether
//! the session may accept questions.
//!
//! # Resolution Priority
//!
//! 1. The account this user picked last time, if it is still listed
//! 2. The account the server reports as current, if it is listed
//! 3. The first listed account
//!
//! Resolution runs once the account list is non-empty, only if no
//! resolution is in progress and none has succeeded yet. Activation failures
//! leave the session not-ready; there is no automatic retry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::backend::{AccountService, AccountsResponse};
use crate::conversation::Account;
use crate::error::ScopeActivationError;

/// File name of the persisted account choice
pub const LAST_ACCOUNT_FILE: &str = "last_account";

/// Pick the account to activate
///
/// Returns `None` only when `accounts` is empty.
#[must_use]
pub fn resolve_scope<'a>(
    persisted: Option<&str>,
    upstream: Option<&str>,
    accounts: &'a [Account],
) -> Option<&'a Account> {
    let find = |id: Option<&str>| id.and_then(|id| accounts.iter().find(|a| a.account_id == id));
    find(persisted)
        .or_else(|| find(upstream))
        .or_else(|| accounts.first())
}

// ============================================================================
// Local persistence of the chosen account
// ============================================================================

/// Where the last chosen account is remembered between runs
#[async_trait]
pub trait LastAccountStore: Send + Sync {
    /// Previously saved account id, if any
    async fn load(&self) -> Option<String>;

    /// Remember an account id
    async fn save(&self, account_id: &str) -> std::io::Result<()>;
}

/// Stores the account id in a small text file
#[derive(Clone, Debug)]
pub struct FileAccountStore {
    path: PathBuf,
}

impl FileAccountStore {
    /// Store at an explicit file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store as [`LAST_ACCOUNT_FILE`] inside `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(LAST_ACCOUNT_FILE))
    }

    /// `$XDG_STATE_HOME/costchat` or the platform's local data dir
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .map(|p| p.join("costchat"))
    }

    /// File path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LastAccountStore for FileAccountStore {
    async fn load(&self) -> Option<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let id = content.trim();
                (!id.is_empty()).then(|| id.to_string())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read last account");
                None
            }
        }
    }

    async fn save(&self, account_id: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, account_id).await
    }
}

/// In-memory store for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    value: Mutex<Option<String>>,
}

impl MemoryAccountStore {
    /// Create a store pre-seeded with an account id
    pub fn with_value(account_id: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(Some(account_id.into())),
        }
    }
}

#[async_trait]
impl LastAccountStore for MemoryAccountStore {
    async fn load(&self) -> Option<String> {
        self.value.lock().await.clone()
    }

    async fn save(&self, account_id: &str) -> std::io::Result<()> {
        *self.value.lock().await = Some(account_id.to_string());
        Ok(())
    }
}

// ============================================================================
// Bootstrap state
// ============================================================================

/// Account list, active scope and readiness of one session
pub struct SessionBootstrap {
    /// Known accounts; `None` while (re)loading
    accounts: Option<Vec<Account>>,
    /// Account the server last reported as current
    upstream_current: Option<String>,
    /// Successfully activated account
    active: Option<String>,
    /// Session may accept questions
    ready: bool,
    /// An automatic resolution is running
    resolving: bool,
    /// An automatic resolution has succeeded
    resolved: bool,
    /// Where the chosen account is remembered
    store: Arc<dyn LastAccountStore>,
}

impl SessionBootstrap {
    /// Create with a last-account store
    pub fn new(store: Arc<dyn LastAccountStore>) -> Self {
        Self {
            accounts: None,
            upstream_current: None,
            active: None,
            ready: false,
            resolving: false,
            resolved: false,
            store,
        }
    }

    /// Known accounts, `None` while loading
    #[must_use]
    pub fn accounts(&self) -> Option<&[Account]> {
        self.accounts.as_deref()
    }

    /// Active account id
    #[must_use]
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Active account, if it is in the known list
    #[must_use]
    pub fn active_account(&self) -> Option<&Account> {
        let active = self.active.as_deref()?;
        self.accounts
            .as_ref()?
            .iter()
            .find(|a| a.account_id == active)
    }

    /// Whether questions may be submitted
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Whether `account_id` may be activated (always true before the list loads)
    #[must_use]
    pub fn knows(&self, account_id: &str) -> bool {
        self.accounts
            .as_ref()
            .map_or(true, |accounts| accounts.iter().any(|a| a.account_id == account_id))
    }

    /// Install a freshly fetched account list
    pub fn set_accounts(&mut self, response: AccountsResponse) {
        self.upstream_current = response.current_account_id;
        self.accounts = Some(response.accounts);
    }

    /// Whether [`resolve`](Self::resolve) would do anything
    #[must_use]
    pub fn needs_resolution(&self) -> bool {
        !self.resolving && !self.resolved && self.accounts.as_ref().is_some_and(|a| !a.is_empty())
    }

    /// Resolve and activate the initial scope
    ///
    /// Returns the activated id, or `None` if resolution was not needed.
    ///
    /// # Errors
    ///
    /// Returns the activation error; the session stays not-ready.
    pub async fn resolve<B>(&mut self, backend: &B) -> Result<Option<String>, ScopeActivationError>
    where
        B: AccountService + ?Sized,
    {
        if !self.needs_resolution() {
            return Ok(None);
        }
        self.resolving = true;

        let persisted = self.store.load().await;
        let chosen = self
            .accounts
            .as_deref()
            .and_then(|accounts| {
                resolve_scope(
                    persisted.as_deref(),
                    self.upstream_current.as_deref(),
                    accounts,
                )
            })
            .map(|a| a.account_id.clone());

        let Some(account_id) = chosen else {
            self.resolving = false;
            return Ok(None);
        };

        tracing::debug!(
            account_id = %account_id,
            persisted = ?persisted,
            upstream = ?self.upstream_current,
            "Resolved initial account"
        );

        let result = self.activate(backend, &account_id).await;
        self.resolving = false;
        result?;
        self.resolved = true;
        Ok(Some(account_id))
    }

    /// Activate an account
    ///
    /// # Errors
    ///
    /// Returns [`ScopeActivationError::UnknownAccount`] if the account is not
    /// in a loaded list, or the server's failure.
    pub async fn activate<B>(&mut self, backend: &B, account_id: &str) -> Result<(), ScopeActivationError>
    where
        B: AccountService + ?Sized,
    {
        if !self.knows(account_id) {
            return Err(ScopeActivationError::UnknownAccount(account_id.to_string()));
        }

        self.ready = false;
        if let Err(e) = backend.switch_account(account_id).await {
            tracing::warn!(account_id = %account_id, error = %e, "Account activation failed");
            return Err(e);
        }

        self.active = Some(account_id.to_string());
        self.ready = true;
        self.resolved = true;
        tracing::info!(account_id = %account_id, "Account activated");

        if let Err(e) = self.store.save(account_id).await {
            tracing::warn!(error = %e, "Failed to persist last account");
        }
        Ok(())
    }
}

/// Detects changes of the active scope across refetch cycles
///
/// Null readings (list or scope momentarily unknown while reloading) are
/// ignored, so they never look like a change.
#[derive(Clone, Debug, Default)]
pub struct ScopeWatcher {
    last: Option<String>,
}

impl ScopeWatcher {
    /// Create a watcher with no observation yet
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reading; true if it differs from the previous non-null one
    pub fn observe(&mut self, reading: Option<&str>) -> bool {
        let Some(current) = reading else {
            return false;
        };
        let changed = self.last.as_deref().is_some_and(|last| last != current);
        if self.last.as_deref() != Some(current) {
            self.last = Some(current.to_string());
        }
        changed
    }

    /// Last non-null reading
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }
}
