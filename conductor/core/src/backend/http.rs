//! HTTP Backend Implementation
//!
//! Talks to the costchat server over its JSON API.
//!
//! # Server API
//!
//! All paths are relative to the configured base URL (which includes `/api`):
//! - `POST /chat`, `POST /chat/stream` - ask a question
//! - `GET /tool-outputs/{request_id}` - complete tool outputs
//! - `GET /accounts`, `POST /switch-account` - scopes
//! - `POST /conversations/save`, `GET /conversations`, `GET /conversations/{id}`,
//!   `PUT /conversations/{id}/note`, `GET /share/{token}` - persistence
//! - `GET /health`
//!
//! The server binds the activated account to the session cookie, so the
//! client keeps a cookie jar for its lifetime.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::traits::{
    AccountService, AccountsResponse, BackendConfig, ByteStream, ChatRequest, ChatTransport,
    ConversationStore, SaveConversationRequest, SaveConversationResponse,
};
use crate::conversation::{Conversation, ConversationSummary, ToolCall};
use crate::error::{PersistenceError, ScopeActivationError, ToolOutputFetchError, TransportError};
use crate::streaming::FinalPayload;

/// HTTP client for the costchat server
#[derive(Clone)]
pub struct HttpBackend {
    /// Base URL without trailing slash
    base_url: String,
    /// Ceiling for chat calls
    request_timeout: Duration,
    /// Ceiling for every other call
    api_timeout: Duration,
    /// HTTP client with cookie jar
    http_client: reqwest::Client,
}

#[derive(Deserialize)]
struct ConversationList {
    #[serde(default)]
    conversations: Vec<ConversationSummary>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ToolOutputsBody {
    Wrapped { tool_calls: Vec<ToolCall> },
    Bare(Vec<ToolCall>),
}

#[derive(Serialize)]
struct SwitchAccountBody<'a> {
    account_id: &'a str,
}

#[derive(Deserialize)]
struct SwitchAccountResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
struct NoteBody<'a> {
    note: &'a str,
}

impl HttpBackend {
    /// Create a backend from connection settings
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &BackendConfig) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .cookie_store(true)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TransportError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout,
            api_timeout: config.api_timeout,
            http_client,
        })
    }

    /// Get the base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Turn non-success statuses into [`TransportError::Status`]
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, TransportError> {
        let response = self
            .http_client
            .get(self.url(path))
            .query(query)
            .timeout(self.api_timeout)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn send_json<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<T, TransportError> {
        let response = self
            .http_client
            .request(method, self.url(path))
            .json(body)
            .timeout(timeout)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}

#[async_trait]
impl ChatTransport for HttpBackend {
    fn name(&self) -> &'static str {
        "HTTP"
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(self.url("health"))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }

    async fn chat(&self, request: &ChatRequest) -> Result<FinalPayload, TransportError> {
        self.send_json(reqwest::Method::POST, "chat", request, self.request_timeout)
            .await
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<ByteStream, TransportError> {
        let response = self
            .http_client
            .post(self.url("chat/stream"))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = Self::check(response).await?;

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from))
            .boxed())
    }

    async fn fetch_tool_outputs(
        &self,
        request_id: &str,
    ) -> Result<Vec<ToolCall>, ToolOutputFetchError> {
        let body: ToolOutputsBody = self
            .get_json(&format!("tool-outputs/{request_id}"), &[])
            .await
            .map_err(|source| ToolOutputFetchError {
                request_id: request_id.to_string(),
                source,
            })?;
        Ok(match body {
            ToolOutputsBody::Wrapped { tool_calls } | ToolOutputsBody::Bare(tool_calls) => {
                tool_calls
            }
        })
    }
}

#[async_trait]
impl AccountService for HttpBackend {
    async fn list_accounts(&self) -> Result<AccountsResponse, TransportError> {
        self.get_json("accounts", &[]).await
    }

    async fn switch_account(&self, account_id: &str) -> Result<(), ScopeActivationError> {
        let response: SwitchAccountResponse = self
            .send_json(
                reqwest::Method::POST,
                "switch-account",
                &SwitchAccountBody { account_id },
                self.api_timeout,
            )
            .await?;
        if response.success {
            Ok(())
        } else {
            Err(ScopeActivationError::Rejected(
                response.message.unwrap_or_else(|| "no reason given".to_string()),
            ))
        }
    }
}

#[async_trait]
impl ConversationStore for HttpBackend {
    async fn save_conversation(
        &self,
        request: &SaveConversationRequest,
    ) -> Result<SaveConversationResponse, PersistenceError> {
        let response: SaveConversationResponse = self
            .send_json(
                reqwest::Method::POST,
                "conversations/save",
                request,
                self.api_timeout,
            )
            .await?;
        if response.success {
            Ok(response)
        } else {
            Err(PersistenceError::Rejected("save was not accepted".to_string()))
        }
    }

    async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Conversation, PersistenceError> {
        Ok(self
            .get_json(&format!("conversations/{conversation_id}"), &[])
            .await?)
    }

    async fn list_conversations(
        &self,
        account_id: &str,
        search: Option<&str>,
    ) -> Result<Vec<ConversationSummary>, PersistenceError> {
        let mut query = vec![("account_id", account_id)];
        if let Some(search) = search.filter(|s| !s.is_empty()) {
            query.push(("search", search));
        }
        let list: ConversationList = self.get_json("conversations", &query).await?;
        Ok(list.conversations)
    }

    async fn get_shared_conversation(
        &self,
        share_token: &str,
    ) -> Result<Conversation, PersistenceError> {
        Ok(self.get_json(&format!("share/{share_token}"), &[]).await?)
    }

    async fn update_note(&self, conversation_id: &str, note: &str) -> Result<(), PersistenceError> {
        let _: serde_json::Value = self
            .send_json(
                reqwest::Method::PUT,
                &format!("conversations/{conversation_id}/note"),
                &NoteBody { note },
                self.api_timeout,
            )
            .await?;
        Ok(())
    }
}
