//! Error Types
//!
//! Typed outcomes for every suspension point a session owns. Each component
//! catches failures at its own boundary and converts them into one of these
//! enums; nothing here is allowed to undo an earlier successful commit.
//!
//! | Error | Fatal to the turn? | Retry |
//! |-------|--------------------|-------|
//! | [`TransportError`] | yes | user resubmits |
//! | [`ProtocolViolation`] | yes | user resubmits |
//! | [`ToolOutputFetchError`] | no | none, truncated data kept |
//! | [`PersistenceError`] | no | next committed turn |
//! | [`ScopeActivationError`] | session stays not-ready | explicit switch |

use thiserror::Error;

/// Failure of the underlying HTTP channel
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request ceiling elapsed before the turn finished
    #[error("request timed out")]
    Timeout,

    /// Server answered with a non-success status
    #[error("server returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// Connection-level failure (DNS, refused, reset, broken body)
    #[error("network error: {0}")]
    Network(String),

    /// Response body could not be decoded
    #[error("invalid response body: {0}")]
    Decode(String),

    /// Transport was aborted by the caller
    #[error("request aborted")]
    Aborted,
}

impl TransportError {
    /// Whether resubmitting could succeed. Client errors other than 408/429 won't.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => {
                !(400..500).contains(status) || *status == 408 || *status == 429
            }
            _ => true,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status {
                status: status.as_u16(),
                body: String::new(),
            }
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// The event stream broke the terminal-event contract
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// Channel closed before a `final` or `error` record
    #[error("stream closed without a terminal event after {events_seen} events")]
    MissingTerminal {
        /// Events decoded before the channel closed
        events_seen: usize,
    },

    /// A terminal record arrived but its payload could not be parsed
    #[error("malformed `{event}` payload: {reason}")]
    MalformedTerminal {
        /// Event name (`final` or `error`)
        event: String,
        /// Parser message
        reason: String,
    },

    /// Pending data outgrew the decoder limit without ending a record
    #[error("event record exceeds {limit} bytes")]
    RecordTooLarge {
        /// Limit in bytes
        limit: usize,
    },
}

/// Why a turn ended without a committed answer
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TurnError {
    /// Network failure, abort, or timeout
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Stream ended in violation of the protocol
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    /// Server sent an explicit `error` event
    #[error("{detail}")]
    Server {
        /// Message supplied by the server
        detail: String,
    },

    /// User cancelled the turn
    #[error("cancelled")]
    Cancelled,
}

impl TurnError {
    /// Whether resubmitting the same message could succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            Self::Protocol(_) | Self::Server { .. } | Self::Cancelled => true,
        }
    }

    /// Text used for the inline error message in history
    #[must_use]
    pub fn display_text(&self) -> String {
        match self {
            Self::Cancelled => "Request cancelled.".to_string(),
            Self::Server { detail } => format!("Error: {detail}"),
            other => format!("Error: {other}"),
        }
    }
}

/// Secondary fetch of full tool outputs failed
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("failed to fetch tool outputs for request {request_id}: {source}")]
pub struct ToolOutputFetchError {
    /// Request whose outputs were requested
    pub request_id: String,
    /// Underlying transport failure
    #[source]
    pub source: TransportError,
}

/// Conversation save or lookup failed
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PersistenceError {
    /// Server unreachable or rejected the call
    #[error("persistence request failed: {0}")]
    Transport(#[from] TransportError),

    /// No active account to attribute the conversation to
    #[error("no active account")]
    MissingAccount,

    /// No conversation has been saved yet
    #[error("conversation has not been saved yet")]
    NotSaved,

    /// Server reported failure without a transport error
    #[error("server rejected the request: {0}")]
    Rejected(String),
}

/// Activating a scope (account) failed
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ScopeActivationError {
    /// Server unreachable or rejected the call
    #[error("account activation failed: {0}")]
    Transport(#[from] TransportError),

    /// The requested account is not in the known list
    #[error("unknown account: {0}")]
    UnknownAccount(String),

    /// Server reported failure without a transport error
    #[error("server rejected account switch: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_retryability() {
        assert!(TransportError::Timeout.is_retryable());
        assert!(TransportError::Aborted.is_retryable());
        assert!(TransportError::Status {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!TransportError::Status {
            status: 404,
            body: String::new()
        }
        .is_retryable());
        assert!(TransportError::Status {
            status: 429,
            body: String::new()
        }
        .is_retryable());
    }

    #[test]
    fn test_protocol_violation_is_retryable_turn_error() {
        let err: TurnError = ProtocolViolation::MissingTerminal { events_seen: 2 }.into();
        assert!(err.is_retryable());
        assert!(err.display_text().contains("without a terminal event"));
    }

    #[test]
    fn test_display_text() {
        assert_eq!(TurnError::Cancelled.display_text(), "Request cancelled.");
        assert_eq!(
            TurnError::Server {
                detail: "boom".to_string()
            }
            .display_text(),
            "Error: boom"
        );
        assert_eq!(
            TurnError::from(TransportError::Timeout).display_text(),
            "Error: request timed out"
        );
    }
}
