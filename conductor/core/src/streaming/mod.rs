//! Streaming Turn Infrastructure
//!
//! This module turns one chat request into an ordered sequence of
//! [`TurnItem`]s delivered over an `mpsc` channel. The spawned turn task owns
//! every network suspension point of a turn; the controller owns every
//! mutation of history.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────── turn task ───────────────────────────┐
//! │                                                                  │
//! │  chat_stream() ──► bytes ──► StreamDecoder ──► ProtocolEvent     │
//! │        │                                          │              │
//! │        │ (timeout_at deadline)                    │ final?       │
//! │        ▼                                          ▼              │
//! │     Opened                           fetch_tool_outputs()        │
//! │                                        (non-fatal)               │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │ mpsc::Sender<TurnItem>
//!                                 ▼
//!                     Conductor::dispatch (single consumer)
//! ```
//!
//! # Cancellation
//!
//! Aborting the task's `JoinHandle` drops the HTTP body stream, so a pending
//! chunk read ends at its next poll. Items already delivered stay valid; the
//! controller drops its receiver at the same time, so nothing after the abort
//! is dispatched.

mod decoder;
mod event;

pub use decoder::{StreamDecoder, MAX_PENDING_BYTES};
pub use event::{FinalPayload, ProtocolEvent};

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::backend::{ChatRequest, ChatTransport};
use crate::error::{TransportError, TurnError};

/// Progress of a running turn, as seen by the controller
#[derive(Clone, Debug, PartialEq)]
pub enum TurnItem {
    /// Response headers arrived; events follow
    Opened,
    /// A decoded protocol event
    Event(ProtocolEvent),
    /// Final answer received; complete tool outputs are being fetched
    Settling,
    /// The turn failed before a terminal event
    Failed(TurnError),
}

/// Parameters of one turn
#[derive(Clone, Debug)]
pub struct TurnSpec {
    /// Request body
    pub request: ChatRequest,
    /// Use `POST /chat/stream` (true) or `POST /chat` (false)
    pub streaming: bool,
    /// Instant after which the turn fails with a timeout
    pub deadline: Instant,
}

/// Spawn the task that drives one turn
///
/// Items are sent on `tx` in arrival order. The task ends after a terminal
/// event or a `Failed` item, or as soon as `tx` is closed.
pub fn spawn_turn<B>(backend: Arc<B>, spec: TurnSpec, tx: mpsc::Sender<TurnItem>) -> JoinHandle<()>
where
    B: ChatTransport + ?Sized + 'static,
{
    tokio::spawn(async move {
        let received = tokio::time::timeout_at(spec.deadline, receive(&*backend, &spec, &tx))
            .await
            .unwrap_or_else(|_| Err(TransportError::Timeout.into()));

        match received {
            Ok(Some(payload)) => {
                if let Err(e) = settle(&*backend, payload, spec.deadline, &tx).await {
                    tracing::debug!(error = %e, "Turn receiver closed while settling");
                }
            }
            Ok(None) => {}
            Err(TurnError::Cancelled) => {
                tracing::debug!("Turn receiver closed, stopping");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Turn failed");
                if tx.send(TurnItem::Failed(e)).await.is_err() {
                    tracing::debug!("Turn receiver closed before failure was reported");
                }
            }
        }
    })
}

async fn forward(tx: &mpsc::Sender<TurnItem>, item: TurnItem) -> Result<(), TurnError> {
    tx.send(item).await.map_err(|_| TurnError::Cancelled)
}

/// Read until a terminal event
///
/// Returns the final payload, or `None` if an `error` event was forwarded.
async fn receive<B>(
    backend: &B,
    spec: &TurnSpec,
    tx: &mpsc::Sender<TurnItem>,
) -> Result<Option<FinalPayload>, TurnError>
where
    B: ChatTransport + ?Sized,
{
    if !spec.streaming {
        let payload = backend.chat(&spec.request).await?;
        forward(tx, TurnItem::Opened).await?;
        return Ok(Some(payload));
    }

    let mut stream = backend.chat_stream(&spec.request).await?;
    forward(tx, TurnItem::Opened).await?;

    let mut decoder = StreamDecoder::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        for event in decoder.push(&chunk) {
            if let Routed::Done(outcome) = route(event, tx).await? {
                return Ok(outcome);
            }
        }
        if let Some(violation) = decoder.overflow() {
            return Err(violation.clone().into());
        }
    }
    for event in decoder.finish() {
        if let Routed::Done(outcome) = route(event, tx).await? {
            return Ok(outcome);
        }
    }

    decoder.ensure_terminal()?;
    Ok(None)
}

enum Routed {
    Continue,
    Done(Option<FinalPayload>),
}

/// Forward non-final events; hand a final payload back for settling
async fn route(event: ProtocolEvent, tx: &mpsc::Sender<TurnItem>) -> Result<Routed, TurnError> {
    match event {
        ProtocolEvent::Final(payload) => Ok(Routed::Done(Some(payload))),
        ProtocolEvent::Error { .. } => {
            forward(tx, TurnItem::Event(event)).await?;
            Ok(Routed::Done(None))
        }
        other => {
            forward(tx, TurnItem::Event(other)).await?;
            Ok(Routed::Continue)
        }
    }
}

/// Replace truncated tool outputs if possible, then deliver the final event
///
/// The fetch shares the turn deadline. Running out of time keeps the
/// truncated outputs; the answer itself is already complete.
async fn settle<B>(
    backend: &B,
    mut payload: FinalPayload,
    deadline: Instant,
    tx: &mpsc::Sender<TurnItem>,
) -> Result<(), TurnError>
where
    B: ChatTransport + ?Sized,
{
    if let (true, Some(request_id)) = (payload.needs_tool_outputs(), payload.request_id.clone()) {
        forward(tx, TurnItem::Settling).await?;
        let fetched =
            tokio::time::timeout_at(deadline, backend.fetch_tool_outputs(&request_id)).await;
        match fetched {
            Ok(Ok(full)) if !full.is_empty() => payload.tool_calls = full,
            Ok(Ok(_)) => {
                tracing::debug!(request_id = %request_id, "Empty tool outputs, keeping originals");
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Keeping truncated tool outputs");
            }
            Err(_) => {
                tracing::warn!(request_id = %request_id, "Tool output fetch timed out, keeping truncated outputs");
            }
        }
    }
    forward(tx, TurnItem::Event(ProtocolEvent::Final(payload))).await
}
