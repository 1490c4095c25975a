// src/server/stream.rs

//! The streaming endpoint.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::http::header::{self, HeaderName};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::engine::Session;
use crate::errors::CmdStreamError;
use crate::types::OutboundEvent;

use super::{ApiError, AppState};

/// Query parameters for `GET /stream`.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Raw command text, split on whitespace into program + arguments.
    pub command: Option<String>,
}

/// `GET /stream?command=...`
///
/// Validates the command, starts a session in the background and returns
/// its events as `text/event-stream`. The response ends when the session
/// closes; dropping it (client disconnect) kills the process.
pub async fn cmd_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreamQuery>,
) -> Result<Response, ApiError> {
    debug!(?query, "stream request");
    let raw = query.command.unwrap_or_default();

    let (events_tx, events_rx) = mpsc::channel::<OutboundEvent>(state.channel_capacity);
    let session = Session::open(&raw, &state.sessions, events_tx).map_err(|e| match e {
        CmdStreamError::Validation(msg) => ApiError::bad_request(msg),
        other => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    })?;

    let request_id = session.id();
    info!(request_id = %request_id, command = %session.spec(), "stream opened");

    state
        .sessions
        .faults
        .supervise("stream session", async move {
            let outcome = session.run().await?;
            match outcome.as_error() {
                Some(reason) => info!(request_id = %request_id, %reason, "stream ended early"),
                None => info!(request_id = %request_id, ?outcome, "stream closed"),
            }
            Ok::<(), CmdStreamError>(())
        });

    let events = ReceiverStream::new(events_rx).map(|event| Ok::<_, Infallible>(to_sse_event(&event)));
    let sse = Sse::new(events).keep_alive(KeepAlive::new().interval(state.keep_alive));

    let headers = [
        (header::CACHE_CONTROL, "no-cache"),
        (header::CONNECTION, "keep-alive"),
        (HeaderName::from_static("x-accel-buffering"), "no"),
    ];
    Ok((headers, sse).into_response())
}

/// One event frame per outbound event; the payload is the raw line text or
/// the terminal marker.
pub fn to_sse_event(event: &OutboundEvent) -> SseEvent {
    // Carriage returns would end the SSE line early.
    SseEvent::default().data(event.payload().replace('\r', ""))
}
