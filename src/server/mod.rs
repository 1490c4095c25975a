// src/server/mod.rs

//! HTTP transport.
//!
//! - `GET /stream?command=...` opens a `text/event-stream` response driven by
//!   one [`Session`](crate::engine::Session) ([`stream`]).
//! - `GET /api-docs` serves a static OpenAPI description ([`docs`]).

pub mod docs;
pub mod stream;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tower_http::cors::CorsLayer;

use crate::config::ConfigFile;
use crate::engine::SessionContext;

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Registry, fault monitor and process backend shared by all sessions.
    pub sessions: SessionContext,
    /// Bounded queue size between a session and its response.
    pub channel_capacity: usize,
    /// SSE keep-alive interval.
    pub keep_alive: Duration,
}

impl AppState {
    pub fn new(sessions: SessionContext, config: &ConfigFile) -> Self {
        Self {
            sessions,
            channel_capacity: config.stream.channel_capacity,
            keep_alive: config.stream.keep_alive(),
        }
    }
}

/// An API error with HTTP status code and a plain-text message.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status.as_u16(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, format!("Error: {}", self.message)).into_response()
    }
}

/// Build the router with all routes. `cors` adds a permissive CORS layer.
pub fn build_app(state: Arc<AppState>, cors: bool) -> Router {
    let router = Router::new()
        .route("/stream", get(stream::cmd_stream))
        .route("/api-docs", get(docs::cmd_api_docs))
        .with_state(state);

    if cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}
