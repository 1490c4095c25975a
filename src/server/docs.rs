// src/server/docs.rs

//! Static OpenAPI description of the streaming endpoint.

use axum::Json;
use axum::response::IntoResponse;
use serde_json::{Value, json};

/// The OpenAPI 3.0 document served at `/api-docs`.
pub fn openapi_document() -> Value {
    json!({
        "openapi": "3.0.0",
        "info": {
            "title": "cmdstream API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Run a command and stream its output as server-sent events."
        },
        "paths": {
            "/stream": {
                "get": {
                    "summary": "Execute a command and stream its output",
                    "description": "Streams the stdout and stderr lines of a command to the client. \
                        The stream ends with `exit:<code>` or `error:<kind>`.",
                    "parameters": [{
                        "in": "query",
                        "name": "command",
                        "required": true,
                        "description": "Program and arguments, separated by whitespace. No shell features.",
                        "schema": { "type": "string" }
                    }],
                    "responses": {
                        "200": {
                            "description": "Successful operation",
                            "content": {
                                "text/event-stream": { "schema": { "type": "string" } }
                            }
                        },
                        "400": { "description": "Missing or invalid query parameter" }
                    }
                }
            }
        }
    })
}

/// `GET /api-docs`
pub async fn cmd_api_docs() -> impl IntoResponse {
    Json(openapi_document())
}
