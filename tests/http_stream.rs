// tests/http_stream.rs
//
// The HTTP surface, driven through the router without a socket.
mod common;
use crate::common::{init_tracing, system_context, with_timeout};

use std::error::Error;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use tower::ServiceExt;

use cmdstream::config::ConfigFile;
use cmdstream::server::{AppState, build_app};

type TestResult = Result<(), Box<dyn Error>>;

fn app() -> axum::Router {
    let state = AppState::new(system_context(), &ConfigFile::default());
    build_app(Arc::new(state), true)
}

async fn body_text(response: axum::response::Response) -> Result<String, Box<dyn Error>> {
    let bytes = with_timeout(response.into_body().collect()).await?.to_bytes();
    Ok(String::from_utf8(bytes.to_vec())?)
}

fn get(uri: &str) -> Result<Request<Body>, Box<dyn Error>> {
    Ok(Request::builder().uri(uri).body(Body::empty())?)
}

#[tokio::test]
async fn missing_command_is_a_bad_request() -> TestResult {
    init_tracing();

    for uri in ["/stream", "/stream?command=", "/stream?command=%20%20"] {
        let response = app().oneshot(get(uri)?).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(
            body_text(response).await?,
            "Error: 'command' query parameter is required"
        );
    }

    Ok(())
}

#[tokio::test]
async fn echo_is_streamed_as_server_sent_events() -> TestResult {
    init_tracing();

    let response = app().oneshot(get("/stream?command=echo%20hello")?).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert_eq!(
        headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );
    assert_eq!(
        headers.get(header::CACHE_CONTROL).and_then(|v| v.to_str().ok()),
        Some("no-cache")
    );
    assert_eq!(
        headers.get(header::CONNECTION).and_then(|v| v.to_str().ok()),
        Some("keep-alive")
    );

    let body = body_text(response).await?;
    let hello = body.find("data: hello\n\n").expect("output line event");
    let exit = body.find("data: exit:0\n\n").expect("exit marker event");
    assert!(hello < exit, "exit marker must come last: {body:?}");

    Ok(())
}

#[tokio::test]
async fn missing_program_streams_a_single_spawn_error() -> TestResult {
    init_tracing();

    let response = app()
        .oneshot(get("/stream?command=doesnotexist123")?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_text(response).await?;
    assert_eq!(body.matches("data: ").count(), 1, "{body:?}");
    assert!(body.contains("data: error:spawn\n\n"));

    Ok(())
}

#[tokio::test]
async fn api_docs_describe_the_stream_endpoint() -> TestResult {
    init_tracing();

    let response = app().oneshot(get("/api-docs")?).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let doc: serde_json::Value = serde_json::from_str(&body_text(response).await?)?;
    assert!(doc["paths"]["/stream"]["get"].is_object());
    assert_eq!(
        doc["paths"]["/stream"]["get"]["parameters"][0]["name"],
        "command"
    );

    Ok(())
}

#[tokio::test]
async fn unknown_routes_are_not_found() -> TestResult {
    let response = app().oneshot(get("/nope")?).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}
