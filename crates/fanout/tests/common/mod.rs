//! Mock upstreams for driving the engine end to end: an OpenAI-format SSE
//! chat endpoint and a registry discovery/status endpoint.

#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use futures::StreamExt;
use futures::stream;
use tokio::net::TcpListener;

pub const DONE_LINE: &str = "data: [DONE]\n\n";

pub fn token_line(text: &str) -> String {
    format!("data: {{\"choices\":[{{\"delta\":{{\"content\":\"{text}\"}}}}]}}\n\n")
}

pub fn sse_body(lines: &[String]) -> String {
    lines.concat()
}

/// How the mock chat endpoint answers.
pub enum ChatBehavior {
    /// Send a raw SSE body in one piece.
    Sse(String),
    /// Send chunks with a pause before each one.
    PacedSse { chunks: Vec<String>, gap: Duration },
    /// Answer with an HTTP error.
    Error { status: u16, body: String },
    /// Demand the gateway headers, then stream the body.
    GatedSse(String),
}

pub struct ChatUpstream {
    pub base_url: String,
    pub hits: Arc<AtomicU32>,
}

pub async fn spawn_chat_upstream(behavior: ChatBehavior) -> ChatUpstream {
    let hits = Arc::new(AtomicU32::new(0));
    let state = Arc::new((behavior, hits.clone()));

    let app = Router::new()
        .route("/v1/chat/completions", post(chat_handler))
        .with_state(state);

    ChatUpstream {
        base_url: serve(app).await,
        hits,
    }
}

async fn chat_handler(
    State(state): State<Arc<(ChatBehavior, Arc<AtomicU32>)>>,
    headers: HeaderMap,
    _body: String,
) -> Response {
    let (behavior, hits) = state.as_ref();
    hits.fetch_add(1, Ordering::SeqCst);

    match behavior {
        ChatBehavior::Sse(body) => sse_response(Body::from(body.clone())),
        ChatBehavior::PacedSse { chunks, gap } => {
            let gap = *gap;
            let paced = stream::iter(chunks.clone()).then(move |chunk| async move {
                tokio::time::sleep(gap).await;
                Ok::<_, Infallible>(Bytes::from(chunk))
            });

            sse_response(Body::from_stream(paced))
        }
        ChatBehavior::Error { status, body } => (
            StatusCode::from_u16(*status).expect("behavior status should be valid"),
            body.clone(),
        )
            .into_response(),
        ChatBehavior::GatedSse(body) => {
            if headers.get("x-github-api-version").is_none() {
                return (StatusCode::BAD_REQUEST, "missing api version header").into_response();
            }

            if headers.get(AUTHORIZATION).is_none() {
                return (StatusCode::UNAUTHORIZED, "missing bearer token").into_response();
            }

            sse_response(Body::from(body.clone()))
        }
    }
}

fn sse_response(body: Body) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/event-stream")
        .body(body)
        .expect("response should build")
}

/// One answer of the mock discovery endpoint.
pub struct DiscoveryResponse {
    pub delay: Duration,
    pub document: serde_json::Value,
}

impl DiscoveryResponse {
    pub fn immediate(document: serde_json::Value) -> Self {
        Self {
            delay: Duration::ZERO,
            document,
        }
    }
}

/// How the mock registry service behaves.
pub struct DiscoveryBehavior {
    /// Answer 503 to this many requests before succeeding.
    pub fail_first: u32,
    /// Successful answers, indexed by request number; the last one repeats.
    pub responses: Vec<DiscoveryResponse>,
    /// Status endpoint answers per model identifier; missing ids get a 404.
    pub statuses: HashMap<String, String>,
    /// Pause before every status answer.
    pub status_delay: Duration,
}

impl DiscoveryBehavior {
    pub fn serving(document: serde_json::Value) -> Self {
        Self {
            fail_first: 0,
            responses: vec![DiscoveryResponse::immediate(document)],
            statuses: HashMap::new(),
            status_delay: Duration::ZERO,
        }
    }
}

pub struct DiscoveryUpstream {
    pub base_url: String,
    pub hits: Arc<AtomicU32>,
}

pub async fn spawn_discovery_upstream(behavior: DiscoveryBehavior) -> DiscoveryUpstream {
    let hits = Arc::new(AtomicU32::new(0));
    let state = Arc::new((behavior, hits.clone()));

    let app = Router::new()
        .route("/api/models", get(models_handler))
        .route("/api/models/{id}/status", get(status_handler))
        .with_state(state);

    DiscoveryUpstream {
        base_url: serve(app).await,
        hits,
    }
}

async fn models_handler(State(state): State<Arc<(DiscoveryBehavior, Arc<AtomicU32>)>>) -> Response {
    let (behavior, hits) = state.as_ref();
    let request = hits.fetch_add(1, Ordering::SeqCst);

    if request < behavior.fail_first {
        return (StatusCode::SERVICE_UNAVAILABLE, "cold start").into_response();
    }

    let index = ((request - behavior.fail_first) as usize).min(behavior.responses.len() - 1);
    let response = &behavior.responses[index];

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    Json(response.document.clone()).into_response()
}

async fn status_handler(
    State(state): State<Arc<(DiscoveryBehavior, Arc<AtomicU32>)>>,
    Path(id): Path<String>,
) -> Response {
    let (behavior, _) = state.as_ref();

    if !behavior.status_delay.is_zero() {
        tokio::time::sleep(behavior.status_delay).await;
    }

    match behavior.statuses.get(&id) {
        Some(status) => Json(serde_json::json!({ "status": status })).into_response(),
        None => (StatusCode::NOT_FOUND, "unknown model").into_response(),
    }
}

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("should bind an ephemeral port");
    let address = listener.local_addr().expect("bound socket should have an address");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock server should run");
    });

    format!("http://{address}")
}

/// A discovery config tuned so tests do not wait out production backoffs.
pub fn fast_discovery_toml(base_url: &str) -> String {
    format!(
        r#"
        [discovery]
        base_url = "{base_url}"
        timeout = "2s"
        max_attempts = 4
        initial_backoff = "10ms"
        backoff_factor = 1.4
        max_backoff = "50ms"
        "#
    )
}

pub fn parse_config(toml_str: &str) -> Arc<config::Config> {
    Arc::new(toml::from_str(toml_str).expect("test config should parse"))
}

/// Drain a chat stream with a guard timeout.
pub async fn collect_events(stream: fanout::ChatEventStream) -> Vec<fanout::ChatEvent> {
    tokio::time::timeout(Duration::from_secs(10), stream.collect::<Vec<_>>())
        .await
        .expect("stream should finish well within the guard timeout")
}

/// The events belonging to one model, in delivery order.
pub fn events_for<'a>(events: &'a [fanout::ChatEvent], model_id: &str) -> Vec<&'a fanout::ChatEvent> {
    events.iter().filter(|event| event.model_id() == model_id).collect()
}
