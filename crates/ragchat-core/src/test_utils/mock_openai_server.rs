use async_stream::stream;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::post, Json, Router};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

pub const DEFAULT_REPLY: &str = "Rust is a systems programming language.";

#[derive(Clone)]
struct MockServerState {
    reply: Arc<Mutex<String>>,
    chat_requests: Arc<Mutex<Vec<Value>>>,
    embedding_requests: Arc<AtomicUsize>,
    failures_left: Arc<AtomicUsize>,
    break_stream: Arc<AtomicBool>,
    stream_delay: Arc<Mutex<Option<Duration>>>,
}

impl MockServerState {
    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Without a delay the events go out as one body. With one, each event is
/// written separately after sleeping.
fn event_stream_response(events: Vec<String>, delay: Option<Duration>) -> Response {
    let body = match delay {
        None => Body::from(events.concat()),
        Some(delay) => Body::from_stream(stream! {
            for event in events {
                tokio::time::sleep(delay).await;
                yield Ok::<_, Infallible>(event);
            }
        }),
    };
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

fn failure_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": {"message": "mock failure", "type": "server_error"}})),
    )
        .into_response()
}

async fn chat_completions_handler(
    State(state): State<MockServerState>,
    Json(payload): Json<Value>,
) -> Response {
    log::debug!("Mock OpenAI server received chat request: {}", payload);
    state.chat_requests.lock().unwrap().push(payload.clone());

    if state.take_failure() {
        return failure_response();
    }

    let reply = state.reply.lock().unwrap().clone();
    let model = payload["model"].as_str().unwrap_or("mock").to_string();

    if payload["stream"].as_bool().unwrap_or(false) {
        let mut events = Vec::new();
        for (i, word) in reply.split_inclusive(' ').enumerate() {
            let chunk = json!({
                "id": "chatcmpl-mock",
                "object": "chat.completion.chunk",
                "model": model,
                "choices": [{"index": 0, "delta": {"content": word}, "finish_reason": null}]
            });
            events.push(format!("data: {}\n\n", chunk));

            if i == 0 && state.break_stream.load(Ordering::SeqCst) {
                events.push("data: {\"error\": {\"message\": \"stream interrupted\"}}\n\n".to_string());
                return event_stream_response(events, None);
            }
        }
        events.push(": keep-alive comment\n\n".to_string());
        events.push("data: {\"choices\": [{\"index\": 0, \"delta\": {}, \"finish_reason\": \"stop\"}]}\n\n".to_string());
        events.push("data: [DONE]\n\n".to_string());

        let delay = *state.stream_delay.lock().unwrap();
        return event_stream_response(events, delay);
    }

    Json(json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": reply},
            "finish_reason": "stop"
        }]
    }))
    .into_response()
}

/// Each vector encodes the input length in its first component. Items are
/// returned in reverse order so clients must sort by `index`.
async fn embeddings_handler(
    State(state): State<MockServerState>,
    Json(payload): Json<Value>,
) -> Response {
    state.embedding_requests.fetch_add(1, Ordering::SeqCst);

    if state.take_failure() {
        return failure_response();
    }

    let inputs: Vec<String> = match &payload["input"] {
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().unwrap_or_default().to_string())
            .collect(),
        Value::String(s) => vec![s.clone()],
        _ => Vec::new(),
    };

    let data: Vec<Value> = inputs
        .iter()
        .enumerate()
        .rev()
        .map(|(index, text)| {
            json!({
                "object": "embedding",
                "index": index,
                "embedding": [text.chars().count() as f32, 1.0, 0.0]
            })
        })
        .collect();

    Json(json!({"object": "list", "data": data, "model": payload["model"]})).into_response()
}

/// OpenAI-compatible upstream for tests, serving `/chat/completions`
/// (batched and SSE) and `/embeddings`.
pub struct MockOpenAIServer {
    addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    state: MockServerState,
}

impl MockOpenAIServer {
    pub async fn start() -> Self {
        let state = MockServerState {
            reply: Arc::new(Mutex::new(DEFAULT_REPLY.to_string())),
            chat_requests: Arc::new(Mutex::new(Vec::new())),
            embedding_requests: Arc::new(AtomicUsize::new(0)),
            failures_left: Arc::new(AtomicUsize::new(0)),
            break_stream: Arc::new(AtomicBool::new(false)),
            stream_delay: Arc::new(Mutex::new(None)),
        };

        let app = Router::new()
            .route("/chat/completions", post(chat_completions_handler))
            .route("/embeddings", post(embeddings_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap_or_else(|e| {
            panic!("Failed to bind mock server to 127.0.0.1:0. Error: {}", e);
        });
        let addr = listener.local_addr().unwrap();
        log::info!("Mock OpenAI server listening on {}", addr);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap_or_else(|e| {
                    log::error!("Mock OpenAI server error: {}", e);
                });
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            state,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_reply(&self, reply: &str) {
        *self.state.reply.lock().unwrap() = reply.to_string();
    }

    /// The next `n` requests (chat or embeddings) answer with HTTP 500.
    pub fn fail_next_requests(&self, n: usize) {
        self.state.failures_left.store(n, Ordering::SeqCst);
    }

    /// Streamed replies emit one token and then an error payload.
    pub fn break_streams(&self, enabled: bool) {
        self.state.break_stream.store(enabled, Ordering::SeqCst);
    }

    /// Streamed replies pause for `delay` before every event.
    pub fn set_stream_delay(&self, delay: Duration) {
        *self.state.stream_delay.lock().unwrap() = Some(delay);
    }

    pub fn chat_requests(&self) -> Vec<Value> {
        self.state.chat_requests.lock().unwrap().clone()
    }

    pub fn embedding_requests(&self) -> usize {
        self.state.embedding_requests.load(Ordering::SeqCst)
    }
}

impl Drop for MockOpenAIServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
