//! Test utilities for tally-core
//!
//! Mock HTTP servers standing in for the AI providers and the exchange-rate
//! service, so the real reqwest clients can be exercised without network
//! access.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// A request the mock provider received
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Value,
}

#[derive(Default)]
struct ProviderState {
    reply: String,
    forced_status: Option<u16>,
    requests: Vec<CapturedRequest>,
}

type SharedProviderState = Arc<Mutex<ProviderState>>;

/// Mock AI provider speaking both the OpenAI-compatible (Groq) and the
/// Gemini `generateContent` protocols
pub struct MockProviderServer {
    addr: SocketAddr,
    state: SharedProviderState,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockProviderServer {
    /// Start the mock server on an available port, replying with `reply`
    pub async fn start(reply: &str) -> Self {
        let state = Arc::new(Mutex::new(ProviderState {
            reply: reply.to_string(),
            ..ProviderState::default()
        }));

        let app = Router::new()
            .route("/v1/chat/completions", post(handle_chat_completions))
            .route("/v1/models", get(handle_models))
            .route("/models/:model", get(handle_gemini_model).post(handle_gemini_generate))
            .with_state(state.clone());

        let (addr, shutdown_tx) = serve(app).await;
        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Replace the canned reply
    pub fn set_reply(&self, reply: &str) {
        self.lock().reply = reply.to_string();
    }

    /// Answer every request with this HTTP status
    pub fn fail_with(&self, status: u16) {
        self.lock().forced_status = Some(status);
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.lock().requests.clone()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for MockProviderServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Record the request; return the reply or the forced failure
fn record(
    state: &SharedProviderState,
    path: String,
    query: HashMap<String, String>,
    body: Value,
) -> std::result::Result<String, Response> {
    let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
    state.requests.push(CapturedRequest { path, query, body });
    match state.forced_status {
        Some(code) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            Err((status, "forced failure").into_response())
        }
        None => Ok(state.reply.clone()),
    }
}

async fn handle_chat_completions(
    State(state): State<SharedProviderState>,
    Json(body): Json<Value>,
) -> Response {
    match record(&state, "/v1/chat/completions".into(), HashMap::new(), body) {
        Ok(reply) => Json(json!({
            "choices": [{"message": {"role": "assistant", "content": reply}}]
        }))
        .into_response(),
        Err(failure) => failure,
    }
}

async fn handle_models(State(state): State<SharedProviderState>) -> Response {
    match record(&state, "/v1/models".into(), HashMap::new(), Value::Null) {
        Ok(_) => Json(json!({"data": [{"id": "mock-model"}]})).into_response(),
        Err(failure) => failure,
    }
}

async fn handle_gemini_model(
    State(state): State<SharedProviderState>,
    Path(model): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    match record(&state, format!("/models/{}", model), query, Value::Null) {
        Ok(_) => Json(json!({"name": format!("models/{}", model)})).into_response(),
        Err(failure) => failure,
    }
}

/// `POST /models/{model}:generateContent`; the action arrives inside the
/// path segment
async fn handle_gemini_generate(
    State(state): State<SharedProviderState>,
    Path(model_action): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    if !model_action.ends_with(":generateContent") {
        return (StatusCode::NOT_FOUND, "unknown action").into_response();
    }
    match record(&state, format!("/models/{}", model_action), query, body) {
        Ok(reply) => Json(json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": reply}]}}]
        }))
        .into_response(),
        Err(failure) => failure,
    }
}

struct FxState {
    rates: HashMap<(String, String), f64>,
    failing: bool,
    hits: AtomicUsize,
}

/// Mock frankfurter-style exchange-rate service (`GET /latest?from=&to=`)
pub struct MockFxServer {
    addr: SocketAddr,
    state: Arc<FxState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockFxServer {
    /// Start with the given (from, to, rate) table
    pub async fn start(rates: &[(&str, &str, f64)]) -> Self {
        Self::start_with(rates, false).await
    }

    /// Start a server that answers every request with 503
    pub async fn start_failing() -> Self {
        Self::start_with(&[], true).await
    }

    async fn start_with(rates: &[(&str, &str, f64)], failing: bool) -> Self {
        let state = Arc::new(FxState {
            rates: rates
                .iter()
                .map(|(from, to, rate)| ((from.to_string(), to.to_string()), *rate))
                .collect(),
            failing,
            hits: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/latest", get(handle_latest))
            .with_state(state.clone());

        let (addr, shutdown_tx) = serve(app).await;
        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of `/latest` requests served
    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockFxServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Deserialize)]
struct LatestQuery {
    from: String,
    to: String,
}

async fn handle_latest(
    State(state): State<Arc<FxState>>,
    Query(query): Query<LatestQuery>,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);

    if state.failing {
        return (StatusCode::SERVICE_UNAVAILABLE, "rates unavailable").into_response();
    }

    match state.rates.get(&(query.from.clone(), query.to.clone())) {
        Some(rate) => {
            let mut rates = serde_json::Map::new();
            rates.insert(query.to, json!(rate));
            Json(json!({
                "amount": 1.0,
                "base": query.from,
                "date": "2024-06-03",
                "rates": rates
            }))
            .into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"message": "not found"})),
        )
            .into_response(),
    }
}

/// Bind an ephemeral port and serve until the returned sender fires
async fn serve(app: Router) -> (SocketAddr, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            })
            .await
            .unwrap();
    });

    (addr, shutdown_tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AIBackend, GeminiBackend, OpenAICompatibleBackend};
    use crate::currency::{FrankfurterSource, RateSource};
    use crate::error::Error;
    use crate::models::ChatTurn;
    use std::time::Duration;

    #[tokio::test]
    async fn test_groq_against_mock_server() {
        let server = MockProviderServer::start("hello").await;
        let client = OpenAICompatibleBackend::with_api_key(&server.url(), "llama", "gsk-test");

        assert!(client.health_check().await);
        assert_eq!(client.complete_text("prompt").await.unwrap(), "hello");

        let requests = server.requests();
        let body = &requests[1].body;
        assert_eq!(body["model"], "llama");
        assert_eq!(body["messages"][0]["content"], "prompt");
    }

    #[tokio::test]
    async fn test_groq_chat_sends_system_and_turns() {
        let server = MockProviderServer::start("answer").await;
        let client = OpenAICompatibleBackend::with_api_key(&server.url(), "llama", "gsk-test");

        let turns = [ChatTurn::user("q1"), ChatTurn::assistant("a1"), ChatTurn::user("q2")];
        assert_eq!(client.complete_chat("sys", &turns).await.unwrap(), "answer");

        let messages = server.requests()[0].body["messages"].clone();
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[3]["content"], "q2");
    }

    #[tokio::test]
    async fn test_groq_status_error() {
        let server = MockProviderServer::start("unused").await;
        server.fail_with(429);
        let client = OpenAICompatibleBackend::with_api_key(&server.url(), "llama", "gsk-test");

        match client.complete_text("prompt").await {
            Err(Error::ProviderRequest { status, .. }) => assert_eq!(status, Some(429)),
            other => panic!("expected provider error, got {:?}", other),
        }
        assert!(!client.health_check().await);
    }

    #[tokio::test]
    async fn test_gemini_against_mock_server() {
        let server = MockProviderServer::start("{\"ok\": true}").await;
        let client = GeminiBackend::new(&server.url(), "gemini-1.5-flash", "gem-key");

        assert!(client.health_check().await);
        let image = crate::models::ImageInput::from_bytes(vec![0x89, b'P', b'N', b'G']);
        assert_eq!(
            client.complete_vision("read this", &image).await.unwrap(),
            "{\"ok\": true}"
        );

        let request = server.requests().pop().unwrap();
        assert_eq!(request.path, "/models/gemini-1.5-flash:generateContent");
        assert_eq!(request.query.get("key").map(String::as_str), Some("gem-key"));
        let parts = &request.body["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "read this");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
    }

    #[tokio::test]
    async fn test_gemini_status_error() {
        let server = MockProviderServer::start("unused").await;
        server.fail_with(500);
        let client = GeminiBackend::new(&server.url(), "gemini-1.5-flash", "gem-key");

        let err = client.complete_text("prompt").await.unwrap_err();
        assert!(matches!(
            err,
            Error::ProviderRequest {
                status: Some(500),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_fx_server_rates_and_hits() {
        let server = MockFxServer::start(&[("USD", "SEK", 10.9)]).await;
        let source = FrankfurterSource::new(&server.url(), Duration::from_secs(5));

        assert_eq!(source.fetch_rate("USD", "SEK").await.unwrap(), 10.9);
        assert!(source.fetch_rate("EUR", "SEK").await.is_err());
        assert_eq!(server.hits(), 2);
    }

    #[tokio::test]
    async fn test_fx_server_failing() {
        let server = MockFxServer::start_failing().await;
        let source = FrankfurterSource::new(&server.url(), Duration::from_secs(5));

        let err = source.fetch_rate("USD", "SEK").await.unwrap_err();
        assert!(matches!(
            err,
            Error::ProviderRequest {
                status: Some(503),
                ..
            }
        ));
    }
}
