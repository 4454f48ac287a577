//! HTTP client for the generation service (`POST <api_url>/api/chat`).
//!
//! Request `{ "dialog": [...], "settings": {profile} }`, response
//! `{ "response": "<text>" }`. Transport failures and non-2xx statuses are
//! retried a fixed number of times with a fixed pause between attempts.

use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::chat::Line;
use crate::config::BackendConfig;

use super::{Backend, BackendError, Profile};

/// Attempts per request, including the first.
pub const MAX_TRIES: usize = 3;
/// Pause between two attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

const CHAT_ENDPOINT: &str = "/api/chat";

/// Constructed once at startup and cheaply cloned: `reqwest::Client` is an
/// `Arc` internally.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    url: String,
    max_tries: usize,
    retry_delay: Duration,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: format!("{}{CHAT_ENDPOINT}", config.api_url.trim_end_matches('/')),
            max_tries: MAX_TRIES,
            retry_delay: RETRY_DELAY,
        })
    }

    /// Override the retry policy. `max_tries` is clamped to at least one.
    pub fn with_retry(mut self, max_tries: usize, retry_delay: Duration) -> Self {
        self.max_tries = max_tries.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Load the profile, fill in the chat title, and post with retries.
    pub async fn send(
        &self,
        dialogue: &[Line],
        profile_path: &Path,
        chat_title: &str,
    ) -> Result<String, BackendError> {
        let settings = Profile::load(profile_path)?.with_chat_title(chat_title);
        let body = ChatRequest { dialog: dialogue, settings: &settings };

        debug!(
            lines = dialogue.len(),
            profile = %profile_path.display(),
            "sending dialogue to backend"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&body)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full backend request payload");
        }

        let mut attempt = 1;
        loop {
            match self.post(&body).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < self.max_tries => {
                    warn!(attempt, error = %e, "backend attempt failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "backend attempts exhausted");
                    return Err(e);
                }
            }
        }
    }

    async fn post(&self, body: &ChatRequest<'_>) -> Result<String, BackendError> {
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }

        let parsed = response
            .json::<ChatResponse>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(parsed.response)
    }
}

impl Backend for BackendClient {
    async fn generate(
        &self,
        dialogue: &[Line],
        profile_path: &Path,
        chat_title: &str,
    ) -> Result<String, BackendError> {
        self.send(dialogue, profile_path, chat_title).await
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    dialog: &'a [Line],
    settings: &'a Profile,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    response: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use tempfile::TempDir;

    #[derive(Clone)]
    struct Fake {
        calls: Arc<AtomicUsize>,
        fail_first: usize,
        seen: Arc<std::sync::Mutex<Vec<Value>>>,
    }

    async fn chat(State(fake): State<Fake>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        let n = fake.calls.fetch_add(1, Ordering::SeqCst);
        fake.seen.lock().unwrap().push(body.clone());
        if n < fake.fail_first {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "detail": "boom" })));
        }
        let lines = body["dialog"].as_array().map(Vec::len).unwrap_or(0);
        (StatusCode::OK, Json(json!({ "response": format!("saw {lines} lines") })))
    }

    async fn serve(fail_first: usize) -> (String, Fake) {
        let fake = Fake {
            calls: Arc::new(AtomicUsize::new(0)),
            fail_first,
            seen: Arc::new(std::sync::Mutex::new(Vec::new())),
        };
        let app = Router::new().route("/api/chat", post(chat)).with_state(fake.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), fake)
    }

    fn client(api_url: &str) -> BackendClient {
        BackendClient::new(&BackendConfig {
            api_url: api_url.to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
        .with_retry(MAX_TRIES, Duration::from_millis(10))
    }

    fn profile(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("bravo_bot.json");
        std::fs::write(
            &path,
            r#"{ "system_prompt": "You are in %s.", "temperature": 0.5, "top_k": 20, "probe_size": 2 }"#,
        )
        .unwrap();
        path
    }

    fn lines(v: &[&str]) -> Vec<Line> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn url_joins_endpoint() {
        assert_eq!(client("http://gen.local:8000/").url(), "http://gen.local:8000/api/chat");
    }

    #[tokio::test]
    async fn success_returns_response_field() {
        let (url, fake) = serve(0).await;
        let tmp = TempDir::new().unwrap();
        let text = client(&url)
            .send(&lines(&["Alice: hi", "Bravo: hey", "Alice: ok"]), &profile(&tmp), "Lounge")
            .await
            .unwrap();
        assert_eq!(text, "saw 3 lines");
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn request_body_carries_dialog_and_settings() {
        let (url, fake) = serve(0).await;
        let tmp = TempDir::new().unwrap();
        client(&url).send(&lines(&["Alice: hi"]), &profile(&tmp), "Lounge").await.unwrap();

        let seen = fake.seen.lock().unwrap();
        let body = &seen[0];
        assert_eq!(body["dialog"], json!(["Alice: hi"]));
        assert_eq!(body["settings"]["system_prompt"], "You are in Lounge.");
        assert_eq!(body["settings"]["top_k"], 20);
        assert_eq!(body["settings"]["probe_size"], 2);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let (url, fake) = serve(2).await;
        let tmp = TempDir::new().unwrap();
        let text = client(&url).send(&lines(&["A: x"]), &profile(&tmp), "").await.unwrap();
        assert_eq!(text, "saw 1 lines");
        assert_eq!(fake.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error() {
        let (url, fake) = serve(usize::MAX).await;
        let tmp = TempDir::new().unwrap();
        let err = client(&url).send(&lines(&["A: x"]), &profile(&tmp), "").await.unwrap_err();
        assert!(matches!(err, BackendError::Status(500)));
        assert_eq!(fake.calls.load(Ordering::SeqCst), MAX_TRIES);
    }

    #[tokio::test]
    async fn missing_profile_fails_without_request() {
        let (url, fake) = serve(0).await;
        let err = client(&url)
            .send(&lines(&["A: x"]), Path::new("/nonexistent/p.json"), "")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Profile(_)));
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreachable_backend_is_request_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let tmp = TempDir::new().unwrap();
        let err = client(&format!("http://{addr}"))
            .send(&lines(&["A: x"]), &profile(&tmp), "")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Request(_)));
    }
}
