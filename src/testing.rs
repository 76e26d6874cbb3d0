//! Stub collaborators for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Form, Json, Router};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::auth::{Credential, OAuthClientConfig, TokenBroker};
use crate::error::{LlmError, ProviderError};
use crate::llm::provider::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};
use crate::mail::api::MailboxApi;
use crate::mail::types::{
    MessageHeader, MessageRef, OutboundMessage, ProviderMessage, ProviderThread,
};

/// A credential valid for an hour, with a refresh token.
pub fn live_credential() -> Credential {
    Credential::issued_now(
        SecretString::from("stub-access"),
        Some(SecretString::from("stub-refresh")),
        3600,
    )
}

fn oauth_config(token_url: &str) -> OAuthClientConfig {
    OAuthClientConfig {
        client_id: "stub-client".into(),
        client_secret: SecretString::from("stub-secret"),
        redirect_uri: "http://localhost:3000".into(),
        auth_url: "https://accounts.example.com/auth".into(),
        token_url: token_url.into(),
    }
}

/// Broker pointed at an unroutable token endpoint.
pub fn stub_broker() -> Arc<TokenBroker> {
    Arc::new(
        TokenBroker::new(oauth_config("http://127.0.0.1:9/token"), Duration::from_secs(5))
            .expect("stub broker config"),
    )
}

/// Broker talking to `server`.
pub fn broker_for(server: &FakeTokenServer) -> Arc<TokenBroker> {
    Arc::new(
        TokenBroker::new(oauth_config(&server.token_url()), Duration::from_secs(5))
            .expect("fake broker config"),
    )
}

#[derive(Default)]
struct TokenCounters {
    refresh_grants: AtomicUsize,
    code_grants: AtomicUsize,
}

/// Token endpoint on a random local port.
///
/// Code grants issue `code-access` plus [`Self::ISSUED_REFRESH`]. Refresh
/// grants issue `fresh-access-{n}` and never rotate the refresh token.
/// [`Self::REVOKED`] is answered with `invalid_grant`.
pub struct FakeTokenServer {
    addr: std::net::SocketAddr,
    counters: Arc<TokenCounters>,
}

impl FakeTokenServer {
    pub const ISSUED_REFRESH: &'static str = "issued-refresh";
    pub const REVOKED: &'static str = "revoked";

    pub async fn start() -> Self {
        let counters = Arc::new(TokenCounters::default());
        let app = Router::new()
            .route("/token", post(fake_token))
            .with_state(Arc::clone(&counters));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, counters }
    }

    pub fn token_url(&self) -> String {
        format!("http://{}/token", self.addr)
    }

    pub fn refresh_grants(&self) -> usize {
        self.counters.refresh_grants.load(Ordering::SeqCst)
    }

    pub fn code_grants(&self) -> usize {
        self.counters.code_grants.load(Ordering::SeqCst)
    }
}

async fn fake_token(
    State(counters): State<Arc<TokenCounters>>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let rejected = (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": "invalid_grant", "error_description": "Bad Request"})),
    );
    match form.get("grant_type").map(String::as_str) {
        Some("authorization_code") => {
            counters.code_grants.fetch_add(1, Ordering::SeqCst);
            (
                StatusCode::OK,
                Json(json!({
                    "access_token": "code-access",
                    "refresh_token": FakeTokenServer::ISSUED_REFRESH,
                    "token_type": "Bearer",
                    "expires_in": 3600,
                })),
            )
        }
        Some("refresh_token") => {
            if form.get("refresh_token").map(String::as_str) == Some(FakeTokenServer::REVOKED) {
                return rejected;
            }
            let n = counters.refresh_grants.fetch_add(1, Ordering::SeqCst) + 1;
            (
                StatusCode::OK,
                Json(json!({
                    "access_token": format!("fresh-access-{n}"),
                    "token_type": "Bearer",
                    "expires_in": 3600,
                })),
            )
        }
        _ => rejected,
    }
}

struct StubEntry {
    message: ProviderMessage,
    unread: bool,
    delay: Duration,
}

/// In-memory mailbox. Message `m{i}` is unread when `i` is even.
pub struct StubMailbox {
    entries: Vec<StubEntry>,
    threads: HashMap<String, ProviderThread>,
    fail_on: Option<String>,
    fail_listing: bool,
    list_calls: AtomicUsize,
    thread_calls: AtomicUsize,
    send_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    sent: Mutex<Vec<OutboundMessage>>,
    tokens_seen: Mutex<Vec<String>>,
}

impl StubMailbox {
    pub fn with_messages(count: usize) -> Self {
        let entries = (0..count)
            .map(|i| StubEntry {
                message: ProviderMessage {
                    id: format!("m{i}"),
                    thread_id: format!("t{i}"),
                    snippet: format!("snippet {i}"),
                    headers: vec![
                        MessageHeader::new("From", format!("sender{i}@example.com")),
                        MessageHeader::new("Subject", format!("Subject {i}")),
                    ],
                },
                unread: i % 2 == 0,
                delay: Duration::ZERO,
            })
            .collect();
        Self {
            entries,
            threads: HashMap::new(),
            fail_on: None,
            fail_listing: false,
            list_calls: AtomicUsize::new(0),
            thread_calls: AtomicUsize::new(0),
            send_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            tokens_seen: Mutex::new(Vec::new()),
        }
    }

    /// Earlier messages answer more slowly than later ones.
    pub fn with_descending_delays(mut self, step: Duration) -> Self {
        let n = self.entries.len() as u32;
        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.delay = step * (n - i as u32);
        }
        self
    }

    pub fn failing_on(mut self, message_id: &str) -> Self {
        self.fail_on = Some(message_id.to_string());
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    /// Register a single-message thread whose tail has `headers`.
    pub fn with_thread(mut self, thread_id: &str, headers: Vec<(&str, &str)>) -> Self {
        let tail = ProviderMessage {
            id: format!("{thread_id}-tail"),
            thread_id: thread_id.to_string(),
            snippet: String::new(),
            headers: headers
                .into_iter()
                .map(|(n, v)| MessageHeader::new(n, v))
                .collect(),
        };
        self.threads.insert(
            thread_id.to_string(),
            ProviderThread {
                id: thread_id.to_string(),
                messages: vec![tail],
            },
        );
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn thread_calls(&self) -> usize {
        self.thread_calls.load(Ordering::SeqCst)
    }

    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Access tokens presented to any call, in call order.
    pub fn access_tokens_seen(&self) -> Vec<String> {
        self.tokens_seen.lock().unwrap().clone()
    }

    fn record(&self, credential: &Credential) {
        self.tokens_seen
            .lock()
            .unwrap()
            .push(credential.access_token().expose_secret().to_string());
    }
}

#[async_trait]
impl MailboxApi for StubMailbox {
    async fn list_messages(
        &self,
        credential: &Credential,
        query: Option<&str>,
        max_results: u32,
    ) -> Result<Vec<MessageRef>, ProviderError> {
        self.record(credential);
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing {
            return Err(ProviderError::Transport {
                endpoint: "messages".into(),
                reason: "connection reset".into(),
            });
        }
        Ok(self
            .entries
            .iter()
            .filter(|e| match query {
                Some("is:unread") => e.unread,
                Some("is:read") => !e.unread,
                _ => true,
            })
            .take(max_results as usize)
            .map(|e| MessageRef {
                id: e.message.id.clone(),
                thread_id: Some(e.message.thread_id.clone()),
            })
            .collect())
    }

    async fn get_message(
        &self,
        credential: &Credential,
        message_id: &str,
    ) -> Result<ProviderMessage, ProviderError> {
        self.record(credential);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let entry = self.entries.iter().find(|e| e.message.id == message_id);
        if let Some(entry) = entry {
            tokio::time::sleep(entry.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_on.as_deref() == Some(message_id) {
            return Err(ProviderError::Status {
                endpoint: format!("messages/{message_id}"),
                status: 500,
                body: "backend error".into(),
            });
        }
        entry
            .map(|e| e.message.clone())
            .ok_or_else(|| ProviderError::Status {
                endpoint: format!("messages/{message_id}"),
                status: 404,
                body: "not found".into(),
            })
    }

    async fn get_thread(
        &self,
        credential: &Credential,
        thread_id: &str,
    ) -> Result<ProviderThread, ProviderError> {
        self.record(credential);
        self.thread_calls.fetch_add(1, Ordering::SeqCst);
        self.threads
            .get(thread_id)
            .cloned()
            .ok_or_else(|| ProviderError::Status {
                endpoint: format!("threads/{thread_id}"),
                status: 404,
                body: "not found".into(),
            })
    }

    async fn send_message(
        &self,
        credential: &Credential,
        message: &OutboundMessage,
    ) -> Result<String, ProviderError> {
        self.record(credential);
        let n = self.send_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent.lock().unwrap().push(message.clone());
        Ok(format!("sent-{n}"))
    }
}

/// How a [`StubLlm`] answers.
#[derive(Debug, Clone)]
pub enum StubReply {
    /// Echo the user payload back, prefixed.
    Echo(&'static str),
    /// Return this text, flagged as cut off by the token budget.
    Truncated(&'static str),
    /// Return an empty completion.
    Empty,
    /// Fail every call.
    Fail,
}

/// Counting LLM stub.
pub struct StubLlm {
    reply: StubReply,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl StubLlm {
    pub fn new(reply: StubReply) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let user = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.requests.lock().unwrap().push(request);

        let mut finish_reason = FinishReason::Stop;
        let content = match &self.reply {
            StubReply::Echo(prefix) => format!("{prefix}{user}"),
            StubReply::Truncated(text) => {
                finish_reason = FinishReason::Length;
                text.to_string()
            }
            StubReply::Empty => String::new(),
            StubReply::Fail => {
                return Err(LlmError::RequestFailed {
                    provider: "stub".into(),
                    reason: "boom".into(),
                });
            }
        };
        Ok(CompletionResponse {
            content,
            input_tokens: 0,
            output_tokens: 0,
            finish_reason,
        })
    }
}
