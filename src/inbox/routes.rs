//! JSON endpoints for the inbox client.
//!
//! Route and field names follow the existing browser client. Bodies are
//! parsed leniently (missing fields default to empty) and validated by the
//! controller, so every rejection carries the same `{error, message}` shape.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use super::{InboxController, ListingRequest};
use crate::error::{Error, ErrorKind, ValidationError};
use crate::mail::{LabelFilter, MessageSummary};

/// Shared state for inbox routes.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<InboxController>,
}

/// Build the inbox routes.
pub fn inbox_routes(controller: Arc<InboxController>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/authUrl", get(auth_url))
        .route("/exchangeCodeAndGetEmails", post(exchange_code_and_get_emails))
        .route("/refreshTokenAndGetEmails", post(refresh_token_and_get_emails))
        .route("/summarizeEmail", post(summarize_email))
        .route("/generateReply", post(generate_reply))
        .route("/prepareDraft", post(prepare_draft))
        .route("/sendReply", post(send_reply))
        .with_state(AppState { controller })
}

// ── Errors ──────────────────────────────────────────────────────────────

/// Error response: `{error: <kind>, message}`, plus `refresh_token` when a
/// login succeeded but the step after it did not.
pub struct ApiError {
    error: Error,
    refresh_token: Option<String>,
}

impl ApiError {
    fn with_refresh_token(mut self, refresh_token: Option<String>) -> Self {
        self.refresh_token = refresh_token;
        self
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self {
            error,
            refresh_token: None,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Error::from(ValidationError::MalformedBody(rejection.body_text())).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.error.kind();
        let status = match kind {
            ErrorKind::Auth => StatusCode::UNAUTHORIZED,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Provider | ErrorKind::Draft => StatusCode::BAD_GATEWAY,
        };
        warn!(kind = kind.as_str(), error = %self.error, "Request failed");
        let mut body = json!({
            "error": kind.as_str(),
            "message": self.error.to_string(),
        });
        if let Some(token) = self.refresh_token {
            body["refresh_token"] = Value::String(token);
        }
        (status, Json(body)).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

// ── Request bodies ──────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ExchangeCodeBody {
    code: String,
    label_filter: Option<String>,
    max_results: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RefreshBody {
    #[serde(rename = "refresh_token")]
    refresh_token: String,
    label_filter: Option<String>,
    max_results: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SummarizeBody {
    email_snippet: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GenerateReplyBody {
    summary: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SendReplyBody {
    #[serde(rename = "refresh_token")]
    refresh_token: String,
    thread_id: String,
    reply_text: String,
}

fn listing(label_filter: Option<&str>, max_results: Option<usize>) -> ListingRequest {
    let defaults = ListingRequest::default();
    ListingRequest {
        filter: LabelFilter::from_wire(label_filter),
        limit: max_results.unwrap_or(defaults.limit),
    }
}

// ── Handlers ────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "smart-inbox"
    }))
}

async fn auth_url(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "url": state.controller.authorization_url() }))
}

async fn exchange_code_and_get_emails(
    State(state): State<AppState>,
    body: Result<Json<ExchangeCodeBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let outcome = state
        .controller
        .exchange_code_and_list(
            &body.code,
            listing(body.label_filter.as_deref(), body.max_results),
        )
        .await?;
    let refresh_token = outcome
        .refresh_token
        .as_ref()
        .map(|t| t.expose_secret().to_string());
    match outcome.messages {
        Ok(messages) => Ok(Json(json!({
            "refresh_token": refresh_token,
            "emails": messages,
        }))),
        Err(e) => Err(ApiError::from(e).with_refresh_token(refresh_token)),
    }
}

async fn refresh_token_and_get_emails(
    State(state): State<AppState>,
    body: Result<Json<RefreshBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let messages = state
        .controller
        .refresh_and_list(
            &SecretString::from(body.refresh_token),
            listing(body.label_filter.as_deref(), body.max_results),
        )
        .await?;
    Ok(Json(json!({ "emails": messages })))
}

async fn summarize_email(
    State(state): State<AppState>,
    body: Result<Json<SummarizeBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let summary = state.controller.summarize(&body.email_snippet).await?;
    Ok(Json(json!({ "summary": summary })))
}

async fn generate_reply(
    State(state): State<AppState>,
    body: Result<Json<GenerateReplyBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let reply = state.controller.draft_reply(&body.summary).await?;
    Ok(Json(json!({ "reply": reply })))
}

async fn prepare_draft(
    State(state): State<AppState>,
    body: Result<Json<MessageSummary>, JsonRejection>,
) -> ApiResult {
    let Json(message) = body?;
    let draft = state.controller.prepare_draft(&message).await?;
    Ok(Json(json!(draft)))
}

async fn send_reply(
    State(state): State<AppState>,
    body: Result<Json<SendReplyBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let message_id = state
        .controller
        .send_reply(
            &SecretString::from(body.refresh_token),
            &body.thread_id,
            &body.reply_text,
        )
        .await?;
    Ok(Json(json!({ "status": "sent", "messageId": message_id })))
}
