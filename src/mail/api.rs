//! Provider boundary: the four mailbox calls the gateway needs, and the
//! Gmail REST v1 implementation of them.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::GmailConfig;
use super::types::{MessageHeader, MessageRef, OutboundMessage, ProviderMessage, ProviderThread};
use crate::auth::Credential;
use crate::error::{ConfigError, ProviderError};

/// Upstream mailbox operations. Implementations must not refresh tokens:
/// the credential handed in is already live.
#[async_trait]
pub trait MailboxApi: Send + Sync {
    /// List message ids matching `query`, at most `max_results`.
    async fn list_messages(
        &self,
        credential: &Credential,
        query: Option<&str>,
        max_results: u32,
    ) -> Result<Vec<MessageRef>, ProviderError>;

    /// Fetch one message's metadata (snippet, thread id, headers).
    async fn get_message(
        &self,
        credential: &Credential,
        message_id: &str,
    ) -> Result<ProviderMessage, ProviderError>;

    /// Fetch a thread with all of its messages.
    async fn get_thread(
        &self,
        credential: &Credential,
        thread_id: &str,
    ) -> Result<ProviderThread, ProviderError>;

    /// Submit an encoded message; returns the provider's id for it.
    async fn send_message(
        &self,
        credential: &Credential,
        message: &OutboundMessage,
    ) -> Result<String, ProviderError>;
}

// ── Gmail wire types ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    messages: Option<Vec<GmailMessageRef>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessageRef {
    id: String,
    thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    thread_id: String,
    snippet: Option<String>,
    payload: Option<GmailPayload>,
}

#[derive(Debug, Deserialize)]
struct GmailPayload {
    headers: Option<Vec<GmailHeader>>,
}

#[derive(Debug, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct GmailThread {
    id: String,
    messages: Option<Vec<GmailMessage>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendBody<'a> {
    raw: &'a str,
    thread_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

impl From<GmailMessage> for ProviderMessage {
    fn from(msg: GmailMessage) -> Self {
        let headers = msg
            .payload
            .and_then(|p| p.headers)
            .unwrap_or_default()
            .into_iter()
            .map(|h| MessageHeader::new(h.name, h.value))
            .collect();
        Self {
            id: msg.id,
            thread_id: msg.thread_id,
            snippet: msg.snippet.unwrap_or_default(),
            headers,
        }
    }
}

// ── Gmail client ────────────────────────────────────────────────────

/// Gmail ids are URL-safe tokens; anything else is not ours to request.
pub(crate) fn is_plain_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn checked_id<'a>(kind: &str, id: &'a str) -> Result<&'a str, ProviderError> {
    if is_plain_id(id) {
        Ok(id)
    } else {
        Err(ProviderError::InvalidResponse {
            endpoint: kind.to_string(),
            reason: format!("refusing malformed id {id:?}"),
        })
    }
}

/// Gmail REST v1 client rooted at `users/me`.
pub struct GmailApi {
    http: reqwest::Client,
    api_base: Url,
}

impl GmailApi {
    pub fn new(config: &GmailConfig, http: reqwest::Client) -> Result<Self, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: "GMAIL_API_BASE".into(),
            message,
        };
        let api_base = Url::parse(&config.api_base).map_err(|e| invalid(e.to_string()))?;
        if api_base.cannot_be_a_base() {
            return Err(invalid("not a base URL".into()));
        }
        Ok(Self { http, api_base })
    }

    /// Append `segments` to the base path. Each segment is percent-encoded,
    /// so ids cannot add path levels, a query or a fragment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn read_json<T: DeserializeOwned>(
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Unauthorized(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::from_reqwest(endpoint, e))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        credential: &Credential,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        let endpoint = url.to_string();
        let response = self
            .http
            .get(url)
            .bearer_auth(credential.access_token().expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(&endpoint, e))?;
        Self::read_json(&endpoint, response).await
    }
}

#[async_trait]
impl MailboxApi for GmailApi {
    async fn list_messages(
        &self,
        credential: &Credential,
        query: Option<&str>,
        max_results: u32,
    ) -> Result<Vec<MessageRef>, ProviderError> {
        let max = max_results.to_string();
        let mut params = vec![("maxResults", max.as_str())];
        if let Some(q) = query {
            params.push(("q", q));
        }

        let listing: ListResponse = self.get_json(credential, self.endpoint(&["messages"]), &params).await?;
        let refs: Vec<MessageRef> = listing
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|m| MessageRef {
                id: m.id,
                thread_id: m.thread_id,
            })
            .collect();
        debug!(count = refs.len(), query = ?query, "Listed messages");
        Ok(refs)
    }

    async fn get_message(
        &self,
        credential: &Credential,
        message_id: &str,
    ) -> Result<ProviderMessage, ProviderError> {
        let url = self.endpoint(&["messages", checked_id("messages", message_id)?]);
        let message: GmailMessage = self
            .get_json(credential, url, &[("format", "metadata")])
            .await?;
        Ok(message.into())
    }

    async fn get_thread(
        &self,
        credential: &Credential,
        thread_id: &str,
    ) -> Result<ProviderThread, ProviderError> {
        let url = self.endpoint(&["threads", checked_id("threads", thread_id)?]);
        let thread: GmailThread = self
            .get_json(credential, url, &[("format", "metadata")])
            .await?;
        Ok(ProviderThread {
            id: thread.id,
            messages: thread
                .messages
                .unwrap_or_default()
                .into_iter()
                .map(ProviderMessage::from)
                .collect(),
        })
    }

    async fn send_message(
        &self,
        credential: &Credential,
        message: &OutboundMessage,
    ) -> Result<String, ProviderError> {
        let url = self.endpoint(&["messages", "send"]);
        let endpoint = url.to_string();
        let response = self
            .http
            .post(url)
            .bearer_auth(credential.access_token().expose_secret())
            .json(&SendBody {
                raw: &message.raw,
                thread_id: &message.thread_id,
            })
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(&endpoint, e))?;
        let sent: SendResponse = Self::read_json(&endpoint, response).await?;
        Ok(sent.id)
    }
}
