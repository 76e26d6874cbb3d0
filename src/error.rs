//! Error types for Smart Inbox.

use std::time::Duration;

/// Top-level error type for the inbox core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Drafting error: {0}")]
    Draft(#[from] DraftError),
}

/// The four failure kinds a caller of the core can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    Provider,
    Validation,
    Draft,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::Provider => "provider",
            ErrorKind::Validation => "validation",
            ErrorKind::Draft => "draft",
        }
    }
}

impl Error {
    /// Classify this error for the caller.
    ///
    /// Configuration problems only surface at start-up; if one ever reaches
    /// a request it is reported as a provider failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Auth(_) => ErrorKind::Auth,
            Error::Provider(_) | Error::Config(_) => ErrorKind::Provider,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Draft(_) => ErrorKind::Draft,
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// OAuth errors. The caller has to re-authenticate to recover.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authorization code rejected: {reason}")]
    InvalidCode { reason: String },

    #[error("Refresh token rejected: {reason}")]
    InvalidRefreshToken { reason: String },

    #[error("Credential has expired and carries no refresh token")]
    NotRenewable,

    #[error("OAuth client rejected: {reason}")]
    InvalidClient { reason: String },
}

/// Mailbox provider failures (transport, HTTP status, malformed payloads).
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Request to {endpoint} failed: {reason}")]
    Transport { endpoint: String, reason: String },

    #[error("Request to {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("Provider rejected the access token: {0}")]
    Unauthorized(String),

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("Thread {thread_id} has no messages")]
    EmptyThread { thread_id: String },

    #[error("Token endpoint error: {reason}")]
    TokenEndpoint { reason: String },

    #[error("Could not encode reply: {0}")]
    Compose(String),
}

impl ProviderError {
    /// Classify a reqwest failure against `endpoint`.
    pub(crate) fn from_reqwest(endpoint: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout {
                endpoint: endpoint.to_string(),
            }
        } else if err.is_decode() {
            ProviderError::InvalidResponse {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            }
        } else {
            ProviderError::Transport {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

/// Missing or malformed input; no external call has been made.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid {field}: {value:?}")]
    InvalidId { field: &'static str, value: String },

    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    #[error("Could not find recipient address in thread {thread_id}")]
    MissingRecipient { thread_id: String },
}

/// Drafting failures. Only the drafting step is unavailable.
#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    #[error("Model call failed: {0}")]
    Llm(#[from] LlmError),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Result type alias for the inbox core.
pub type Result<T> = std::result::Result<T, Error>;
