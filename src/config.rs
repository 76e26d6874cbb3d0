//! Configuration types.
//!
//! Everything is read once at start-up and shared immutably afterwards.

use std::time::Duration;

use secrecy::SecretString;

use crate::auth::OAuthClientConfig;
use crate::error::ConfigError;
use crate::llm::LlmConfig;
use crate::mail::GmailConfig;

const DEFAULT_PORT: u16 = 4000;
const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000";
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
const DEFAULT_FETCH_CONCURRENCY: usize = 8;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;

/// Process-wide configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Port the HTTP server listens on.
    pub port: u16,
    /// OAuth client identity and endpoints.
    pub oauth: OAuthClientConfig,
    /// Gmail REST settings.
    pub gmail: GmailConfig,
    /// Language-model settings.
    pub llm: LlmConfig,
    /// Deadline for every provider HTTP call.
    pub http_timeout: Duration,
}

impl AppConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String, ConfigError> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };
        let optional =
            |key: &str, default: &str| -> String { lookup(key).unwrap_or_else(|| default.into()) };

        let client_id = required("GOOGLE_CLIENT_ID")?;
        let client_secret = SecretString::from(required("GOOGLE_CLIENT_SECRET")?);
        let api_key = SecretString::from(required("OPENAI_API_KEY")?);

        let port = parse_or(&lookup, "PORT", DEFAULT_PORT)?;
        let fetch_concurrency =
            parse_or(&lookup, "INBOX_FETCH_CONCURRENCY", DEFAULT_FETCH_CONCURRENCY)?;
        if fetch_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "INBOX_FETCH_CONCURRENCY".into(),
                message: "must be at least 1".into(),
            });
        }
        let http_timeout_secs = parse_or(&lookup, "HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?;
        let llm_timeout_secs = parse_or(&lookup, "LLM_TIMEOUT_SECS", DEFAULT_LLM_TIMEOUT_SECS)?;

        Ok(Self {
            port,
            oauth: OAuthClientConfig {
                client_id,
                client_secret,
                redirect_uri: optional("OAUTH_REDIRECT_URI", DEFAULT_REDIRECT_URI),
                auth_url: optional("GOOGLE_AUTH_URL", DEFAULT_AUTH_URL),
                token_url: optional("GOOGLE_TOKEN_URL", DEFAULT_TOKEN_URL),
            },
            gmail: GmailConfig {
                api_base: optional("GMAIL_API_BASE", DEFAULT_GMAIL_API_BASE),
                fetch_concurrency,
            },
            llm: LlmConfig {
                api_key,
                model: optional("OPENAI_MODEL", DEFAULT_MODEL),
                base_url: optional("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
                timeout: Duration::from_secs(llm_timeout_secs),
            },
            http_timeout: Duration::from_secs(http_timeout_secs),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}
