//! LLM integration for Smart Inbox.
//!
//! Uses the rig-core crate for HTTP transport against any OpenAI-compatible
//! chat-completions endpoint, and the `RigAdapter` to bridge rig's
//! `CompletionModel` trait to our `LlmProvider` trait.

pub mod provider;
mod rig_adapter;

pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::sync::Arc;
use std::time::Duration;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::LlmError;

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub model: String,
    /// Base URL of the chat-completions API, without `/chat/completions`.
    pub base_url: String,
    /// Deadline for one completion call.
    pub timeout: Duration,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    reqwest::Url::parse(&config.base_url).map_err(|e| LlmError::RequestFailed {
        provider: "openai".to_string(),
        reason: format!("Invalid base URL {}: {}", config.base_url, e),
    })?;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::builder()
            .api_key(config.api_key.expose_secret())
            .base_url(config.base_url.as_str())
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            })?;

    // Chat completions rather than the Responses API, so any compatible
    // endpoint works.
    let model = client.completions_api().completion_model(&config.model);
    tracing::info!("Using OpenAI-compatible endpoint (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(
        model,
        &config.model,
        "openai",
        config.timeout,
    )))
}
