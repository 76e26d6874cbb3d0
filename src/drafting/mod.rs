//! Drafting service for one-sentence summaries and reply drafts.
//!
//! Each step is one model call with no internal retry. Drafts are
//! ephemeral and never stored.

pub mod prompts;

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{DraftError, Result, ValidationError};
use crate::llm::provider::{ChatMessage, CompletionRequest, FinishReason, LlmProvider};
use crate::mail::MessageSummary;

/// Tuning for drafting calls.
#[derive(Debug, Clone)]
pub struct DraftingConfig {
    /// Max tokens for a summary.
    pub summary_max_tokens: u32,
    /// Max tokens for a reply draft.
    pub reply_max_tokens: u32,
    /// Sampling temperature for both steps.
    pub temperature: f32,
}

impl Default for DraftingConfig {
    fn default() -> Self {
        Self {
            summary_max_tokens: 128,
            reply_max_tokens: 512,
            temperature: 0.7,
        }
    }
}

/// Generated material for one message, pending human review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftArtifact {
    pub message_id: String,
    pub summary: Option<String>,
    #[serde(rename = "reply")]
    pub reply_text: Option<String>,
}

/// Summarizes messages and drafts replies.
pub struct DraftingService {
    llm: Arc<dyn LlmProvider>,
    config: DraftingConfig,
}

impl DraftingService {
    pub fn new(llm: Arc<dyn LlmProvider>, config: DraftingConfig) -> Self {
        Self { llm, config }
    }

    /// One-sentence summary of `snippet`.
    ///
    /// Returns [`prompts::NO_SUMMARY`] if the model answered with nothing.
    pub async fn summarize(&self, snippet: &str) -> Result<String> {
        if snippet.trim().is_empty() {
            return Err(ValidationError::MissingField("emailSnippet").into());
        }
        let text = self
            .run(
                prompts::SUMMARY_INSTRUCTION,
                snippet,
                self.config.summary_max_tokens,
            )
            .await?;
        Ok(text.unwrap_or_else(|| {
            warn!(model = %self.llm.model_name(), "Model returned an empty summary");
            prompts::NO_SUMMARY.to_string()
        }))
    }

    /// Reply draft built from a prior summary. Empty input is rejected
    /// before the model is called.
    pub async fn draft_reply(&self, summary: &str) -> Result<String> {
        if summary.trim().is_empty() {
            return Err(ValidationError::MissingField("summary").into());
        }
        let text = self
            .run(prompts::REPLY_INSTRUCTION, summary, self.config.reply_max_tokens)
            .await?;
        Ok(text.unwrap_or_else(|| {
            warn!(model = %self.llm.model_name(), "Model returned an empty reply");
            prompts::NO_REPLY.to_string()
        }))
    }

    /// Summarize `message`, then draft a reply from the summary.
    ///
    /// When no summary is available the reply step is skipped.
    pub async fn prepare(&self, message: &MessageSummary) -> Result<DraftArtifact> {
        let summary = self.summarize(&message.snippet).await?;
        if summary == prompts::NO_SUMMARY {
            return Ok(DraftArtifact {
                message_id: message.id.clone(),
                summary: Some(summary),
                reply_text: None,
            });
        }
        let reply = self.draft_reply(&summary).await?;
        info!(message_id = %message.id, "Draft prepared");
        Ok(DraftArtifact {
            message_id: message.id.clone(),
            summary: Some(summary),
            reply_text: Some(reply),
        })
    }

    /// One model call. `None` means the model produced no text.
    async fn run(&self, instruction: &str, payload: &str, max_tokens: u32) -> Result<Option<String>> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(instruction),
            ChatMessage::user(payload),
        ])
        .with_temperature(self.config.temperature)
        .with_max_tokens(max_tokens);

        let response = self.llm.complete(request).await.map_err(|e| {
            warn!(model = %self.llm.model_name(), error = %e, "Model call failed");
            DraftError::Llm(e)
        })?;

        if response.finish_reason == FinishReason::Length {
            warn!(
                model = %self.llm.model_name(),
                max_tokens,
                output_tokens = response.output_tokens,
                "Completion hit the token limit; text may be cut off"
            );
        }

        let text = response.content.trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }
}
