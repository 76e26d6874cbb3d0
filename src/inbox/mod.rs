//! Inbox controller: the request flows behind the HTTP surface.
//!
//! Every call is independent. The controller holds the shared broker,
//! gateway and drafting service (immutable configuration plus pooled HTTP
//! clients); credentials live only for the duration of one call.

pub mod routes;
pub mod session;

use std::sync::Arc;

use secrecy::SecretString;
use tracing::{info, warn};

use crate::auth::TokenBroker;
use crate::config::AppConfig;
use crate::drafting::{DraftArtifact, DraftingConfig, DraftingService};
use crate::error::{DraftError, ProviderError, Result, ValidationError};
use crate::llm::create_provider;
use crate::mail::{GmailApi, LabelFilter, MailGateway, MessageSummary, SendRequest};

use self::session::{SessionEvent, SessionTrace};

/// Number of messages listed when the client does not say.
pub const DEFAULT_LISTING_LIMIT: usize = 5;

/// What to list after authenticating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingRequest {
    pub filter: LabelFilter,
    pub limit: usize,
}

impl Default for ListingRequest {
    fn default() -> Self {
        Self {
            filter: LabelFilter::All,
            limit: DEFAULT_LISTING_LIMIT,
        }
    }
}

/// Result of a first login: the long-lived token the client keeps, plus
/// the first page of messages.
///
/// The authorization code is single-use, so once the exchange succeeds the
/// refresh token is returned even if the listing that follows fails.
#[derive(Debug)]
pub struct LoginOutcome {
    /// `None` when the provider issued no refresh token.
    pub refresh_token: Option<SecretString>,
    pub messages: Result<Vec<MessageSummary>>,
}

pub struct InboxController {
    broker: Arc<TokenBroker>,
    gateway: MailGateway,
    drafting: DraftingService,
}

impl InboxController {
    pub fn new(broker: Arc<TokenBroker>, gateway: MailGateway, drafting: DraftingService) -> Self {
        Self {
            broker,
            gateway,
            drafting,
        }
    }

    /// Wire the production Gmail and chat-completions backends.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| ProviderError::Transport {
                endpoint: "http-client".into(),
                reason: e.to_string(),
            })?;

        let broker = Arc::new(TokenBroker::new(config.oauth.clone(), config.http_timeout)?);
        let api = Arc::new(GmailApi::new(&config.gmail, http)?);
        let gateway = MailGateway::new(api, Arc::clone(&broker), config.gmail.fetch_concurrency);
        let llm = create_provider(&config.llm).map_err(DraftError::Llm)?;
        let drafting = DraftingService::new(llm, DraftingConfig::default());

        info!(
            fetch_concurrency = config.gmail.fetch_concurrency,
            model = %config.llm.model,
            "Inbox controller ready"
        );
        Ok(Self::new(broker, gateway, drafting))
    }

    /// Consent page address for the client to open.
    pub fn authorization_url(&self) -> String {
        self.broker.authorization_url()
    }

    /// First login: exchange the consent code, then list immediately.
    pub async fn exchange_code_and_list(
        &self,
        code: &str,
        listing: ListingRequest,
    ) -> Result<LoginOutcome> {
        let mut session = SessionTrace::fresh_login();
        session.step(SessionEvent::CodeReceived);

        let credential = match self.broker.exchange_code(code).await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(request_id = %session.request_id(), error = %e, "Login failed");
                session.step(SessionEvent::Failed);
                return Err(e);
            }
        };
        session.step(SessionEvent::Authenticated);

        let messages = session.finish(
            self.gateway
                .list_messages(&credential, listing.filter, listing.limit)
                .await,
        );

        match &messages {
            Ok(listed) => info!(
                request_id = %session.request_id(),
                count = listed.len(),
                "Login listing complete"
            ),
            Err(e) => warn!(
                request_id = %session.request_id(),
                error = %e,
                "Listing after login failed; handing back the refresh token anyway"
            ),
        }
        Ok(LoginOutcome {
            refresh_token: credential.refresh_token().cloned(),
            messages,
        })
    }

    /// Returning session: mint a credential from the stored refresh token
    /// and list.
    pub async fn refresh_and_list(
        &self,
        refresh_token: &SecretString,
        listing: ListingRequest,
    ) -> Result<Vec<MessageSummary>> {
        let mut session = SessionTrace::idle();
        session.step(SessionEvent::ListRequested);

        let result: Result<Vec<MessageSummary>> = async {
            let credential = self.broker.restore_from_refresh_token(refresh_token).await?;
            self.gateway
                .list_messages(&credential, listing.filter, listing.limit)
                .await
        }
        .await;
        session.finish(result)
    }

    pub async fn summarize(&self, snippet: &str) -> Result<String> {
        let mut session = SessionTrace::idle();
        session.step(SessionEvent::DraftRequested);
        session.finish(self.drafting.summarize(snippet).await)
    }

    pub async fn draft_reply(&self, summary: &str) -> Result<String> {
        let mut session = SessionTrace::idle();
        session.step(SessionEvent::DraftRequested);
        session.finish(self.drafting.draft_reply(summary).await)
    }

    /// Summary and reply draft for one listed message.
    pub async fn prepare_draft(&self, message: &MessageSummary) -> Result<DraftArtifact> {
        let mut session = SessionTrace::idle();
        session.step(SessionEvent::DraftRequested);
        session.finish(self.drafting.prepare(message).await)
    }

    /// Send a reviewed reply into `thread_id`. Returns the sent message id.
    ///
    /// Missing fields are rejected before any provider call.
    pub async fn send_reply(
        &self,
        refresh_token: &SecretString,
        thread_id: &str,
        reply_text: &str,
    ) -> Result<String> {
        if thread_id.trim().is_empty() {
            return Err(ValidationError::MissingField("threadId").into());
        }
        if reply_text.trim().is_empty() {
            return Err(ValidationError::MissingField("replyText").into());
        }

        let mut session = SessionTrace::idle();
        session.step(SessionEvent::SendRequested);

        let result: Result<String> = async {
            let credential = self.broker.restore_from_refresh_token(refresh_token).await?;
            self.gateway
                .compose_and_send(SendRequest {
                    credential,
                    thread_id: thread_id.to_string(),
                    reply_text: reply_text.to_string(),
                })
                .await
        }
        .await;
        session.finish(result)
    }
}
