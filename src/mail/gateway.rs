//! Mail gateway: ordered listing fan-out and reply sending.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use super::api::{MailboxApi, is_plain_id};
use super::reply::{self, ThreadTail};
use super::types::{LabelFilter, MessageSummary, OutboundMessage};
use crate::auth::{Credential, TokenBroker};
use crate::error::{ProviderError, Result, ValidationError};

/// Largest page the provider accepts for a single listing.
pub const PROVIDER_MAX_RESULTS: usize = 500;

/// A reply to send. Moved into [`MailGateway::compose_and_send`], so it is
/// used exactly once.
#[derive(Debug)]
pub struct SendRequest {
    pub credential: Credential,
    pub thread_id: String,
    pub reply_text: String,
}

/// Lists messages and sends replies on behalf of a credential.
pub struct MailGateway {
    api: Arc<dyn MailboxApi>,
    broker: Arc<TokenBroker>,
    fetch_concurrency: usize,
}

impl MailGateway {
    pub fn new(api: Arc<dyn MailboxApi>, broker: Arc<TokenBroker>, fetch_concurrency: usize) -> Self {
        Self {
            api,
            broker,
            fetch_concurrency: fetch_concurrency.max(1),
        }
    }

    /// List up to `limit` messages matching `filter`, in provider order.
    ///
    /// Detail fetches run concurrently (bounded by the fetch concurrency)
    /// and are slotted back by listing index. The first failing fetch fails
    /// the whole listing; no partial result is returned.
    pub async fn list_messages(
        &self,
        credential: &Credential,
        filter: LabelFilter,
        limit: usize,
    ) -> Result<Vec<MessageSummary>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let live = self.broker.ensure_live(credential).await?;

        let max_results = limit.min(PROVIDER_MAX_RESULTS);
        let mut refs = self
            .api
            .list_messages(&live, filter.query(), max_results as u32)
            .await?;
        refs.truncate(max_results);

        if refs.is_empty() {
            debug!(filter = ?filter, "Mailbox listing is empty");
            return Ok(Vec::new());
        }

        let total = refs.len();
        let api = &self.api;
        let cred = &live;
        let mut slots: Vec<Option<MessageSummary>> = vec![None; total];

        let mut fetches = stream::iter(refs.into_iter().enumerate())
            .map(|(slot, message_ref)| async move {
                let result = api.get_message(cred, &message_ref.id).await;
                (slot, message_ref.id, result)
            })
            .buffer_unordered(self.fetch_concurrency);

        while let Some((slot, message_id, result)) = fetches.next().await {
            match result {
                Ok(message) => slots[slot] = Some(MessageSummary::from(message)),
                Err(e) => {
                    warn!(message_id = %message_id, error = %e, "Detail fetch failed, abandoning listing");
                    return Err(e.into());
                }
            }
        }

        let summaries = slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ProviderError::InvalidResponse {
                endpoint: "messages".into(),
                reason: "detail fetch produced no result".into(),
            })?;

        info!(count = summaries.len(), filter = ?filter, "Listed messages");
        Ok(summaries)
    }

    /// Resolve the thread tail, build the reply, and send it into the
    /// thread. Returns the provider id of the sent message.
    pub async fn compose_and_send(&self, request: SendRequest) -> Result<String> {
        let SendRequest {
            credential,
            thread_id,
            reply_text,
        } = request;

        if thread_id.trim().is_empty() {
            return Err(ValidationError::MissingField("threadId").into());
        }
        if !is_plain_id(&thread_id) {
            return Err(ValidationError::InvalidId {
                field: "threadId",
                value: thread_id,
            }
            .into());
        }
        if reply_text.trim().is_empty() {
            return Err(ValidationError::MissingField("replyText").into());
        }

        let live = self.broker.ensure_live(&credential).await?;
        let thread = self.api.get_thread(&live, &thread_id).await?;
        let tail = ThreadTail::from_thread(&thread)?;

        let raw = reply::compose_reply(&tail, &reply_text)?;
        let outbound = OutboundMessage {
            raw: reply::encode_raw(&raw),
            thread_id: thread_id.clone(),
        };

        let sent_id = self.api.send_message(&live, &outbound).await?;
        info!(
            thread_id = %thread_id,
            in_reply_to = %tail.last_message_id,
            sent_id = %sent_id,
            "Reply sent"
        );
        Ok(sent_id)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use chrono::Utc;
    use mail_parser::MessageParser;
    use secrecy::SecretString;

    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{FakeTokenServer, StubMailbox, broker_for, live_credential, stub_broker};

    fn gateway(mailbox: Arc<StubMailbox>, concurrency: usize) -> MailGateway {
        MailGateway::new(mailbox, stub_broker(), concurrency)
    }

    /// Sequential reference: list, then fetch one by one.
    async fn list_sequentially(
        mailbox: &StubMailbox,
        filter: LabelFilter,
        limit: usize,
    ) -> Vec<MessageSummary> {
        let cred = live_credential();
        let refs = mailbox
            .list_messages(&cred, filter.query(), limit as u32)
            .await
            .unwrap();
        let mut out = Vec::new();
        for r in refs.into_iter().take(limit) {
            out.push(MessageSummary::from(mailbox.get_message(&cred, &r.id).await.unwrap()));
        }
        out
    }

    #[tokio::test]
    async fn listing_preserves_provider_order_despite_completion_order() {
        // Earlier messages take longer, so completion order is reversed.
        let mailbox = Arc::new(StubMailbox::with_messages(6).with_descending_delays(Duration::from_millis(5)));
        let gw = gateway(Arc::clone(&mailbox), 6);

        let listed = gw
            .list_messages(&live_credential(), LabelFilter::All, 6)
            .await
            .unwrap();
        let ids: Vec<_> = listed.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m0", "m1", "m2", "m3", "m4", "m5"]);
    }

    #[tokio::test]
    async fn listing_matches_sequential_reference_for_every_filter_and_limit() {
        let mailbox = Arc::new(StubMailbox::with_messages(7).with_descending_delays(Duration::from_millis(1)));
        let gw = gateway(Arc::clone(&mailbox), 3);

        for filter in [LabelFilter::All, LabelFilter::Read, LabelFilter::Unread] {
            for limit in [0usize, 1, 3, 7, 12] {
                let concurrent = gw
                    .list_messages(&live_credential(), filter, limit)
                    .await
                    .unwrap();
                let sequential = if limit == 0 {
                    Vec::new()
                } else {
                    list_sequentially(&mailbox, filter, limit).await
                };
                assert!(concurrent.len() <= limit);
                assert_eq!(concurrent, sequential, "filter {filter:?} limit {limit}");
            }
        }
    }

    #[tokio::test]
    async fn limit_zero_makes_no_provider_call() {
        let mailbox = Arc::new(StubMailbox::with_messages(3));
        let gw = gateway(Arc::clone(&mailbox), 2);
        let listed = gw
            .list_messages(&live_credential(), LabelFilter::All, 0)
            .await
            .unwrap();
        assert!(listed.is_empty());
        assert_eq!(mailbox.list_calls(), 0);
    }

    #[tokio::test]
    async fn empty_mailbox_is_empty_sequence() {
        let mailbox = Arc::new(StubMailbox::with_messages(0));
        let gw = gateway(mailbox, 4);
        let listed = gw
            .list_messages(&live_credential(), LabelFilter::Unread, 5)
            .await
            .unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn one_failed_detail_fetch_fails_the_whole_listing() {
        let mailbox = Arc::new(StubMailbox::with_messages(5).failing_on("m2"));
        let gw = gateway(Arc::clone(&mailbox), 5);
        let err = gw
            .list_messages(&live_credential(), LabelFilter::All, 5)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
    }

    #[tokio::test]
    async fn listing_failure_is_provider_error() {
        let mailbox = Arc::new(StubMailbox::with_messages(2).failing_listing());
        let gw = gateway(mailbox, 2);
        let err = gw
            .list_messages(&live_credential(), LabelFilter::All, 2)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
    }

    #[tokio::test]
    async fn concurrency_bound_is_respected() {
        let mailbox = Arc::new(StubMailbox::with_messages(10).with_descending_delays(Duration::from_millis(2)));
        let gw = gateway(Arc::clone(&mailbox), 3);
        gw.list_messages(&live_credential(), LabelFilter::All, 10)
            .await
            .unwrap();
        assert!(mailbox.peak_in_flight() <= 3);
        assert!(mailbox.peak_in_flight() >= 1);
    }

    #[tokio::test]
    async fn send_without_from_header_never_calls_send() {
        let mailbox = Arc::new(StubMailbox::with_messages(1).with_thread(
            "t-nofrom",
            vec![("Subject", "Hello")],
        ));
        let gw = gateway(Arc::clone(&mailbox), 1);
        let err = gw
            .compose_and_send(SendRequest {
                credential: live_credential(),
                thread_id: "t-nofrom".into(),
                reply_text: "Thanks!".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(mailbox.send_calls(), 0);
    }

    #[tokio::test]
    async fn send_binds_reply_to_thread_with_reply_subject() {
        let mailbox = Arc::new(StubMailbox::with_messages(1).with_thread(
            "t-ok",
            vec![("From", "Carol <carol@example.com>"), ("Subject", "Budget")],
        ));
        let gw = gateway(Arc::clone(&mailbox), 1);
        let sent_id = gw
            .compose_and_send(SendRequest {
                credential: live_credential(),
                thread_id: "t-ok".into(),
                reply_text: "Approved.".into(),
            })
            .await
            .unwrap();
        assert_eq!(sent_id, "sent-1");

        let sent = mailbox.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].thread_id, "t-ok");
        let raw = URL_SAFE_NO_PAD.decode(&sent[0].raw).unwrap();
        let parsed = MessageParser::default().parse(&raw).unwrap();
        let to = parsed.to().and_then(|a| a.first()).unwrap();
        assert_eq!(to.name(), Some("Carol"));
        assert_eq!(to.address(), Some("carol@example.com"));
        assert_eq!(parsed.subject(), Some("Re: Budget"));
        assert_eq!(parsed.body_text(0).unwrap().trim_end(), "Approved.");
    }

    #[tokio::test]
    async fn thread_id_that_is_not_a_plain_id_is_rejected() {
        let mailbox = Arc::new(StubMailbox::with_messages(6).with_thread(
            "t1",
            vec![("From", "a@example.com"), ("Subject", "Hi")],
        ));
        let gw = gateway(Arc::clone(&mailbox), 1);
        for thread_id in ["../messages/m5", "t1?format=full#", ".."] {
            let err = gw
                .compose_and_send(SendRequest {
                    credential: live_credential(),
                    thread_id: thread_id.into(),
                    reply_text: "Thanks!".into(),
                })
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{thread_id}");
        }
        assert_eq!(mailbox.thread_calls(), 0);
        assert_eq!(mailbox.send_calls(), 0);
    }

    #[tokio::test]
    async fn expired_credential_is_renewed_once_before_listing() {
        let server = FakeTokenServer::start().await;
        let mailbox = Arc::new(StubMailbox::with_messages(3));
        let gw = MailGateway::new(
            Arc::clone(&mailbox) as Arc<dyn MailboxApi>,
            broker_for(&server),
            2,
        );
        let expired = Credential::new(
            SecretString::from("stale-access"),
            Some(SecretString::from("stored-refresh")),
            Utc::now() - chrono::Duration::hours(1),
        );

        let listed = gw
            .list_messages(&expired, LabelFilter::All, 3)
            .await
            .unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(server.refresh_grants(), 1);
        let seen = mailbox.access_tokens_seen();
        assert!(!seen.is_empty());
        assert!(seen.iter().all(|t| t == "fresh-access-1"), "{seen:?}");
    }

    #[tokio::test]
    async fn empty_reply_text_is_rejected_before_provider_calls() {
        let mailbox = Arc::new(StubMailbox::with_messages(1));
        let gw = gateway(Arc::clone(&mailbox), 1);
        let err = gw
            .compose_and_send(SendRequest {
                credential: live_credential(),
                thread_id: "t1".into(),
                reply_text: "  ".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(mailbox.thread_calls(), 0);
        assert_eq!(mailbox.send_calls(), 0);
    }
}
