//! Reply composition: thread tail extraction and RFC 5322 payload building.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use mail_builder::MessageBuilder;
use mail_builder::headers::address::Address;
use mail_parser::MessageParser;

use super::types::{MessageHeader, ProviderThread, find_header};
use crate::error::{Error, ProviderError, ValidationError};

/// Marker prepended to the original subject.
pub const REPLY_PREFIX: &str = "Re: ";

/// Subject used when the tail carries none.
pub const FALLBACK_SUBJECT: &str = "No Subject";

/// What a reply needs to know about the most recent message of a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadTail {
    pub thread_id: String,
    pub last_message_id: String,
    /// Display name from the tail's `From` header, if any.
    pub recipient_name: Option<String>,
    /// Mailbox from the tail's `From` header.
    pub recipient_address: String,
    /// Reply subject, already prefixed.
    pub subject: String,
    pub headers: Vec<MessageHeader>,
}

impl ThreadTail {
    /// Resolve the tail of `thread`.
    ///
    /// Fails with a validation error when the tail has no usable `From`
    /// mailbox, so a reply is never addressed to nobody.
    pub fn from_thread(thread: &ProviderThread) -> Result<Self, Error> {
        let last = thread
            .messages
            .last()
            .ok_or_else(|| ProviderError::EmptyThread {
                thread_id: thread.id.clone(),
            })?;

        let (recipient_name, recipient_address) = find_header(&last.headers, "From")
            .map(sanitize_header_value)
            .and_then(|from| parse_mailbox(&from))
            .ok_or_else(|| ValidationError::MissingRecipient {
                thread_id: thread.id.clone(),
            })?;

        let original_subject = find_header(&last.headers, "Subject")
            .map(sanitize_header_value)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| FALLBACK_SUBJECT.to_string());

        Ok(Self {
            thread_id: thread.id.clone(),
            last_message_id: last.id.clone(),
            recipient_name,
            recipient_address,
            subject: format!("{REPLY_PREFIX}{original_subject}"),
            headers: last.headers.clone(),
        })
    }

    /// Identifier the reply points back at, without angle brackets: the RFC
    /// Message-ID when the provider exposes one, the provider id otherwise.
    pub fn in_reply_to(&self) -> String {
        find_header(&self.headers, "Message-ID")
            .map(sanitize_header_value)
            .map(|id| bare_id(&id).to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| self.last_message_id.clone())
    }

    /// The tail's reference chain extended by the tail itself.
    pub fn references(&self) -> Vec<String> {
        let mut chain: Vec<String> = find_header(&self.headers, "References")
            .map(sanitize_header_value)
            .map(|refs| {
                refs.split_whitespace()
                    .map(bare_id)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        chain.push(self.in_reply_to());
        chain
    }
}

/// Build the raw RFC 5322 reply for `tail` with a plain-text body.
///
/// Headers are RFC 2047 encoded and folded as needed; the body's line
/// endings are normalized to CRLF.
pub fn compose_reply(tail: &ThreadTail, reply_text: &str) -> Result<String, Error> {
    let parent = tail.in_reply_to();
    let references = tail.references();
    MessageBuilder::new()
        .to(Address::new_address(
            tail.recipient_name.as_deref(),
            tail.recipient_address.as_str(),
        ))
        .subject(tail.subject.as_str())
        .in_reply_to(parent.as_str())
        .references(references.iter().map(String::as_str).collect::<Vec<_>>())
        .text_body(normalize_line_endings(reply_text))
        .write_to_string()
        .map_err(|e| ProviderError::Compose(e.to_string()).into())
}

/// Transport encoding required by the provider's send call.
pub fn encode_raw(raw: &str) -> String {
    URL_SAFE_NO_PAD.encode(raw.as_bytes())
}

/// Split a `From` value into display name and address.
fn parse_mailbox(from: &str) -> Option<(Option<String>, String)> {
    let header = format!("From: {from}\r\n\r\n");
    let parsed = MessageParser::default().parse(header.as_bytes())?;
    let sender = parsed.from()?.first()?;
    let address = sender.address().map(str::trim).filter(|a| !a.is_empty())?;
    let name = sender
        .name()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);
    Some((name, address.to_string()))
}

/// CRLF, bare CR and bare LF all become CRLF.
fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\n', "\r\n")
}

fn bare_id(id: &str) -> &str {
    id.trim().trim_start_matches('<').trim_end_matches('>').trim()
}

/// Strip CR/LF so a provider-supplied value cannot inject headers.
fn sanitize_header_value(value: &str) -> String {
    value
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
