//! Mailbox types shared by the gateway and the provider API.

use serde::{Deserialize, Serialize};

/// Read-state filter applied to a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelFilter {
    #[default]
    All,
    Read,
    Unread,
}

impl LabelFilter {
    /// Lenient parse: anything unrecognised (or absent) means `All`.
    pub fn from_wire(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("read") => LabelFilter::Read,
            Some("unread") => LabelFilter::Unread,
            _ => LabelFilter::All,
        }
    }

    /// Provider search predicate, if any.
    pub fn query(&self) -> Option<&'static str> {
        match self {
            LabelFilter::All => None,
            LabelFilter::Read => Some("is:read"),
            LabelFilter::Unread => Some("is:unread"),
        }
    }
}

/// Immutable projection of a provider message returned by a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    pub id: String,
    pub thread_id: String,
    pub snippet: String,
}

/// Entry of a provider listing: identity only, details come later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub id: String,
    pub thread_id: Option<String>,
}

/// A single RFC 5322 header as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

impl MessageHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Case-insensitive header lookup; first match wins.
pub fn find_header<'a>(headers: &'a [MessageHeader], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

/// Message detail as fetched from the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMessage {
    pub id: String,
    pub thread_id: String,
    pub snippet: String,
    pub headers: Vec<MessageHeader>,
}

impl From<ProviderMessage> for MessageSummary {
    fn from(msg: ProviderMessage) -> Self {
        Self {
            id: msg.id,
            thread_id: msg.thread_id,
            snippet: msg.snippet,
        }
    }
}

/// A thread with its messages in provider order (oldest first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderThread {
    pub id: String,
    pub messages: Vec<ProviderMessage>,
}

/// An encoded message ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// URL-safe unpadded base64 of the raw RFC 5322 bytes.
    pub raw: String,
    /// Thread the message is bound to.
    pub thread_id: String,
}
