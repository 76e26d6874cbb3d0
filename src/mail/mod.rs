//! Mailbox access: listing with bounded fan-out, and threaded replies.

pub mod api;
pub mod gateway;
pub mod reply;
pub mod types;

pub use api::{GmailApi, MailboxApi};
pub use gateway::{MailGateway, SendRequest};
pub use reply::ThreadTail;
pub use types::{LabelFilter, MessageSummary};

/// Gmail REST settings.
#[derive(Debug, Clone)]
pub struct GmailConfig {
    /// Base URL up to and including `users/me`.
    pub api_base: String,
    /// Maximum detail fetches in flight per listing.
    pub fetch_concurrency: usize,
}
