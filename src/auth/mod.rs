//! OAuth token lifecycle for the mailbox provider.

pub mod broker;
pub mod credential;

pub use broker::{OAuthClientConfig, TokenBroker};
pub use credential::Credential;
