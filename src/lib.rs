//! Smart Inbox: Gmail listing, LLM-drafted replies, threaded sending.

pub mod auth;
pub mod config;
pub mod drafting;
pub mod error;
pub mod inbox;
pub mod llm;
pub mod mail;

#[cfg(test)]
mod testing;
