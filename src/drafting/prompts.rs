//! System instructions for the drafting steps.

pub const SUMMARY_INSTRUCTION: &str = "Summarize this email snippet in one sentence:";

pub const REPLY_INSTRUCTION: &str =
    "Generate a concise and polite email reply based on this summary:";

/// Returned when the model answered with no summary text.
pub const NO_SUMMARY: &str = "No summary returned";

/// Returned when the model answered with no reply text.
pub const NO_REPLY: &str = "No reply generated";
