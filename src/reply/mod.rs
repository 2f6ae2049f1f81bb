//! Reply generation for voice turns.
//!
//! This module provides:
//! * [`ReplyGenerator`]: async trait the turn controller calls once per turn.
//! * [`ApiReplyGenerator`]: Gemini / OpenAI-compatible REST backend.
//! * [`PromptBuilder`]: system instruction and request bodies.
//! * [`ReplyError`]: failure variants, surfaced to the user as a single
//!   "please try again" message.

pub mod generator;
pub mod prompt;

use async_trait::async_trait;
use thiserror::Error;

use crate::turn::Message;

pub use generator::ApiReplyGenerator;
pub use prompt::{PromptBuilder, EMPTY_REPLY};

// ---------------------------------------------------------------------------
// ReplyError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ReplyError {
    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("reply request timed out")]
    Timeout,

    /// The backend answered with a non-success status.
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body was not the expected JSON.
    #[error("failed to parse reply: {0}")]
    Parse(String),

    /// No key in the config file nor in the named environment variable.
    #[error("API key not configured (set {0})")]
    MissingApiKey(String),
}

impl From<reqwest::Error> for ReplyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ReplyError::Timeout
        } else {
            ReplyError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// ReplyGenerator trait
// ---------------------------------------------------------------------------

/// Produces the assistant's answer for the latest turn.
///
/// * `history` – the whole conversation, ending with the new user message.
/// * `context` – extracted document text (may be empty).
/// * `persona` – caller-supplied system instruction.
///
/// Implementors must be `Send + Sync`; the controller shares them as
/// `Arc<dyn ReplyGenerator>` and calls them from spawned tasks.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate_reply(
        &self,
        history: &[Message],
        context: &str,
        persona: &str,
    ) -> Result<String, ReplyError>;
}
