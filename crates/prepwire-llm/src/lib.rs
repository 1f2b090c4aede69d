pub mod anthropic;
pub mod client;
pub mod health;
pub mod provider;

pub use client::{LlmClient, RetryPolicy};
pub use health::{HealthSnapshot, LlmHealth, LlmStatus};
pub use provider::{ChatMessage, ChatRole, CompletionRequest, CompletionResponse, LlmProvider};

use thiserror::Error;

/// Errors surfaced by the LLM client after its internal retry budget
/// is exhausted.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("no language-model credential configured")]
    NotConfigured,

    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("invalid JSON")]
    InvalidJson,
}

impl From<LlmError> for prepwire_core::PrepwireError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Timeout { secs } => prepwire_core::PrepwireError::AiTimeout { secs },
            LlmError::InvalidJson => {
                prepwire_core::PrepwireError::ParseError("invalid JSON from model".into())
            }
            other => prepwire_core::PrepwireError::AiError(other.to_string()),
        }
    }
}
