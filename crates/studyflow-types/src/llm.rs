//! Text-completion request/response types shared by the LLM provider trait
//! and its implementations.

use serde::{Deserialize, Serialize};

/// System prompt used when an `ai_task` step does not provide one.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// A single-turn, non-streaming completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Empty means "use the provider's default model".
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
}

/// Errors from LLM provider operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("provider error: {message}")]
    Provider { message: String },

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("provider overloaded: {0}")]
    Overloaded(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl LlmError {
    /// Errors worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. } | LlmError::Overloaded(_) | LlmError::Network(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(LlmError::RateLimited { retry_after_ms: None }.is_transient());
        assert!(LlmError::Network("reset".into()).is_transient());
        assert!(!LlmError::AuthenticationFailed.is_transient());
        assert!(!LlmError::InvalidRequest("bad".into()).is_transient());
    }
}
