//! LlmProvider trait definition.
//!
//! The opaque text-completion capability behind `ai_task` steps. Uses RPITIT
//! so implementations can be plain `async fn`s.

use studyflow_types::llm::{CompletionRequest, CompletionResponse, LlmError};

/// Trait for text-completion backends.
///
/// Implementations live in studyflow-infra (e.g. `OpenAiCompatibleProvider`).
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g. "gateway", "openai").
    fn name(&self) -> &str;

    /// Model used when the request leaves `model` empty.
    fn default_model(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;
}
