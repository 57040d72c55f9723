//! Configuration for OpenAI-compatible completion gateways.

use secrecy::SecretString;
use studyflow_types::config::AiConfig;

/// Configuration for an OpenAI-compatible LLM provider.
///
/// Used to construct an [`super::OpenAiCompatibleProvider`].
pub struct OpenAiCompatConfig {
    /// Human-readable provider name (e.g., "gateway").
    pub provider_name: String,
    /// Base URL for the API, without the `/chat/completions` suffix.
    pub base_url: String,
    pub api_key: SecretString,
    /// Model used when a request does not name one.
    pub model: String,
}

/// Gateway configuration from the `[ai]` config section.
pub fn gateway_config(ai: &AiConfig, api_key: SecretString) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "gateway".into(),
        base_url: ai.base_url.trim_end_matches('/').to_string(),
        api_key,
        model: ai.default_model.clone(),
    }
}
