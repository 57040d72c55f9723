//! OpenAI-compatible LLM provider implementation.
//!
//! One [`OpenAiCompatibleProvider`] serves any gateway that speaks the OpenAI
//! chat completions protocol (the default AI gateway, OpenAI itself, ...)
//! via a configurable base URL. Uses [`async_openai`] for type-safe
//! request/response handling.

pub mod config;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
    CreateChatCompletionResponse,
};
use async_openai::Client;
use secrecy::ExposeSecret;

use studyflow_core::llm::provider::LlmProvider;
use studyflow_types::llm::{CompletionRequest, CompletionResponse, LlmError};

use self::config::OpenAiCompatConfig;

/// Unified provider for any OpenAI-compatible API.
///
/// Does NOT derive Debug: the `async_openai::Client` holds the API key.
pub struct OpenAiCompatibleProvider {
    client: Client<OpenAIConfig>,
    provider_name: String,
    model: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: OpenAiCompatConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(config.api_key.expose_secret())
            .with_api_base(&config.base_url);

        Self {
            client: Client::with_config(openai_config),
            provider_name: config.provider_name,
            model: config.model,
        }
    }

    /// Build a [`CreateChatCompletionRequest`]: optional system message, then
    /// the prompt as the single user message.
    fn build_request(&self, request: &CompletionRequest) -> CreateChatCompletionRequest {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(2);

        if let Some(ref system) = request.system {
            messages.push(ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(system.clone()),
                    name: None,
                },
            ));
        }

        messages.push(ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(request.prompt.clone()),
                name: None,
            },
        ));

        let model = if request.model.is_empty() {
            self.model.clone()
        } else {
            request.model.clone()
        };

        CreateChatCompletionRequest {
            model,
            messages,
            max_completion_tokens: request.max_tokens,
            ..Default::default()
        }
    }
}

impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let oai_request = self.build_request(request);

        let response = self
            .client
            .chat()
            .create(oai_request)
            .await
            .map_err(map_openai_error)?;

        completion_from_response(response)
    }
}

/// Map async-openai errors onto [`LlmError`], keeping the transient cases
/// (rate limits, overload, network) distinguishable.
fn map_openai_error(err: async_openai::error::OpenAIError) -> LlmError {
    use async_openai::error::OpenAIError;

    match &err {
        OpenAIError::ApiError(api_err) => {
            let code = api_err.code.as_deref().unwrap_or("");
            let error_type = api_err.r#type.as_deref().unwrap_or("");

            if code == "authentication_error"
                || error_type == "authentication_error"
                || api_err.message.contains("Invalid API key")
            {
                LlmError::AuthenticationFailed
            } else if code == "rate_limit_exceeded" || error_type == "rate_limit_error" {
                LlmError::RateLimited {
                    retry_after_ms: None,
                }
            } else if code == "server_error" || error_type == "overloaded_error" {
                LlmError::Overloaded(api_err.message.clone())
            } else {
                LlmError::Provider {
                    message: api_err.message.clone(),
                }
            }
        }
        OpenAIError::Reqwest(reqwest_err) => match reqwest_err.status().map(|s| s.as_u16()) {
            Some(401) | Some(403) => LlmError::AuthenticationFailed,
            Some(429) => LlmError::RateLimited {
                retry_after_ms: None,
            },
            Some(status) if status >= 500 => LlmError::Overloaded(err.to_string()),
            Some(_) => LlmError::Provider {
                message: err.to_string(),
            },
            None => LlmError::Network(err.to_string()),
        },
        OpenAIError::JSONDeserialize(_, content) => {
            LlmError::Deserialization(format!("failed to parse response: {content}"))
        }
        OpenAIError::InvalidArgument(msg) => LlmError::InvalidRequest(msg.clone()),
        _ => LlmError::Provider {
            message: err.to_string(),
        },
    }
}

/// First choice's text. A response without choices is a provider error.
fn completion_from_response(
    response: CreateChatCompletionResponse,
) -> Result<CompletionResponse, LlmError> {
    let choice = response.choices.into_iter().next().ok_or_else(|| LlmError::Provider {
        message: "completion response contained no choices".to_string(),
    })?;

    Ok(CompletionResponse {
        content: choice.message.content.unwrap_or_default(),
        model: response.model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use studyflow_types::config::AiConfig;

    fn gateway() -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new(config::gateway_config(
            &AiConfig::default(),
            SecretString::from("sk-test"),
        ))
    }

    #[test]
    fn test_gateway_factory() {
        let provider = gateway();
        assert_eq!(provider.name(), "gateway");
        assert_eq!(provider.default_model(), "google/gemini-2.5-flash");
    }

    #[test]
    fn test_build_request_with_system_prompt() {
        let request = CompletionRequest {
            model: String::new(),
            system: Some("You are a study coach.".to_string()),
            prompt: "Summarize: X".to_string(),
            max_tokens: Some(256),
        };
        let req = gateway().build_request(&request);

        assert_eq!(req.model, "google/gemini-2.5-flash");
        assert_eq!(req.max_completion_tokens, Some(256));
        assert_eq!(req.messages.len(), 2);
        assert!(matches!(req.messages[0], ChatCompletionRequestMessage::System(_)));
        match &req.messages[1] {
            ChatCompletionRequestMessage::User(user) => match &user.content {
                ChatCompletionRequestUserMessageContent::Text(text) => {
                    assert_eq!(text, "Summarize: X")
                }
                other => panic!("expected text content, got {other:?}"),
            },
            other => panic!("expected user message, got {other:?}"),
        }
    }

    #[test]
    fn test_build_request_model_override() {
        let request = CompletionRequest {
            model: "openai/gpt-4o-mini".to_string(),
            system: None,
            prompt: "Hi".to_string(),
            max_tokens: None,
        };
        let req = gateway().build_request(&request);
        assert_eq!(req.model, "openai/gpt-4o-mini");
        assert_eq!(req.messages.len(), 1);
    }

    #[test]
    fn test_empty_choices_is_provider_error() {
        let response: CreateChatCompletionResponse = serde_json::from_value(serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "google/gemini-2.5-flash",
            "choices": []
        }))
        .unwrap();

        let err = completion_from_response(response).unwrap_err();
        assert!(matches!(err, LlmError::Provider { ref message } if message.contains("no choices")));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_map_invalid_argument() {
        let err = map_openai_error(async_openai::error::OpenAIError::InvalidArgument(
            "bad".to_string(),
        ));
        assert!(matches!(err, LlmError::InvalidRequest(ref m) if m == "bad"));
        assert!(!err.is_transient());
    }
}
