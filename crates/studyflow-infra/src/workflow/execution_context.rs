//! Live execution context wiring workflow steps to real services.
//!
//! [`LiveExecutionContext`] implements the [`StepExecutionContext`] trait from
//! studyflow-core:
//! - `ai_task` steps go to the configured completion gateway via `BoxLlmProvider`
//! - `api_call` steps make real HTTP requests via `reqwest::Client`
//!
//! The trait is defined in core and implemented here, the same split as
//! `SqliteWorkflowRepository` implementing `WorkflowRepository`.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use studyflow_core::llm::box_provider::BoxLlmProvider;
use studyflow_core::workflow::step_runner::{StepError, StepExecutionContext, StepFuture};
use studyflow_types::config::ExecutionConfig;
use studyflow_types::llm::{CompletionRequest, DEFAULT_SYSTEM_PROMPT};

const USER_AGENT: &str = "studyflow-workflow/0.1";

/// Real execution context for `ai_task` and `api_call` steps.
pub struct LiveExecutionContext {
    http_client: reqwest::Client,
    provider: Option<BoxLlmProvider>,
    default_system_prompt: String,
}

impl LiveExecutionContext {
    /// Build the context. `provider` is `None` when no gateway key is
    /// configured; `ai_task` steps then fail with a clear message.
    pub fn new(
        execution: &ExecutionConfig,
        provider: Option<BoxLlmProvider>,
        system_prompt: Option<String>,
    ) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(execution.http_timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http_client,
            provider,
            default_system_prompt: system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        })
    }
}

/// Classify a transport-level reqwest failure.
fn request_error(url: &str, e: reqwest::Error) -> StepError {
    let message = format!("HTTP request to '{url}' failed: {e}");
    if e.is_connect() || e.is_timeout() || e.is_request() {
        StepError::Transient(message)
    } else {
        StepError::Failed(message)
    }
}

impl StepExecutionContext for LiveExecutionContext {
    fn execute_ai_task(
        &self,
        model: Option<&str>,
        system_prompt: Option<&str>,
        prompt: &str,
    ) -> StepFuture<'_> {
        let request = CompletionRequest {
            // Empty falls back to the provider's configured default.
            model: model.unwrap_or_default().to_string(),
            system: Some(
                system_prompt
                    .unwrap_or(&self.default_system_prompt)
                    .to_string(),
            ),
            prompt: prompt.to_string(),
            max_tokens: None,
        };

        Box::pin(async move {
            let provider = self.provider.as_ref().ok_or_else(|| {
                StepError::Failed("AI gateway API key not configured".to_string())
            })?;

            let response = provider.complete(&request).await.map_err(|e| {
                let message = format!("AI completion failed: {e}");
                if e.is_transient() {
                    StepError::Transient(message)
                } else {
                    StepError::Failed(message)
                }
            })?;

            tracing::info!(
                provider = provider.name(),
                model = response.model.as_str(),
                output_len = response.content.len(),
                "ai_task step completed"
            );

            Ok(Value::String(response.content))
        })
    }

    fn execute_api_call(
        &self,
        method: &str,
        url: &str,
        headers: Option<&HashMap<String, String>>,
        body: Option<&Value>,
    ) -> StepFuture<'_> {
        let method = method.to_string();
        let url = url.to_string();
        let headers = headers.cloned();
        let body = body.cloned();

        Box::pin(async move {
            let http_method: reqwest::Method = method.to_uppercase().parse().map_err(|_| {
                StepError::Failed(format!("invalid HTTP method: {method}"))
            })?;

            let mut request = self.http_client.request(http_method, &url);

            if let Some(ref hdrs) = headers {
                for (key, value) in hdrs {
                    request = request.header(key.as_str(), value.as_str());
                }
            }

            if let Some(ref b) = body {
                request = request.json(b);
            }

            let response = request.send().await.map_err(|e| request_error(&url, e))?;

            let status = response.status();
            if !status.is_success() {
                let message = format!("HTTP {} from {url}", status.as_u16());
                tracing::warn!(url = url.as_str(), status = status.as_u16(), "api_call step got error status");
                return Err(
                    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        StepError::Transient(message)
                    } else {
                        StepError::Failed(message)
                    },
                );
            }

            let text = response.text().await.map_err(|e| request_error(&url, e))?;

            tracing::info!(
                url = url.as_str(),
                status = status.as_u16(),
                body_len = text.len(),
                "api_call step completed"
            );

            Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use serde_json::json;
    use studyflow_core::llm::provider::LlmProvider;
    use studyflow_types::llm::{CompletionResponse, LlmError};

    /// Serve `router` on an ephemeral local port and return its base URL.
    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn context(provider: Option<BoxLlmProvider>) -> LiveExecutionContext {
        LiveExecutionContext::new(&ExecutionConfig::default(), provider, None).unwrap()
    }

    #[derive(Default)]
    struct RecordingProvider {
        seen: Mutex<Vec<CompletionRequest>>,
        fail_with: Option<LlmError>,
    }

    impl LlmProvider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        fn default_model(&self) -> &str {
            "test-model"
        }

        async fn complete(
            &self,
            request: &CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.seen.lock().unwrap().push(request.clone());
            if let Some(ref e) = self.fail_with {
                return Err(e.clone());
            }
            Ok(CompletionResponse {
                content: format!("echo: {}", request.prompt),
                model: "test-model".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn ai_task_returns_completion_text() {
        let ctx = context(Some(BoxLlmProvider::new(RecordingProvider::default())));
        let value = ctx
            .execute_ai_task(None, None, "Summarize: photosynthesis")
            .await
            .unwrap();
        assert_eq!(value, json!("echo: Summarize: photosynthesis"));
    }

    #[tokio::test]
    async fn ai_task_without_provider_fails() {
        let ctx = context(None);
        let err = ctx.execute_ai_task(None, None, "hi").await.unwrap_err();
        assert_eq!(err, StepError::Failed("AI gateway API key not configured".into()));
    }

    #[tokio::test]
    async fn ai_task_classifies_provider_errors() {
        let rate_limited = RecordingProvider {
            fail_with: Some(LlmError::RateLimited { retry_after_ms: None }),
            ..Default::default()
        };
        let ctx = context(Some(BoxLlmProvider::new(rate_limited)));
        assert!(ctx.execute_ai_task(None, None, "x").await.unwrap_err().is_transient());

        let auth = RecordingProvider {
            fail_with: Some(LlmError::AuthenticationFailed),
            ..Default::default()
        };
        let ctx = context(Some(BoxLlmProvider::new(auth)));
        assert!(!ctx.execute_ai_task(None, None, "x").await.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn api_call_parses_json_body() {
        let router = Router::new().route(
            "/grades",
            post(|headers: HeaderMap, axum::Json(body): axum::Json<Value>| async move {
                axum::Json(json!({
                    "token": headers.get("x-token").and_then(|v| v.to_str().ok()),
                    "echo": body,
                }))
            }),
        );
        let base = spawn_server(router).await;
        let ctx = context(None);

        let headers = HashMap::from([("X-Token".to_string(), "abc".to_string())]);
        let value = ctx
            .execute_api_call(
                "post",
                &format!("{base}/grades"),
                Some(&headers),
                Some(&json!({"course": "BIO101"})),
            )
            .await
            .unwrap();

        assert_eq!(value["token"], "abc");
        assert_eq!(value["echo"]["course"], "BIO101");
    }

    #[tokio::test]
    async fn api_call_non_json_body_becomes_string() {
        let router = Router::new().route("/plain", get(|| async { "just text" }));
        let base = spawn_server(router).await;

        let value = context(None)
            .execute_api_call("GET", &format!("{base}/plain"), None, None)
            .await
            .unwrap();
        assert_eq!(value, json!("just text"));
    }

    #[tokio::test]
    async fn api_call_error_status_messages() {
        let router = Router::new()
            .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
            .route("/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route("/busy", get(|| async { StatusCode::TOO_MANY_REQUESTS }));
        let base = spawn_server(router).await;
        let ctx = context(None);

        let url = format!("{base}/missing");
        let err = ctx.execute_api_call("GET", &url, None, None).await.unwrap_err();
        assert_eq!(err, StepError::Failed(format!("HTTP 404 from {url}")));

        let url = format!("{base}/broken");
        let err = ctx.execute_api_call("GET", &url, None, None).await.unwrap_err();
        assert_eq!(err, StepError::Transient(format!("HTTP 500 from {url}")));

        let url = format!("{base}/busy");
        let err = ctx.execute_api_call("GET", &url, None, None).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn api_call_connection_refused_is_transient() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = context(None)
            .execute_api_call("GET", &format!("http://{addr}/x"), None, None)
            .await
            .unwrap_err();
        assert!(err.is_transient(), "{err}");
    }

    #[tokio::test]
    async fn api_call_rejects_bad_method() {
        let err = context(None)
            .execute_api_call("GE T", "http://127.0.0.1:1/", None, None)
            .await
            .unwrap_err();
        assert_eq!(err, StepError::Failed("invalid HTTP method: GE T".into()));
    }
}
