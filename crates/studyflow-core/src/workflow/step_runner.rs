//! Step type dispatch.
//!
//! [`StepRunner`] matches on a step's [`StepKind`] and hands the work to a
//! [`StepExecutionContext`]. The context is the seam between the interpreter
//! and the outside world: infra provides a live implementation (LLM gateway,
//! reqwest), tests substitute fakes.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use studyflow_types::workflow::{StepDefinition, StepKind};

/// Boxed future returned by the object-safe context methods.
pub type StepFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, StepError>> + Send + 'a>>;

/// Failure of a single step handler.
///
/// The display form is the bare underlying message: it is what ends up in
/// the failed run record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    /// Permanent failure; never retried.
    #[error("{0}")]
    Failed(String),

    /// Failure worth retrying (network error, 5xx, rate limit).
    #[error("{0}")]
    Transient(String),
}

impl StepError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StepError::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            StepError::Failed(m) | StepError::Transient(m) => m,
        }
    }
}

/// Side-effecting capabilities the step handlers need.
///
/// Object-safe (boxed futures) so the runner can hold an
/// `Arc<dyn StepExecutionContext>`.
pub trait StepExecutionContext: Send + Sync {
    /// One non-streaming completion. Resolves to the completion text as a
    /// JSON string.
    fn execute_ai_task(
        &self,
        model: Option<&str>,
        system_prompt: Option<&str>,
        prompt: &str,
    ) -> StepFuture<'_>;

    /// One HTTP request. Resolves to the parsed JSON response body.
    fn execute_api_call(
        &self,
        method: &str,
        url: &str,
        headers: Option<&HashMap<String, String>>,
        body: Option<&Value>,
    ) -> StepFuture<'_>;

    /// Cooperative sleep. Resolves to `{"delayed": duration_ms}`.
    fn execute_delay(&self, duration_ms: u64) -> StepFuture<'_> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(duration_ms)).await;
            Ok(json!({ "delayed": duration_ms }))
        })
    }
}

/// Placeholder output for `web_scrape` steps.
pub fn web_scrape_placeholder(url: &str) -> Value {
    json!({
        "message": "Web scraping not yet implemented",
        "url": url,
    })
}

/// Dispatches steps to the execution context.
pub struct StepRunner {
    ctx: Arc<dyn StepExecutionContext>,
}

impl StepRunner {
    pub fn new(ctx: Arc<dyn StepExecutionContext>) -> Self {
        Self { ctx }
    }

    /// Run one attempt of a step. Timeouts and retries are applied by the
    /// caller.
    pub async fn run(&self, step: &StepDefinition) -> Result<Value, StepError> {
        tracing::debug!(step = %step.name, step_type = %step.kind, "running step");

        match &step.kind {
            StepKind::AiTask {
                model,
                system_prompt,
                prompt,
            } => {
                self.ctx
                    .execute_ai_task(model.as_deref(), system_prompt.as_deref(), prompt)
                    .await
            }
            StepKind::ApiCall {
                url,
                method,
                headers,
                body,
            } => {
                self.ctx
                    .execute_api_call(method, url, headers.as_ref(), body.as_ref())
                    .await
            }
            StepKind::Delay { duration } => self.ctx.execute_delay(*duration).await,
            StepKind::WebScrape { url } => {
                tracing::warn!(step = %step.name, %url, "web_scrape is not implemented, returning placeholder");
                Ok(web_scrape_placeholder(url))
            }
        }
    }
}
