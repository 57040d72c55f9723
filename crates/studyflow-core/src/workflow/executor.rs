//! Step interpreter: sequential workflow execution with a durable run record.
//!
//! # Execution flow
//!
//! 1. Load the workflow; reject unknown, foreign-owned or disabled workflows.
//! 2. Take the per-workflow permit (one live run per workflow).
//! 3. Insert a `running` run record.
//! 4. Run the steps strictly in list order. Network-bound steps get a step
//!    timeout; transient failures are retried per the step's retry policy.
//! 5. The whole loop runs under the workflow timeout and can be cancelled.
//! 6. Close the run record exactly once: `completed` with every step result,
//!    or `failed` with the error and the steps that finished first.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use studyflow_types::config::ExecutionConfig;
use studyflow_types::error::RepositoryError;
use studyflow_types::usage::UsageEvent;
use studyflow_types::workflow::{
    RunOutcome, RunRecord, RunResult, StepDefinition, StepResult, Workflow,
};

use crate::repository::workflow::WorkflowRepository;

use super::retry::RetryHandler;
use super::step_runner::{StepExecutionContext, StepRunner};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default workflow-level timeout (30 minutes).
pub const DEFAULT_WORKFLOW_TIMEOUT_SECS: u64 = 1800;

/// Default step-level timeout for network-bound steps (5 minutes).
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 300;

/// Error recorded on runs left `running` by a previous process.
pub const INTERRUPTED_RUN_ERROR: &str = "interrupted: process restarted";

// ---------------------------------------------------------------------------
// WorkflowExecutor trait
// ---------------------------------------------------------------------------

/// Trait for workflow execution engines.
pub trait WorkflowExecutor: Send + Sync {
    /// Execute a stored workflow on behalf of `user_id`.
    ///
    /// On success the returned record is `completed`. Every failure after
    /// the run record was created has already been persisted as `failed`
    /// by the time the error is returned.
    fn execute(
        &self,
        workflow_id: Uuid,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<RunRecord, ExecutorError>> + Send;

    /// Cancel a run that is executing in this process.
    fn cancel(
        &self,
        run_id: Uuid,
    ) -> impl std::future::Future<Output = Result<(), ExecutorError>> + Send;
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub step_timeout: Duration,
    pub workflow_timeout: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(DEFAULT_STEP_TIMEOUT_SECS),
            workflow_timeout: Duration::from_secs(DEFAULT_WORKFLOW_TIMEOUT_SECS),
        }
    }
}

impl From<&ExecutionConfig> for ExecutorSettings {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            step_timeout: Duration::from_secs(config.step_timeout_secs),
            workflow_timeout: Duration::from_secs(config.workflow_timeout_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// StepInterpreter
// ---------------------------------------------------------------------------

/// Sequential step interpreter.
///
/// Generic over `R: WorkflowRepository` for storage flexibility. Each
/// execution runs on its own spawned task, so a run is closed even when the
/// caller stops waiting for it.
pub struct StepInterpreter<R: WorkflowRepository> {
    inner: Arc<InterpreterCore<R>>,
}

struct InterpreterCore<R: WorkflowRepository> {
    repo: Arc<R>,
    step_runner: StepRunner,
    settings: ExecutorSettings,
    /// One single-permit semaphore per workflow id, present while in use.
    running_workflows: DashMap<Uuid, Arc<Semaphore>>,
    /// Cancellation tokens keyed by run_id.
    cancellation_tokens: DashMap<Uuid, CancellationToken>,
}

/// Holds a workflow's permit; drops the semaphore entry once nobody else
/// references it.
struct WorkflowPermit<'a> {
    slots: &'a DashMap<Uuid, Arc<Semaphore>>,
    workflow_id: Uuid,
    permit: Option<OwnedSemaphorePermit>,
}

impl Drop for WorkflowPermit<'_> {
    fn drop(&mut self) {
        self.permit.take();
        self.slots
            .remove_if(&self.workflow_id, |_, semaphore| Arc::strong_count(semaphore) == 1);
    }
}

impl<R: WorkflowRepository + 'static> StepInterpreter<R> {
    pub fn new(
        repo: Arc<R>,
        exec_ctx: Arc<dyn StepExecutionContext>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            inner: Arc::new(InterpreterCore {
                repo,
                step_runner: StepRunner::new(exec_ctx),
                settings,
                running_workflows: DashMap::new(),
                cancellation_tokens: DashMap::new(),
            }),
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.inner.repo
    }

    /// Ids of runs currently executing in this process.
    pub fn active_runs(&self) -> Vec<Uuid> {
        self.inner
            .cancellation_tokens
            .iter()
            .map(|e| *e.key())
            .collect()
    }

    /// Fail every run left `running` by a previous process.
    ///
    /// Call once at startup, before accepting executions.
    pub async fn recover_interrupted_runs(&self) -> Result<usize, ExecutorError> {
        let stale = self.inner.repo.list_running_runs().await?;
        let mut recovered = 0;

        for run in stale {
            if self.inner.cancellation_tokens.contains_key(&run.id) {
                continue;
            }
            match self
                .inner
                .repo
                .fail_run(&run.id, INTERRUPTED_RUN_ERROR, &RunResult::default(), Utc::now())
                .await
            {
                Ok(()) => {
                    tracing::warn!(run_id = %run.id, workflow_id = %run.workflow_id, "marked interrupted run as failed");
                    recovered += 1;
                }
                // Finished concurrently by someone else.
                Err(RepositoryError::Conflict(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(recovered)
    }
}

impl<R: WorkflowRepository + 'static> InterpreterCore<R> {
    async fn load_workflow(
        &self,
        workflow_id: Uuid,
        user_id: &str,
    ) -> Result<Workflow, ExecutorError> {
        let workflow = self
            .repo
            .get_workflow(&workflow_id)
            .await?
            .filter(|w| w.user_id == user_id)
            .ok_or(ExecutorError::NotFound)?;

        if !workflow.enabled {
            return Err(ExecutorError::Disabled);
        }

        Ok(workflow)
    }

    fn acquire_workflow_permit(
        &self,
        workflow_id: Uuid,
    ) -> Result<WorkflowPermit<'_>, ExecutorError> {
        let semaphore = self
            .running_workflows
            .entry(workflow_id)
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone();

        let permit = semaphore
            .try_acquire_owned()
            .map_err(|_| ExecutorError::AlreadyRunning(workflow_id))?;

        Ok(WorkflowPermit {
            slots: &self.running_workflows,
            workflow_id,
            permit: Some(permit),
        })
    }

    /// The whole life of one run, from lookup to the terminal write.
    async fn execute(&self, workflow_id: Uuid, user_id: &str) -> Result<RunRecord, ExecutorError> {
        let workflow = self.load_workflow(workflow_id, user_id).await?;
        let _permit = self.acquire_workflow_permit(workflow.id)?;

        let run = RunRecord::start(workflow.id, user_id);
        self.repo.create_run(&run).await?;

        let token = CancellationToken::new();
        self.cancellation_tokens.insert(run.id, token.clone());

        let workflow_timeout = workflow
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.settings.workflow_timeout);

        tracing::info!(
            run_id = %run.id,
            workflow = %workflow.name,
            steps = workflow.steps.len(),
            "starting workflow execution"
        );

        let mut results = Vec::with_capacity(workflow.steps.len());
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(ExecutorError::Cancelled),
            timed = tokio::time::timeout(
                workflow_timeout,
                self.run_steps(&workflow, run.id, &mut results),
            ) => timed.unwrap_or(Err(ExecutorError::WorkflowTimeout)),
        };

        self.cancellation_tokens.remove(&run.id);
        self.finish_run(run, &workflow, outcome, results).await
    }

    /// Run every step in order, appending each result as it finishes.
    async fn run_steps(
        &self,
        workflow: &Workflow,
        run_id: Uuid,
        results: &mut Vec<StepResult>,
    ) -> Result<(), ExecutorError> {
        for (index, step) in workflow.steps.iter().enumerate() {
            let started = Instant::now();
            let output = self.run_step(step).await?;

            tracing::debug!(
                run_id = %run_id,
                step = %step.name,
                index,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "step completed"
            );

            results.push(StepResult {
                step: step.name.clone(),
                result: output,
            });
        }
        Ok(())
    }

    /// Run one step to completion, applying its timeout and retry policy.
    async fn run_step(&self, step: &StepDefinition) -> Result<Value, ExecutorError> {
        let mut attempt = 1;

        loop {
            let result = if step.kind.is_network_bound() {
                let limit = step
                    .timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(self.settings.step_timeout);

                match tokio::time::timeout(limit, self.step_runner.run(step)).await {
                    Ok(result) => result,
                    // Timeouts are never retried.
                    Err(_) => {
                        return Err(ExecutorError::StepTimeout {
                            step: step.name.clone(),
                            secs: limit.as_secs(),
                        });
                    }
                }
            } else {
                self.step_runner.run(step).await
            };

            match result {
                Ok(output) => return Ok(output),
                Err(err) if RetryHandler::should_retry(step.retry.as_ref(), attempt, &err) => {
                    let delay = step
                        .retry
                        .as_ref()
                        .map(|policy| RetryHandler::backoff(policy, attempt))
                        .unwrap_or_default();

                    tracing::warn!(
                        step = %step.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient step failure, retrying"
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    return Err(ExecutorError::StepFailure {
                        step: step.name.clone(),
                        message: err.message().to_string(),
                    });
                }
            }
        }
    }

    /// Persist the terminal state of a run.
    async fn finish_run(
        &self,
        mut run: RunRecord,
        workflow: &Workflow,
        outcome: Result<(), ExecutorError>,
        results: Vec<StepResult>,
    ) -> Result<RunRecord, ExecutorError> {
        let finished_at = Utc::now();
        let result = RunResult { steps: results };

        match outcome {
            Ok(()) => {
                let usage =
                    UsageEvent::workflow_execution(&run.user_id, workflow.id, result.steps.len());
                self.repo
                    .complete_run(&run.id, &result, finished_at, &usage)
                    .await?;

                tracing::info!(
                    run_id = %run.id,
                    workflow = %workflow.name,
                    steps = result.steps.len(),
                    "workflow completed"
                );

                RunOutcome::Completed(result).apply_to(&mut run, finished_at);
                Ok(run)
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(
                    run_id = %run.id,
                    workflow = %workflow.name,
                    completed_steps = result.steps.len(),
                    error = %message,
                    "workflow failed"
                );

                self.repo
                    .fail_run(&run.id, &message, &result, finished_at)
                    .await?;
                Err(err)
            }
        }
    }
}

impl<R: WorkflowRepository + 'static> WorkflowExecutor for StepInterpreter<R> {
    async fn execute(&self, workflow_id: Uuid, user_id: &str) -> Result<RunRecord, ExecutorError> {
        let core = Arc::clone(&self.inner);
        let user_id = user_id.to_string();

        tokio::spawn(async move { core.execute(workflow_id, &user_id).await })
            .await
            .map_err(|e| ExecutorError::TaskFailed(e.to_string()))?
    }

    async fn cancel(&self, run_id: Uuid) -> Result<(), ExecutorError> {
        match self.inner.cancellation_tokens.get(&run_id) {
            Some(token) => {
                token.cancel();
                tracing::info!(run_id = %run_id, "workflow cancellation requested");
                Ok(())
            }
            None => Err(ExecutorError::RunNotFound(run_id)),
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutorError
// ---------------------------------------------------------------------------

/// Errors that can occur during workflow execution.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Unknown workflow, or one owned by another user.
    #[error("workflow not found")]
    NotFound,

    #[error("workflow is disabled")]
    Disabled,

    /// Another run of the same workflow is in progress.
    #[error("workflow {0} is already running")]
    AlreadyRunning(Uuid),

    /// A step handler failed. Displays as the handler's own message.
    #[error("{message}")]
    StepFailure { step: String, message: String },

    /// A network-bound step exceeded its timeout.
    #[error("step '{step}' timed out after {secs}s")]
    StepTimeout { step: String, secs: u64 },

    /// Workflow exceeded its overall timeout.
    #[error("workflow timed out")]
    WorkflowTimeout,

    #[error("workflow cancelled")]
    Cancelled,

    /// Run not executing in this process (for cancel).
    #[error("workflow run not found: {0}")]
    RunNotFound(Uuid),

    /// The run record or workflow metadata could not be written.
    #[error("persistence error: {0}")]
    Persistence(#[from] RepositoryError),

    /// The spawned execution task panicked.
    #[error("execution task failed: {0}")]
    TaskFailed(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
