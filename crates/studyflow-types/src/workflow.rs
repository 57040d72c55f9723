//! Workflow domain types for studyflow.
//!
//! A `Workflow` is an owned, ordered list of `StepDefinition`s. Each execution
//! produces a `RunRecord` whose status only ever moves from `running` to one
//! of the terminal states.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delay used when a `delay` step omits its duration.
pub const DEFAULT_DELAY_MS: u64 = 1000;

/// HTTP method used when an `api_call` step omits one.
pub const DEFAULT_HTTP_METHOD: &str = "GET";

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A stored workflow, owned by a single user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// UUIDv7 assigned on creation.
    pub id: Uuid,
    /// Owning user. Executions by any other user are rejected as not found.
    pub user_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub enabled: bool,
    /// Cron expression or English shorthand (see the scheduler module).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    /// Overall wall-clock budget for one execution, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Executed strictly in list order.
    pub steps: Vec<StepDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The user-authored part of a workflow: what a definition file or a REST
/// request body carries. Identity and timestamps are assigned on save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, alias = "schedule_cron", skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

fn default_enabled() -> bool {
    true
}

impl WorkflowSpec {
    /// Materialize a new workflow owned by `user_id`.
    pub fn into_workflow(self, user_id: impl Into<String>) -> Workflow {
        let now = Utc::now();
        Workflow {
            id: Uuid::now_v7(),
            user_id: user_id.into(),
            name: self.name,
            description: self.description,
            enabled: self.enabled,
            schedule: self.schedule,
            timeout_secs: self.timeout_secs,
            steps: self.steps,
            last_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the authored fields of an existing workflow, keeping its
    /// identity, owner and run history.
    pub fn apply_to(self, workflow: &mut Workflow) {
        workflow.name = self.name;
        workflow.description = self.description;
        workflow.enabled = self.enabled;
        workflow.schedule = self.schedule;
        workflow.timeout_secs = self.timeout_secs;
        workflow.steps = self.steps;
        workflow.updated_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// Step Definition
// ---------------------------------------------------------------------------

/// One unit of declared work within a workflow.
///
/// The `name` only labels the step's entry in the run result; steps never
/// reference each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub kind: StepKind,
    /// Per-step timeout override for network-bound steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Bounded retry on transient failures. Absent means a single attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
}

/// Type-specific step payload, discriminated by the `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// One non-streaming text completion.
    AiTask {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, alias = "systemPrompt", skip_serializing_if = "Option::is_none")]
        system_prompt: Option<String>,
        prompt: String,
    },
    /// Declared but not implemented; always yields a placeholder result.
    WebScrape { url: String },
    /// One HTTP request whose JSON response body becomes the step result.
    ApiCall {
        url: String,
        #[serde(default = "default_method")]
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        headers: Option<HashMap<String, String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<serde_json::Value>,
    },
    /// Cooperative sleep, in milliseconds.
    Delay {
        #[serde(default = "default_delay_ms")]
        duration: u64,
    },
}

fn default_method() -> String {
    DEFAULT_HTTP_METHOD.to_string()
}

fn default_delay_ms() -> u64 {
    DEFAULT_DELAY_MS
}

impl StepKind {
    /// The wire name of this step type.
    pub fn type_name(&self) -> &'static str {
        match self {
            StepKind::AiTask { .. } => "ai_task",
            StepKind::WebScrape { .. } => "web_scrape",
            StepKind::ApiCall { .. } => "api_call",
            StepKind::Delay { .. } => "delay",
        }
    }

    /// Whether the step waits on network I/O (and so gets a step timeout).
    pub fn is_network_bound(&self) -> bool {
        matches!(self, StepKind::AiTask { .. } | StepKind::ApiCall { .. })
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Exponential backoff retry policy for a single step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Run Record
// ---------------------------------------------------------------------------

/// Status of a workflow run. Transitions are `running -> completed` or
/// `running -> failed`, never reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One labeled step output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: String,
    pub result: serde_json::Value,
}

/// Aggregated step outputs, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub steps: Vec<StepResult>,
}

/// The persisted outcome of one workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub user_id: String,
    pub status: RunStatus,
    /// Present only on `completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<RunResult>,
    /// Steps that finished before the failure. Present only on `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_result: Option<RunResult>,
    /// Present only on `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    /// A fresh record in the `running` state.
    pub fn start(workflow_id: Uuid, user_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            workflow_id,
            user_id: user_id.into(),
            status: RunStatus::Running,
            result: None,
            partial_result: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// How a run ended. Passed to the repository to close out a run record.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(RunResult),
    Failed { error: String, partial: RunResult },
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            RunOutcome::Completed(_) => RunStatus::Completed,
            RunOutcome::Failed { .. } => RunStatus::Failed,
        }
    }

    /// Apply this outcome to a record that is still running.
    pub fn apply_to(self, run: &mut RunRecord, completed_at: DateTime<Utc>) {
        run.status = self.status();
        run.completed_at = Some(completed_at);
        match self {
            RunOutcome::Completed(result) => {
                run.result = Some(result);
                run.partial_result = None;
                run.error = None;
            }
            RunOutcome::Failed { error, partial } => {
                run.result = None;
                run.partial_result = Some(partial);
                run.error = Some(error);
            }
        }
    }
}
