//! Workflow repository trait definition.
//!
//! Storage interface for workflows and their run records. The run methods
//! enforce the run lifecycle: `complete_run` and `fail_run` only succeed on a
//! run that is still `running`.

use chrono::{DateTime, Utc};
use studyflow_types::error::RepositoryError;
use studyflow_types::usage::UsageEvent;
use studyflow_types::workflow::{RunRecord, RunResult, Workflow};
use uuid::Uuid;

/// Repository trait for workflow persistence.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait WorkflowRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Workflows
    // -----------------------------------------------------------------------

    /// Upsert a workflow (insert or replace by ID).
    fn save_workflow(
        &self,
        workflow: &Workflow,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_workflow(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Workflow>, RepositoryError>> + Send;

    /// List a user's workflows, ordered by name.
    fn list_workflows(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Workflow>, RepositoryError>> + Send;

    /// Delete a workflow by ID. Returns `true` if it existed. Run records
    /// are retained.
    fn delete_workflow(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Insert a new run record (normally in the `running` state).
    fn create_run(
        &self,
        run: &RunRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Mark a running run `completed`, stamp the workflow's `last_run_at`
    /// and append the usage event, atomically.
    ///
    /// Returns `NotFound` for an unknown run and `Conflict` for a run that
    /// already reached a terminal state.
    fn complete_run(
        &self,
        run_id: &Uuid,
        result: &RunResult,
        completed_at: DateTime<Utc>,
        usage: &UsageEvent,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Mark a running run `failed` with the error message and the steps that
    /// finished before the failure. Same lifecycle errors as `complete_run`.
    fn fail_run(
        &self,
        run_id: &Uuid,
        error: &str,
        partial: &RunResult,
        failed_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_run(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<RunRecord>, RepositoryError>> + Send;

    /// Most recent runs of a workflow first.
    fn list_runs(
        &self,
        workflow_id: &Uuid,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<RunRecord>, RepositoryError>> + Send;

    /// Runs still in the `running` state (crash recovery on startup).
    fn list_running_runs(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<RunRecord>, RepositoryError>> + Send;
}
