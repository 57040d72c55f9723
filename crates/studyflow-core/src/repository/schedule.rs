//! Scheduled task repository trait definition.

use chrono::{DateTime, Utc};
use studyflow_types::error::RepositoryError;
use studyflow_types::schedule::ScheduledTask;
use studyflow_types::usage::UsageEvent;
use uuid::Uuid;

/// Repository trait for scheduled task persistence.
pub trait ScheduleRepository: Send + Sync {
    /// Upsert a task (insert or replace by ID).
    fn save_task(
        &self,
        task: &ScheduledTask,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_task(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ScheduledTask>, RepositoryError>> + Send;

    /// List tasks, optionally only those owned by `user_id`.
    fn list_tasks(
        &self,
        user_id: Option<&str>,
    ) -> impl std::future::Future<Output = Result<Vec<ScheduledTask>, RepositoryError>> + Send;

    /// Delete a task by ID. Returns `true` if it existed.
    fn delete_task(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Enabled tasks whose `next_run_at` is null or not after `now`, oldest
    /// due first.
    fn list_due_tasks(
        &self,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Vec<ScheduledTask>, RepositoryError>> + Send;

    /// Advance a task's timestamps after it ran and append the usage event,
    /// atomically.
    fn record_task_run(
        &self,
        task_id: &Uuid,
        ran_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
        usage: &UsageEvent,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
