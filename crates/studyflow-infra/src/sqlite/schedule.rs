//! SQLite scheduled task repository implementation.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use studyflow_core::repository::schedule::ScheduleRepository;
use studyflow_types::error::RepositoryError;
use studyflow_types::schedule::{ScheduledTask, TaskType};
use studyflow_types::usage::UsageEvent;

use super::pool::DatabasePool;
use super::{
    format_datetime, from_json, insert_usage_event, parse_datetime, parse_uuid, query_err, to_json,
};

/// SQLite-backed implementation of `ScheduleRepository`.
pub struct SqliteScheduleRepository {
    pool: DatabasePool,
}

impl SqliteScheduleRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct TaskRow {
    id: String,
    user_id: String,
    name: String,
    description: Option<String>,
    task_type: String,
    parameters: String,
    schedule: String,
    enabled: i64,
    next_run_at: Option<String>,
    last_run_at: Option<String>,
    created_at: String,
}

impl TaskRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            task_type: row.try_get("task_type")?,
            parameters: row.try_get("parameters")?,
            schedule: row.try_get("schedule")?,
            enabled: row.try_get("enabled")?,
            next_run_at: row.try_get("next_run_at")?,
            last_run_at: row.try_get("last_run_at")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_task(self) -> Result<ScheduledTask, RepositoryError> {
        Ok(ScheduledTask {
            id: parse_uuid(&self.id)?,
            user_id: self.user_id,
            name: self.name,
            description: self.description,
            // Unrecognized types still load; the scheduler reports them.
            task_type: self.task_type.parse().unwrap_or(TaskType::Unknown),
            parameters: from_json(&self.parameters, "task parameters")?,
            schedule: self.schedule,
            enabled: self.enabled != 0,
            next_run_at: self.next_run_at.as_deref().map(parse_datetime).transpose()?,
            last_run_at: self.last_run_at.as_deref().map(parse_datetime).transpose()?,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

fn rows_to_tasks(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<ScheduledTask>, RepositoryError> {
    rows.iter()
        .map(|row| TaskRow::from_row(row).map_err(query_err)?.into_task())
        .collect()
}

impl ScheduleRepository for SqliteScheduleRepository {
    async fn save_task(&self, task: &ScheduledTask) -> Result<(), RepositoryError> {
        let workflow_id = match task.task_type {
            TaskType::Workflow => task.workflow_id().map(|id| id.to_string()),
            _ => None,
        };

        // The link column only points at workflows that exist, so a task
        // naming a missing workflow is kept and reported when it runs.
        sqlx::query(
            r#"INSERT INTO scheduled_tasks
               (id, user_id, name, description, task_type, parameters, schedule, enabled,
                next_run_at, last_run_at, created_at, workflow_id)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, (SELECT id FROM workflows WHERE id = ?))
               ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 task_type = excluded.task_type,
                 parameters = excluded.parameters,
                 schedule = excluded.schedule,
                 enabled = excluded.enabled,
                 next_run_at = excluded.next_run_at,
                 last_run_at = excluded.last_run_at,
                 workflow_id = excluded.workflow_id"#,
        )
        .bind(task.id.to_string())
        .bind(&task.user_id)
        .bind(&task.name)
        .bind(&task.description)
        .bind(task.task_type.as_str())
        .bind(to_json(&task.parameters)?)
        .bind(&task.schedule)
        .bind(task.enabled as i64)
        .bind(task.next_run_at.as_ref().map(format_datetime))
        .bind(task.last_run_at.as_ref().map(format_datetime))
        .bind(format_datetime(&task.created_at))
        .bind(workflow_id)
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn get_task(&self, id: &Uuid) -> Result<Option<ScheduledTask>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM scheduled_tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.map(|row| TaskRow::from_row(&row).map_err(query_err)?.into_task())
            .transpose()
    }

    async fn list_tasks(&self, user_id: Option<&str>) -> Result<Vec<ScheduledTask>, RepositoryError> {
        let rows = match user_id {
            Some(user_id) => {
                sqlx::query(
                    "SELECT * FROM scheduled_tasks WHERE user_id = ? ORDER BY created_at ASC",
                )
                .bind(user_id)
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM scheduled_tasks ORDER BY created_at ASC")
                    .fetch_all(&self.pool.reader)
                    .await
            }
        }
        .map_err(query_err)?;

        rows_to_tasks(&rows)
    }

    async fn delete_task(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM scheduled_tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_due_tasks(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTask>, RepositoryError> {
        // NULLs sort first: never-run tasks go before overdue ones.
        let rows = sqlx::query(
            r#"SELECT * FROM scheduled_tasks
               WHERE enabled = 1 AND (next_run_at IS NULL OR next_run_at <= ?)
               ORDER BY next_run_at ASC, created_at ASC"#,
        )
        .bind(format_datetime(&now))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows_to_tasks(&rows)
    }

    async fn record_task_run(
        &self,
        task_id: &Uuid,
        ran_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
        usage: &UsageEvent,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let updated = sqlx::query(
            "UPDATE scheduled_tasks SET last_run_at = ?, next_run_at = ? WHERE id = ?",
        )
        .bind(format_datetime(&ran_at))
        .bind(format_datetime(&next_run_at))
        .bind(task_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        insert_usage_event(&mut tx, usage).await?;

        tx.commit().await.map_err(query_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::pool::test_pool;
    use crate::sqlite::workflow::SqliteWorkflowRepository;
    use chrono::Duration;
    use serde_json::json;
    use studyflow_core::repository::workflow::WorkflowRepository;
    use studyflow_types::workflow::WorkflowSpec;

    fn reminder(user: &str, next_run_at: Option<DateTime<Utc>>) -> ScheduledTask {
        let mut task = ScheduledTask::new(
            user,
            "Study reminder",
            TaskType::Reminder,
            "0 0 20 * * *",
            json!({"message": "Review flashcards"}),
        );
        task.next_run_at = next_run_at;
        task
    }

    #[tokio::test]
    async fn test_save_get_list_delete() {
        let repo = SqliteScheduleRepository::new(test_pool().await);
        let task = reminder("alice", None);
        repo.save_task(&task).await.unwrap();
        repo.save_task(&reminder("bob", None)).await.unwrap();

        let loaded = repo.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(loaded.task_type, TaskType::Reminder);
        assert_eq!(loaded.parameters["message"], "Review flashcards");
        assert_eq!(loaded.schedule, "0 0 20 * * *");

        assert_eq!(repo.list_tasks(Some("alice")).await.unwrap().len(), 1);
        assert_eq!(repo.list_tasks(None).await.unwrap().len(), 2);

        assert!(repo.delete_task(&task.id).await.unwrap());
        assert!(repo.get_task(&task.id).await.unwrap().is_none());
        assert!(!repo.delete_task(&task.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_due_tasks() {
        let repo = SqliteScheduleRepository::new(test_pool().await);
        let now = Utc::now();

        let never_run = reminder("alice", None);
        let overdue = reminder("alice", Some(now - Duration::minutes(5)));
        let future = reminder("alice", Some(now + Duration::hours(1)));
        let mut disabled = reminder("alice", Some(now - Duration::minutes(1)));
        disabled.enabled = false;

        for task in [&never_run, &overdue, &future, &disabled] {
            repo.save_task(task).await.unwrap();
        }

        let due = repo.list_due_tasks(now).await.unwrap();
        let ids: Vec<_> = due.iter().map(|t| t.id).collect();
        assert_eq!(ids, [never_run.id, overdue.id]);
    }

    #[tokio::test]
    async fn test_record_task_run_advances_and_logs() {
        let repo = SqliteScheduleRepository::new(test_pool().await);
        let task = reminder("alice", None);
        repo.save_task(&task).await.unwrap();

        let ran_at = Utc::now();
        let next = ran_at + Duration::days(1);
        let usage = UsageEvent::scheduled_task("alice", task.id, TaskType::Reminder, json!({}));
        repo.record_task_run(&task.id, ran_at, next, &usage).await.unwrap();

        let loaded = repo.get_task(&task.id).await.unwrap().unwrap();
        // Stored at microsecond precision.
        let micros = |t: Option<DateTime<Utc>>| t.map(|t| t.timestamp_micros());
        assert_eq!(micros(loaded.last_run_at), micros(Some(ran_at)));
        assert_eq!(micros(loaded.next_run_at), micros(Some(next)));
        assert!(repo.list_due_tasks(ran_at).await.unwrap().is_empty());

        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM usage_events WHERE action_type = 'scheduled_task'",
        )
        .fetch_one(&repo.pool.reader)
        .await
        .unwrap();
        assert_eq!(count, 1);

        let err = repo
            .record_task_run(&Uuid::now_v7(), ran_at, next, &usage)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_workflow_task_removed_with_workflow() {
        let pool = test_pool().await;
        let workflows = SqliteWorkflowRepository::new(pool.clone());
        let repo = SqliteScheduleRepository::new(pool);

        let spec: WorkflowSpec = serde_json::from_value(json!({
            "name": "digest",
            "steps": [{"name": "Wait", "type": "delay", "duration": 10}]
        }))
        .unwrap();
        let wf = spec.into_workflow("alice");
        workflows.save_workflow(&wf).await.unwrap();

        let task = ScheduledTask::new(
            "alice",
            "digest",
            TaskType::Workflow,
            "0 0 7 * * *",
            json!({"workflow_id": wf.id}),
        );
        repo.save_task(&task).await.unwrap();

        // A task naming a workflow that does not exist is still stored.
        let orphan = ScheduledTask::new(
            "alice",
            "orphan",
            TaskType::Workflow,
            "0 0 7 * * *",
            json!({"workflow_id": Uuid::now_v7()}),
        );
        repo.save_task(&orphan).await.unwrap();

        workflows.delete_workflow(&wf.id).await.unwrap();
        assert!(repo.get_task(&task.id).await.unwrap().is_none());
        assert!(repo.get_task(&orphan.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_stored_type_loads() {
        let repo = SqliteScheduleRepository::new(test_pool().await);
        let task = reminder("alice", None);
        repo.save_task(&task).await.unwrap();

        sqlx::query("UPDATE scheduled_tasks SET task_type = 'nightly_backup' WHERE id = ?")
            .bind(task.id.to_string())
            .execute(&repo.pool.writer)
            .await
            .unwrap();

        let loaded = repo.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(loaded.task_type, TaskType::Unknown);
    }
}
