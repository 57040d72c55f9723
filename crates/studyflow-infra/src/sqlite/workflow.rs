//! SQLite workflow repository implementation.
//!
//! Implements `WorkflowRepository` from `studyflow-core` using sqlx with split
//! read/write pools. Steps and run results are stored as JSON text.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use studyflow_core::repository::workflow::WorkflowRepository;
use studyflow_types::error::RepositoryError;
use studyflow_types::usage::UsageEvent;
use studyflow_types::workflow::{RunRecord, RunResult, RunStatus, Workflow};

use super::pool::DatabasePool;
use super::{
    format_datetime, from_json, insert_usage_event, parse_datetime, parse_uuid, query_err, to_json,
};

/// SQLite-backed implementation of `WorkflowRepository`.
pub struct SqliteWorkflowRepository {
    pool: DatabasePool,
}

impl SqliteWorkflowRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct WorkflowRow {
    id: String,
    user_id: String,
    name: String,
    description: Option<String>,
    enabled: i64,
    schedule: Option<String>,
    timeout_secs: Option<i64>,
    steps: String,
    last_run_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl WorkflowRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            enabled: row.try_get("enabled")?,
            schedule: row.try_get("schedule")?,
            timeout_secs: row.try_get("timeout_secs")?,
            steps: row.try_get("steps")?,
            last_run_at: row.try_get("last_run_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_workflow(self) -> Result<Workflow, RepositoryError> {
        Ok(Workflow {
            id: parse_uuid(&self.id)?,
            user_id: self.user_id,
            name: self.name,
            description: self.description,
            enabled: self.enabled != 0,
            schedule: self.schedule,
            timeout_secs: self.timeout_secs.map(|t| t.max(0) as u64),
            steps: from_json(&self.steps, "steps")?,
            last_run_at: self.last_run_at.as_deref().map(parse_datetime).transpose()?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct RunRow {
    id: String,
    workflow_id: String,
    user_id: String,
    status: String,
    result: Option<String>,
    partial_result: Option<String>,
    error: Option<String>,
    started_at: String,
    completed_at: Option<String>,
}

impl RunRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            user_id: row.try_get("user_id")?,
            status: row.try_get("status")?,
            result: row.try_get("result")?,
            partial_result: row.try_get("partial_result")?,
            error: row.try_get("error")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_run(self) -> Result<RunRecord, RepositoryError> {
        let status = parse_status(&self.status)?;
        Ok(RunRecord {
            id: parse_uuid(&self.id)?,
            workflow_id: parse_uuid(&self.workflow_id)?,
            user_id: self.user_id,
            status,
            result: self
                .result
                .as_deref()
                .map(|s| from_json(s, "run result"))
                .transpose()?,
            partial_result: self
                .partial_result
                .as_deref()
                .map(|s| from_json(s, "partial result"))
                .transpose()?,
            error: self.error,
            started_at: parse_datetime(&self.started_at)?,
            completed_at: self.completed_at.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

fn parse_status(s: &str) -> Result<RunStatus, RepositoryError> {
    match s {
        "running" => Ok(RunStatus::Running),
        "completed" => Ok(RunStatus::Completed),
        "failed" => Ok(RunStatus::Failed),
        other => Err(RepositoryError::Query(format!("invalid run status: {other}"))),
    }
}

fn rows_to_runs(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<RunRecord>, RepositoryError> {
    rows.iter()
        .map(|row| RunRow::from_row(row).map_err(query_err)?.into_run())
        .collect()
}

impl SqliteWorkflowRepository {
    /// Explain why a guarded `UPDATE ... WHERE status = 'running'` touched
    /// nothing.
    async fn not_running_error(
        conn: &mut sqlx::SqliteConnection,
        run_id: &Uuid,
    ) -> RepositoryError {
        let status: Result<Option<(String,)>, _> =
            sqlx::query_as("SELECT status FROM workflow_runs WHERE id = ?")
                .bind(run_id.to_string())
                .fetch_optional(conn)
                .await;

        match status {
            Ok(Some((status,))) => {
                RepositoryError::Conflict(format!("run {run_id} is already {status}"))
            }
            Ok(None) => RepositoryError::NotFound,
            Err(e) => query_err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowRepository impl
// ---------------------------------------------------------------------------

impl WorkflowRepository for SqliteWorkflowRepository {
    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        // last_run_at is only ever advanced by complete_run.
        sqlx::query(
            r#"INSERT INTO workflows
               (id, user_id, name, description, enabled, schedule, timeout_secs, steps,
                last_run_at, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 enabled = excluded.enabled,
                 schedule = excluded.schedule,
                 timeout_secs = excluded.timeout_secs,
                 steps = excluded.steps,
                 updated_at = excluded.updated_at"#,
        )
        .bind(workflow.id.to_string())
        .bind(&workflow.user_id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.enabled as i64)
        .bind(&workflow.schedule)
        .bind(workflow.timeout_secs.map(|t| t as i64))
        .bind(to_json(&workflow.steps)?)
        .bind(workflow.last_run_at.as_ref().map(format_datetime))
        .bind(format_datetime(&workflow.created_at))
        .bind(format_datetime(&workflow.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn get_workflow(&self, id: &Uuid) -> Result<Option<Workflow>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.map(|row| WorkflowRow::from_row(&row).map_err(query_err)?.into_workflow())
            .transpose()
    }

    async fn list_workflows(&self, user_id: &str) -> Result<Vec<Workflow>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM workflows WHERE user_id = ? ORDER BY name ASC")
            .bind(user_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        rows.iter()
            .map(|row| WorkflowRow::from_row(row).map_err(query_err)?.into_workflow())
            .collect()
    }

    async fn delete_workflow(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn create_run(&self, run: &RunRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO workflow_runs
               (id, workflow_id, user_id, status, result, partial_result, error,
                started_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(run.id.to_string())
        .bind(run.workflow_id.to_string())
        .bind(&run.user_id)
        .bind(run.status.as_str())
        .bind(run.result.as_ref().map(to_json).transpose()?)
        .bind(run.partial_result.as_ref().map(to_json).transpose()?)
        .bind(&run.error)
        .bind(format_datetime(&run.started_at))
        .bind(run.completed_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn complete_run(
        &self,
        run_id: &Uuid,
        result: &RunResult,
        completed_at: DateTime<Utc>,
        usage: &UsageEvent,
    ) -> Result<(), RepositoryError> {
        let completed_at = format_datetime(&completed_at);
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let updated = sqlx::query(
            r#"UPDATE workflow_runs
               SET status = 'completed', result = ?, partial_result = NULL, error = NULL,
                   completed_at = ?
               WHERE id = ? AND status = 'running'"#,
        )
        .bind(to_json(result)?)
        .bind(&completed_at)
        .bind(run_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        if updated.rows_affected() == 0 {
            return Err(Self::not_running_error(&mut tx, run_id).await);
        }

        sqlx::query(
            "UPDATE workflows SET last_run_at = ?
             WHERE id = (SELECT workflow_id FROM workflow_runs WHERE id = ?)",
        )
        .bind(&completed_at)
        .bind(run_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        insert_usage_event(&mut tx, usage).await?;

        tx.commit().await.map_err(query_err)?;
        Ok(())
    }

    async fn fail_run(
        &self,
        run_id: &Uuid,
        error: &str,
        partial: &RunResult,
        failed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut conn = self.pool.writer.acquire().await.map_err(query_err)?;

        let updated = sqlx::query(
            r#"UPDATE workflow_runs
               SET status = 'failed', result = NULL, partial_result = ?, error = ?,
                   completed_at = ?
               WHERE id = ? AND status = 'running'"#,
        )
        .bind(to_json(partial)?)
        .bind(error)
        .bind(format_datetime(&failed_at))
        .bind(run_id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(query_err)?;

        if updated.rows_affected() == 0 {
            return Err(Self::not_running_error(&mut conn, run_id).await);
        }
        Ok(())
    }

    async fn get_run(&self, run_id: &Uuid) -> Result<Option<RunRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflow_runs WHERE id = ?")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.map(|row| RunRow::from_row(&row).map_err(query_err)?.into_run())
            .transpose()
    }

    async fn list_runs(
        &self,
        workflow_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<RunRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM workflow_runs WHERE workflow_id = ? ORDER BY started_at DESC LIMIT ?",
        )
        .bind(workflow_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows_to_runs(&rows)
    }

    async fn list_running_runs(&self) -> Result<Vec<RunRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM workflow_runs WHERE status = 'running' ORDER BY started_at ASC",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows_to_runs(&rows)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
