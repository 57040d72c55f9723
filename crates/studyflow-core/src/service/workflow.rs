//! Workflow management service.
//!
//! Every operation is scoped to a user: workflows and runs owned by someone
//! else are reported as not found. Saving a workflow with a schedule keeps
//! its linked scheduled task (same ID as the workflow) in sync.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use studyflow_types::error::{RepositoryError, WorkflowError};
use studyflow_types::schedule::{ScheduledTask, TaskType};
use studyflow_types::workflow::{RunRecord, Workflow, WorkflowSpec};

use crate::repository::schedule::ScheduleRepository;
use crate::repository::workflow::WorkflowRepository;
use crate::workflow::definition::{validate_spec, DefinitionError};
use crate::workflow::scheduler::next_run_after;

/// Default page size for run history.
pub const DEFAULT_RUN_LIMIT: u32 = 20;

/// Service orchestrating the workflow lifecycle.
pub struct WorkflowService<R: WorkflowRepository, S: ScheduleRepository> {
    workflows: Arc<R>,
    tasks: Arc<S>,
}

impl<R: WorkflowRepository, S: ScheduleRepository> WorkflowService<R, S> {
    pub fn new(workflows: Arc<R>, tasks: Arc<S>) -> Self {
        Self { workflows, tasks }
    }

    /// Validate and store a new workflow owned by `user_id`.
    pub async fn create_workflow(
        &self,
        user_id: &str,
        spec: WorkflowSpec,
    ) -> Result<Workflow, WorkflowError> {
        validate_spec(&spec).map_err(invalid)?;

        let workflow = spec.into_workflow(user_id);
        self.workflows
            .save_workflow(&workflow)
            .await
            .map_err(storage)?;
        self.sync_linked_task(&workflow).await?;

        tracing::info!(workflow_id = %workflow.id, name = %workflow.name, user_id, "workflow created");
        Ok(workflow)
    }

    /// Replace the authored fields of an existing workflow.
    pub async fn update_workflow(
        &self,
        user_id: &str,
        id: &Uuid,
        spec: WorkflowSpec,
    ) -> Result<Workflow, WorkflowError> {
        validate_spec(&spec).map_err(invalid)?;

        let mut workflow = self.get_workflow(user_id, id).await?;
        spec.apply_to(&mut workflow);
        self.workflows
            .save_workflow(&workflow)
            .await
            .map_err(storage)?;
        self.sync_linked_task(&workflow).await?;

        tracing::info!(workflow_id = %workflow.id, "workflow updated");
        Ok(workflow)
    }

    pub async fn set_enabled(
        &self,
        user_id: &str,
        id: &Uuid,
        enabled: bool,
    ) -> Result<Workflow, WorkflowError> {
        let mut workflow = self.get_workflow(user_id, id).await?;
        if workflow.enabled == enabled {
            return Ok(workflow);
        }

        workflow.enabled = enabled;
        workflow.updated_at = Utc::now();
        self.workflows
            .save_workflow(&workflow)
            .await
            .map_err(storage)?;
        self.sync_linked_task(&workflow).await?;

        tracing::info!(workflow_id = %workflow.id, enabled, "workflow toggled");
        Ok(workflow)
    }

    pub async fn get_workflow(&self, user_id: &str, id: &Uuid) -> Result<Workflow, WorkflowError> {
        self.workflows
            .get_workflow(id)
            .await
            .map_err(storage)?
            .filter(|w| w.user_id == user_id)
            .ok_or(WorkflowError::NotFound)
    }

    pub async fn list_workflows(&self, user_id: &str) -> Result<Vec<Workflow>, WorkflowError> {
        self.workflows
            .list_workflows(user_id)
            .await
            .map_err(storage)
    }

    /// Delete a workflow and its linked task. Run records are kept.
    pub async fn delete_workflow(&self, user_id: &str, id: &Uuid) -> Result<(), WorkflowError> {
        let workflow = self.get_workflow(user_id, id).await?;

        self.tasks
            .delete_task(&workflow.id)
            .await
            .map_err(storage)?;
        if !self
            .workflows
            .delete_workflow(&workflow.id)
            .await
            .map_err(storage)?
        {
            return Err(WorkflowError::NotFound);
        }

        tracing::info!(workflow_id = %workflow.id, "workflow deleted");
        Ok(())
    }

    /// Most recent runs of one of the user's workflows.
    pub async fn list_runs(
        &self,
        user_id: &str,
        workflow_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<RunRecord>, WorkflowError> {
        let workflow = self.get_workflow(user_id, workflow_id).await?;
        self.workflows
            .list_runs(&workflow.id, limit)
            .await
            .map_err(storage)
    }

    pub async fn get_run(&self, user_id: &str, run_id: &Uuid) -> Result<RunRecord, WorkflowError> {
        self.workflows
            .get_run(run_id)
            .await
            .map_err(storage)?
            .filter(|r| r.user_id == user_id)
            .ok_or(WorkflowError::NotFound)
    }

    /// Create, update or remove the scheduled task linked to `workflow`.
    async fn sync_linked_task(&self, workflow: &Workflow) -> Result<(), WorkflowError> {
        let Some(schedule) = workflow.schedule.as_deref() else {
            if self
                .tasks
                .delete_task(&workflow.id)
                .await
                .map_err(storage)?
            {
                tracing::debug!(workflow_id = %workflow.id, "removed linked schedule");
            }
            return Ok(());
        };

        let existing = self.tasks.get_task(&workflow.id).await.map_err(storage)?;
        let next_run_at = match &existing {
            Some(task) if task.schedule == schedule && task.next_run_at.is_some() => {
                task.next_run_at
            }
            _ => Some(next_run_after(schedule, Utc::now())),
        };

        let task = ScheduledTask {
            id: workflow.id,
            user_id: workflow.user_id.clone(),
            name: workflow.name.clone(),
            description: workflow.description.clone(),
            task_type: TaskType::Workflow,
            parameters: json!({ "workflow_id": workflow.id }),
            schedule: schedule.to_string(),
            enabled: workflow.enabled,
            next_run_at,
            last_run_at: existing.as_ref().and_then(|t| t.last_run_at),
            created_at: existing.as_ref().map_or(workflow.created_at, |t| t.created_at),
        };

        self.tasks.save_task(&task).await.map_err(storage)?;
        tracing::debug!(workflow_id = %workflow.id, schedule, "synced linked schedule");
        Ok(())
    }
}

fn invalid(err: DefinitionError) -> WorkflowError {
    match err {
        DefinitionError::ValidationError(msg) | DefinitionError::ParseError(msg) => {
            WorkflowError::Invalid(msg)
        }
        other => WorkflowError::Invalid(other.to_string()),
    }
}

fn storage(err: RepositoryError) -> WorkflowError {
    match err {
        RepositoryError::NotFound => WorkflowError::NotFound,
        other => WorkflowError::StorageError(other.to_string()),
    }
}
