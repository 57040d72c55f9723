//! Scheduled task management service.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use studyflow_types::error::{RepositoryError, ScheduleError};
use studyflow_types::schedule::{ScheduledTask, TaskType};

use crate::repository::schedule::ScheduleRepository;
use crate::repository::workflow::WorkflowRepository;
use crate::workflow::scheduler::{next_run_after, validate_schedule};

/// What a caller supplies to create a scheduled task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub name: String,
    pub description: Option<String>,
    pub task_type: TaskType,
    pub schedule: String,
    pub parameters: Value,
}

pub struct ScheduleService<R: WorkflowRepository, S: ScheduleRepository> {
    workflows: Arc<R>,
    tasks: Arc<S>,
}

impl<R: WorkflowRepository, S: ScheduleRepository> ScheduleService<R, S> {
    pub fn new(workflows: Arc<R>, tasks: Arc<S>) -> Self {
        Self { workflows, tasks }
    }

    /// Validate and store a task. Its first run is the next occurrence of
    /// its schedule.
    pub async fn add_task(&self, user_id: &str, new: NewTask) -> Result<ScheduledTask, ScheduleError> {
        if new.name.trim().is_empty() {
            return Err(ScheduleError::Invalid("name must not be empty".to_string()));
        }
        if new.task_type == TaskType::Unknown {
            return Err(ScheduleError::Invalid("unknown task type".to_string()));
        }
        validate_schedule(&new.schedule).map_err(|e| ScheduleError::Invalid(e.to_string()))?;

        let parameters = if new.parameters.is_null() {
            Value::Object(Default::default())
        } else if new.parameters.is_object() {
            new.parameters
        } else {
            return Err(ScheduleError::Invalid(
                "parameters must be a JSON object".to_string(),
            ));
        };

        let mut task = ScheduledTask::new(user_id, new.name, new.task_type, new.schedule, parameters);
        task.description = new.description;

        if task.task_type == TaskType::Workflow {
            let workflow_id = task.workflow_id().ok_or_else(|| {
                ScheduleError::Invalid("workflow tasks need a workflow_id parameter".to_string())
            })?;
            let owned = self
                .workflows
                .get_workflow(&workflow_id)
                .await
                .map_err(storage)?
                .is_some_and(|w| w.user_id == user_id);
            if !owned {
                return Err(ScheduleError::Invalid(format!(
                    "workflow {workflow_id} not found"
                )));
            }
        }

        task.next_run_at = Some(next_run_after(&task.schedule, Utc::now()));
        self.tasks.save_task(&task).await.map_err(storage)?;

        tracing::info!(task_id = %task.id, task_type = %task.task_type, schedule = %task.schedule, "scheduled task added");
        Ok(task)
    }

    pub async fn list_tasks(&self, user_id: &str) -> Result<Vec<ScheduledTask>, ScheduleError> {
        self.tasks.list_tasks(Some(user_id)).await.map_err(storage)
    }

    pub async fn get_task(&self, user_id: &str, id: &Uuid) -> Result<ScheduledTask, ScheduleError> {
        self.tasks
            .get_task(id)
            .await
            .map_err(storage)?
            .filter(|t| t.user_id == user_id)
            .ok_or(ScheduleError::NotFound)
    }

    pub async fn remove_task(&self, user_id: &str, id: &Uuid) -> Result<(), ScheduleError> {
        let task = self.get_task(user_id, id).await?;
        if !self.tasks.delete_task(&task.id).await.map_err(storage)? {
            return Err(ScheduleError::NotFound);
        }
        tracing::info!(task_id = %task.id, "scheduled task removed");
        Ok(())
    }
}

fn storage(err: RepositoryError) -> ScheduleError {
    match err {
        RepositoryError::NotFound => ScheduleError::NotFound,
        other => ScheduleError::StorageError(other.to_string()),
    }
}
