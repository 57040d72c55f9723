//! Scheduled task types.
//!
//! A `ScheduledTask` is what the scheduler trigger scans. Workflow tasks point
//! at a workflow through `parameters.workflow_id`; the other task types only
//! produce placeholder results.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of work a scheduled task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Workflow,
    Reminder,
    DataSync,
    /// A stored type this build does not know about.
    #[serde(other)]
    Unknown,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Workflow => "workflow",
            TaskType::Reminder => "reminder",
            TaskType::DataSync => "data_sync",
            TaskType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "workflow" => Ok(TaskType::Workflow),
            "reminder" => Ok(TaskType::Reminder),
            "data_sync" => Ok(TaskType::DataSync),
            other => Err(format!(
                "unknown task type '{other}' (expected workflow, reminder or data_sync)"
            )),
        }
    }
}

/// A persisted schedule entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub task_type: TaskType,
    /// Free-form JSON object; merged into placeholder results.
    pub parameters: serde_json::Value,
    pub schedule: String,
    pub enabled: bool,
    /// `None` means due immediately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledTask {
    /// Create an enabled task that is due immediately.
    pub fn new(
        user_id: impl Into<String>,
        name: impl Into<String>,
        task_type: TaskType,
        schedule: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id: user_id.into(),
            name: name.into(),
            description: None,
            task_type,
            parameters,
            schedule: schedule.into(),
            enabled: true,
            next_run_at: None,
            last_run_at: None,
            created_at: Utc::now(),
        }
    }

    /// The workflow this task targets, read from `parameters.workflow_id`
    /// (or the legacy `workflowId`).
    pub fn workflow_id(&self) -> Option<Uuid> {
        self.parameters
            .get("workflow_id")
            .or_else(|| self.parameters.get("workflowId"))
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
    }

    /// Whether the task should run at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_run_at.is_none_or(|t| t <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn task_type_round_trips_through_str() {
        for t in [TaskType::Workflow, TaskType::Reminder, TaskType::DataSync] {
            assert_eq!(t.as_str().parse::<TaskType>().unwrap(), t);
        }
        assert!("nightly_backup".parse::<TaskType>().is_err());
    }

    #[test]
    fn unknown_stored_task_type_deserializes() {
        let t: TaskType = serde_json::from_value(json!("nightly_backup")).unwrap();
        assert_eq!(t, TaskType::Unknown);
    }

    #[test]
    fn workflow_id_reads_both_key_styles() {
        let id = Uuid::now_v7();
        let snake = ScheduledTask::new(
            "alice",
            "digest",
            TaskType::Workflow,
            "daily",
            json!({"workflow_id": id.to_string()}),
        );
        assert_eq!(snake.workflow_id(), Some(id));

        let camel = ScheduledTask::new(
            "alice",
            "digest",
            TaskType::Workflow,
            "daily",
            json!({"workflowId": id.to_string()}),
        );
        assert_eq!(camel.workflow_id(), Some(id));

        let missing =
            ScheduledTask::new("alice", "digest", TaskType::Workflow, "daily", json!({}));
        assert_eq!(missing.workflow_id(), None);
    }

    #[test]
    fn due_when_next_run_is_null_or_past() {
        let now = Utc::now();
        let mut task =
            ScheduledTask::new("alice", "ping", TaskType::Reminder, "hourly", json!({}));
        assert!(task.is_due(now));

        task.next_run_at = Some(now - Duration::minutes(1));
        assert!(task.is_due(now));

        task.next_run_at = Some(now + Duration::minutes(1));
        assert!(!task.is_due(now));

        task.next_run_at = None;
        task.enabled = false;
        assert!(!task.is_due(now));
    }
}
