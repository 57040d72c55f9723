//! Append-only usage analytics events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::schedule::TaskType;

pub const WORKFLOW_EXECUTION: &str = "workflow_execution";
pub const SCHEDULED_TASK: &str = "scheduled_task";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    pub id: Uuid,
    pub user_id: String,
    pub action_type: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl UsageEvent {
    pub fn new(
        user_id: impl Into<String>,
        action_type: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id: user_id.into(),
            action_type: action_type.into(),
            metadata,
            created_at: Utc::now(),
        }
    }

    /// Recorded once per successful workflow execution.
    pub fn workflow_execution(user_id: &str, workflow_id: Uuid, steps: usize) -> Self {
        Self::new(
            user_id,
            WORKFLOW_EXECUTION,
            json!({ "workflow_id": workflow_id, "steps": steps }),
        )
    }

    /// Recorded once per scheduled task run, whatever its result.
    pub fn scheduled_task(
        user_id: &str,
        task_id: Uuid,
        task_type: TaskType,
        result: serde_json::Value,
    ) -> Self {
        Self::new(
            user_id,
            SCHEDULED_TASK,
            json!({ "task_id": task_id, "task_type": task_type, "result": result }),
        )
    }
}
