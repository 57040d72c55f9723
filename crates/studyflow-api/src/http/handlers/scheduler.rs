//! Scheduler trigger endpoint.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde_json::{Value, json};

use crate::http::error::AppError;
use crate::http::extractors::auth::AuthUser;
use crate::state::AppState;

/// POST /api/v1/scheduler/run - Run one scheduler pass now.
///
/// Executes every due task, whoever owns it, and reports how many were
/// attempted. Waits for a pass already in progress to finish first.
pub async fn run_scheduler(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Value>, AppError> {
    let tasks_run = state
        .task_scheduler
        .run_pass(Utc::now())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    tracing::info!(user_id = %auth.user_id, tasks_run, "scheduler pass triggered over HTTP");

    Ok(Json(json!({ "success": true, "tasks_run": tasks_run })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use studyflow_core::service::schedule::NewTask;
    use studyflow_types::schedule::TaskType;

    use crate::state::test_state;

    #[tokio::test]
    async fn empty_pass_reports_zero() {
        let (state, _dir) = test_state().await;
        let auth = AuthUser {
            user_id: "alice".into(),
        };
        let Json(body) = run_scheduler(State(state), auth).await.unwrap();
        assert_eq!(body, json!({"success": true, "tasks_run": 0}));
    }

    #[tokio::test]
    async fn new_tasks_wait_for_their_first_occurrence() {
        let (state, _dir) = test_state().await;
        state
            .schedule_service
            .add_task(
                "alice",
                NewTask {
                    name: "Evening review".into(),
                    description: None,
                    task_type: TaskType::Reminder,
                    schedule: "daily".into(),
                    parameters: json!({"message": "Review notes"}),
                },
            )
            .await
            .unwrap();

        let auth = AuthUser {
            user_id: "alice".into(),
        };
        let Json(body) = run_scheduler(State(state), auth).await.unwrap();
        assert_eq!(body["tasks_run"], 0);
    }
}
