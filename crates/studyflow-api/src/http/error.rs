//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use studyflow_core::workflow::executor::ExecutorError;
use studyflow_types::error::{ScheduleError, WorkflowError};

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Workflow management errors.
    Workflow(WorkflowError),
    /// Scheduled task management errors.
    Schedule(ScheduleError),
    /// Execution errors from the step interpreter.
    Executor(ExecutorError),
    /// Authentication failure.
    Unauthorized(String),
    /// Generic internal error.
    Internal(String),
}

impl From<WorkflowError> for AppError {
    fn from(e: WorkflowError) -> Self {
        AppError::Workflow(e)
    }
}

impl From<ScheduleError> for AppError {
    fn from(e: ScheduleError) -> Self {
        AppError::Schedule(e)
    }
}

impl From<ExecutorError> for AppError {
    fn from(e: ExecutorError) -> Self {
        AppError::Executor(e)
    }
}

impl AppError {
    /// Status code, machine-readable code and message for the envelope.
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Workflow(WorkflowError::NotFound) => {
                (StatusCode::NOT_FOUND, "WORKFLOW_NOT_FOUND", "Workflow not found".to_string())
            }
            AppError::Workflow(WorkflowError::Invalid(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Workflow(e) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "WORKFLOW_ERROR", e.to_string())
            }
            AppError::Schedule(ScheduleError::NotFound) => {
                (StatusCode::NOT_FOUND, "TASK_NOT_FOUND", "Scheduled task not found".to_string())
            }
            AppError::Schedule(ScheduleError::Invalid(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Schedule(e) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "SCHEDULE_ERROR", e.to_string())
            }
            AppError::Executor(ExecutorError::NotFound) => {
                (StatusCode::NOT_FOUND, "WORKFLOW_NOT_FOUND", "Workflow not found".to_string())
            }
            AppError::Executor(ExecutorError::RunNotFound(id)) => (
                StatusCode::NOT_FOUND,
                "RUN_NOT_ACTIVE",
                format!("Run {id} is not executing"),
            ),
            AppError::Executor(e @ ExecutorError::Disabled) => {
                (StatusCode::CONFLICT, "WORKFLOW_DISABLED", e.to_string())
            }
            AppError::Executor(e @ ExecutorError::AlreadyRunning(_)) => {
                (StatusCode::CONFLICT, "ALREADY_RUNNING", e.to_string())
            }
            AppError::Executor(e @ ExecutorError::Cancelled) => {
                (StatusCode::CONFLICT, "WORKFLOW_CANCELLED", e.to_string())
            }
            AppError::Executor(
                e @ (ExecutorError::WorkflowTimeout | ExecutorError::StepTimeout { .. }),
            ) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT", e.to_string()),
            AppError::Executor(e @ ExecutorError::StepFailure { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STEP_FAILED", e.to_string())
            }
            AppError::Executor(e) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "EXECUTION_ERROR", e.to_string())
            }
            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
            }
            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        if status.is_server_error() {
            tracing::error!(code, %message, "request failed");
        }

        let body = ApiResponse::error(code, &message, Uuid::now_v7().to_string(), 0);
        (status, Json(body)).into_response()
    }
}
