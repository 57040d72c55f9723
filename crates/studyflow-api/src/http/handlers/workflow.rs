//! Workflow CRUD and execution handlers for the REST API.
//!
//! Every handler acts as the authenticated user: workflows and runs owned by
//! someone else answer 404.

use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use studyflow_core::service::workflow::DEFAULT_RUN_LIMIT;
use studyflow_core::workflow::executor::WorkflowExecutor;
use studyflow_types::workflow::{RunRecord, Workflow, WorkflowSpec};

use crate::http::error::AppError;
use crate::http::extractors::auth::AuthUser;
use crate::http::response::ApiResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

/// Query parameters for listing workflow runs.
#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    /// Maximum number of runs to return.
    #[serde(default = "default_run_limit")]
    pub limit: u32,
}

fn default_run_limit() -> u32 {
    DEFAULT_RUN_LIMIT
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the workflow sub-router. Mounted at `/api/v1` by the main router.
pub fn workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/workflows", post(create_workflow).get(list_workflows))
        .route(
            "/workflows/{id}",
            get(get_workflow).put(update_workflow).delete(delete_workflow),
        )
        .route("/workflows/{id}/execute", post(execute_workflow))
        .route("/workflows/{id}/runs", get(list_runs))
        .route("/runs/{run_id}", get(get_run))
        .route("/runs/{run_id}/cancel", post(cancel_run))
}

fn request_meta() -> (Instant, String) {
    (Instant::now(), Uuid::now_v7().to_string())
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

// ---------------------------------------------------------------------------
// Workflow CRUD handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/workflows - Create a workflow.
pub async fn create_workflow(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(spec): Json<WorkflowSpec>,
) -> Result<Json<ApiResponse<Workflow>>, AppError> {
    let (start, request_id) = request_meta();

    let workflow = state
        .workflow_service
        .create_workflow(&auth.user_id, spec)
        .await?;

    let link = format!("/api/v1/workflows/{}", workflow.id);
    Ok(Json(
        ApiResponse::success(workflow, request_id, elapsed_ms(start)).with_link("self", &link),
    ))
}

/// GET /api/v1/workflows - List the caller's workflows.
pub async fn list_workflows(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<Workflow>>>, AppError> {
    let (start, request_id) = request_meta();

    let workflows = state.workflow_service.list_workflows(&auth.user_id).await?;

    Ok(Json(
        ApiResponse::success(workflows, request_id, elapsed_ms(start))
            .with_link("self", "/api/v1/workflows"),
    ))
}

/// GET /api/v1/workflows/{id}
pub async fn get_workflow(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Workflow>>, AppError> {
    let (start, request_id) = request_meta();

    let workflow = state.workflow_service.get_workflow(&auth.user_id, &id).await?;

    let self_link = format!("/api/v1/workflows/{id}");
    let runs_link = format!("/api/v1/workflows/{id}/runs");
    Ok(Json(
        ApiResponse::success(workflow, request_id, elapsed_ms(start))
            .with_link("self", &self_link)
            .with_link("runs", &runs_link),
    ))
}

/// PUT /api/v1/workflows/{id} - Replace a workflow's definition.
pub async fn update_workflow(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(spec): Json<WorkflowSpec>,
) -> Result<Json<ApiResponse<Workflow>>, AppError> {
    let (start, request_id) = request_meta();

    let workflow = state
        .workflow_service
        .update_workflow(&auth.user_id, &id, spec)
        .await?;

    Ok(Json(ApiResponse::success(workflow, request_id, elapsed_ms(start))))
}

/// DELETE /api/v1/workflows/{id}
pub async fn delete_workflow(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let (start, request_id) = request_meta();

    state.workflow_service.delete_workflow(&auth.user_id, &id).await?;

    Ok(Json(ApiResponse::success(
        serde_json::json!({ "deleted": true, "id": id }),
        request_id,
        elapsed_ms(start),
    )))
}

// ---------------------------------------------------------------------------
// Execution and runs
// ---------------------------------------------------------------------------

/// POST /api/v1/workflows/{id}/execute - Run a workflow to completion.
///
/// Responds with the completed run record. A failed run answers with the
/// error envelope carrying the step's message; the run record itself is
/// still stored.
pub async fn execute_workflow(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<RunRecord>>, AppError> {
    let (start, request_id) = request_meta();

    let run = state.interpreter.execute(id, &auth.user_id).await?;

    let link = format!("/api/v1/runs/{}", run.id);
    Ok(Json(
        ApiResponse::success(run, request_id, elapsed_ms(start)).with_link("self", &link),
    ))
}

/// GET /api/v1/workflows/{id}/runs?limit=
pub async fn list_runs(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<ApiResponse<Vec<RunRecord>>>, AppError> {
    let (start, request_id) = request_meta();

    let runs = state
        .workflow_service
        .list_runs(&auth.user_id, &id, query.limit)
        .await?;

    Ok(Json(ApiResponse::success(runs, request_id, elapsed_ms(start))))
}

/// GET /api/v1/runs/{run_id}
pub async fn get_run(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(run_id): Path<Uuid>,
) -> Result<Json<ApiResponse<RunRecord>>, AppError> {
    let (start, request_id) = request_meta();

    let run = state.workflow_service.get_run(&auth.user_id, &run_id).await?;

    Ok(Json(ApiResponse::success(run, request_id, elapsed_ms(start))))
}

/// POST /api/v1/runs/{run_id}/cancel - Signal a run executing in this process.
///
/// The executing request records the failure; this only signals it.
pub async fn cancel_run(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(run_id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let (start, request_id) = request_meta();

    // Ownership check first, so other users' run ids stay opaque.
    state.workflow_service.get_run(&auth.user_id, &run_id).await?;
    state.interpreter.cancel(run_id).await?;

    Ok(Json(ApiResponse::success(
        serde_json::json!({ "cancelled": true, "run_id": run_id }),
        request_id,
        elapsed_ms(start),
    )))
}
