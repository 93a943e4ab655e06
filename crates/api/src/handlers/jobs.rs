//! Recurring-job management endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use cadence_core::types::DbId;
use cadence_store::models::{AutoTask, JobExecution, NewAutoTask};
use serde::Deserialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub theme_id: Option<DbId>,
}

#[derive(Debug, Deserialize)]
pub struct ListExecutionsQuery {
    pub auto_task_id: Option<DbId>,
    pub limit: Option<i64>,
}

const DEFAULT_EXECUTION_LIMIT: i64 = 50;
const MAX_EXECUTION_LIMIT: i64 = 100;

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DEFAULT_EXECUTION_LIMIT)
        .clamp(1, MAX_EXECUTION_LIMIT)
}

/// `POST /api/v1/jobs` - register a recurring job.
pub async fn create_job(
    State(state): State<AppState>,
    Json(input): Json<NewAutoTask>,
) -> AppResult<(StatusCode, Json<DataResponse<AutoTask>>)> {
    let task = state.scheduler.create_job(&input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: task })))
}

/// `GET /api/v1/jobs` - list jobs, optionally filtered by theme.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> AppResult<Json<DataResponse<Vec<AutoTask>>>> {
    let tasks = state.scheduler.list_jobs(query.theme_id).await?;
    Ok(Json(DataResponse { data: tasks }))
}

/// `GET /api/v1/jobs/{id}`
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<AutoTask>>> {
    let task = state.scheduler.get_job(id).await?;
    Ok(Json(DataResponse { data: task }))
}

/// `POST /api/v1/jobs/{id}/trigger` - run a job now, outside its
/// schedule. Returns 409 when an execution is already in flight.
pub async fn trigger_job(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<(StatusCode, Json<DataResponse<JobExecution>>)> {
    let execution = state.scheduler.trigger_job(id).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: execution })))
}

/// `POST /api/v1/jobs/{id}/pause`
pub async fn pause_job(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<AutoTask>>> {
    let task = state.scheduler.pause_job(id).await?;
    Ok(Json(DataResponse { data: task }))
}

/// `POST /api/v1/jobs/{id}/resume` - reactivate a paused job. The next
/// run is computed from now, not from the missed window.
pub async fn resume_job(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<AutoTask>>> {
    let task = state.scheduler.resume_job(id).await?;
    Ok(Json(DataResponse { data: task }))
}

/// `GET /api/v1/jobs/{id}/executions`
pub async fn list_job_executions(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(query): Query<ListExecutionsQuery>,
) -> AppResult<Json<DataResponse<Vec<JobExecution>>>> {
    // 404 for unknown jobs rather than an empty list.
    state.scheduler.get_job(id).await?;
    let executions = state
        .scheduler
        .list_executions(Some(id), clamp_limit(query.limit))
        .await?;
    Ok(Json(DataResponse { data: executions }))
}

/// `GET /api/v1/executions` - ledger-wide execution history.
pub async fn list_executions(
    State(state): State<AppState>,
    Query(query): Query<ListExecutionsQuery>,
) -> AppResult<Json<DataResponse<Vec<JobExecution>>>> {
    let executions = state
        .scheduler
        .list_executions(query.auto_task_id, clamp_limit(query.limit))
        .await?;
    Ok(Json(DataResponse { data: executions }))
}
