//! Generation queue endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use cadence_core::types::DbId;
use cadence_store::models::{GenerationTask, NewGenerationTask};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// `POST /api/v1/generation/tasks` - queue a generation request.
/// Identical payloads always create independent tasks.
pub async fn create_task(
    State(state): State<AppState>,
    Json(input): Json<NewGenerationTask>,
) -> AppResult<(StatusCode, Json<DataResponse<GenerationTask>>)> {
    let task = state.generation.enqueue(&input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: task })))
}

/// `GET /api/v1/generation/tasks/{id}`
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<GenerationTask>>> {
    let task = state.generation.get(id).await?;
    Ok(Json(DataResponse { data: task }))
}
