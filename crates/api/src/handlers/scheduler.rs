//! Scheduler lifecycle endpoints.

use axum::extract::State;
use axum::Json;
use cadence_engine::SchedulerStatus;
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// `GET /api/v1/scheduler/status`
pub async fn get_status(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<SchedulerStatus>>> {
    let status = state.scheduler.get_status().await?;
    Ok(Json(DataResponse { data: status }))
}

/// `POST /api/v1/scheduler/start` - idempotent.
pub async fn start(State(state): State<AppState>) -> Json<DataResponse<Value>> {
    state.scheduler.start().await;
    Json(DataResponse {
        data: json!({ "running": true }),
    })
}

/// `POST /api/v1/scheduler/stop` - idempotent. In-flight executions
/// finish; only the tick loop stops.
pub async fn stop(State(state): State<AppState>) -> Json<DataResponse<Value>> {
    state.scheduler.stop().await;
    Json(DataResponse {
        data: json!({ "running": false }),
    })
}
