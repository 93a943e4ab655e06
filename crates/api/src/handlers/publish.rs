//! Publish queue endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use cadence_core::types::DbId;
use cadence_engine::PublishOutcome;
use cadence_store::models::PublishRecord;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreatePublishRequest {
    pub creative_id: DbId,
}

/// `POST /api/v1/publish/records` - queue a creative for delivery.
pub async fn create_record(
    State(state): State<AppState>,
    Json(input): Json<CreatePublishRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<PublishRecord>>)> {
    let record = state.publish.enqueue(input.creative_id).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: record })))
}

/// `GET /api/v1/publish/records/{id}`
pub async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<PublishRecord>>> {
    let record = state.publish.get(id).await?;
    Ok(Json(DataResponse { data: record }))
}

/// `POST /api/v1/publish/process-next` - claim and deliver the oldest
/// eligible record, if any.
pub async fn process_next(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Value>>> {
    let outcome = state.publish.process_next().await?;
    let data = match outcome {
        PublishOutcome::Idle => json!({ "outcome": "idle" }),
        PublishOutcome::Published(record) => {
            json!({ "outcome": "published", "record": record })
        }
        PublishOutcome::Retrying(record) => {
            json!({ "outcome": "retrying", "record": record })
        }
        PublishOutcome::Exhausted(record) => {
            json!({ "outcome": "exhausted", "record": record })
        }
    };
    Ok(Json(DataResponse { data }))
}
