//! Image download queue endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use cadence_core::types::DbId;
use cadence_store::models::{ImageDownloadQueueItem, ImageQueueStats};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EnqueueImagesRequest {
    pub creative_id: Option<DbId>,
    /// Comma- or newline-separated URL list. Invalid entries are
    /// skipped, not rejected.
    pub media_urls: String,
}

/// `POST /api/v1/images/enqueue`
pub async fn enqueue(
    State(state): State<AppState>,
    Json(input): Json<EnqueueImagesRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<Vec<ImageDownloadQueueItem>>>)> {
    let items = state
        .images
        .enqueue(input.creative_id, &input.media_urls)
        .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: items })))
}

/// `POST /api/v1/images/process-batch` - claim and download one batch.
pub async fn process_batch(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Value>>> {
    let report = state.images.process_batch().await?;
    Ok(Json(DataResponse {
        data: json!({
            "claimed": report.claimed,
            "downloaded": report.downloaded,
            "failed": report.failed,
            "requeued": report.requeued,
        }),
    }))
}

/// `GET /api/v1/images/stats`
pub async fn stats(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<ImageQueueStats>>> {
    let stats = state.images.stats().await?;
    Ok(Json(DataResponse { data: stats }))
}
