//! Image download queue entities.

use cadence_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `image_download_queue` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ImageDownloadQueueItem {
    pub id: DbId,
    pub creative_id: Option<DbId>,
    pub url: String,
    pub target_path: String,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for enqueueing one image download.
#[derive(Debug, Clone, Deserialize)]
pub struct NewImageDownload {
    pub creative_id: Option<DbId>,
    pub url: String,
    pub target_path: String,
}

/// Per-status item counts; the fields always sum to the total item count.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ImageQueueStats {
    pub pending: i64,
    pub downloading: i64,
    pub done: i64,
    pub failed: i64,
}

impl ImageQueueStats {
    pub fn total(&self) -> i64 {
        self.pending + self.downloading + self.done + self.failed
    }
}
