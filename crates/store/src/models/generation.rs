//! GenerationTask entity: one fire-and-poll generation request.

use cadence_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `generation_tasks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GenerationTask {
    pub id: DbId,
    pub prompt: String,
    pub model: String,
    pub topic_id: Option<DbId>,
    pub template_key: Option<String>,
    pub status: String,
    /// Identifier of the stored artifact, set on completion.
    pub result_asset_id: Option<String>,
    /// Creative produced from the artifact, set on completion.
    pub creative_id: Option<DbId>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for enqueueing a generation request.
#[derive(Debug, Clone, Deserialize)]
pub struct NewGenerationTask {
    pub prompt: String,
    pub model: String,
    pub topic_id: Option<DbId>,
    pub template_key: Option<String>,
}
