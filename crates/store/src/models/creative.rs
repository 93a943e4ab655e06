//! Creative entity: a finished piece of content ready for publication.

use cadence_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `creatives` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Creative {
    pub id: DbId,
    pub theme_id: Option<DbId>,
    pub title: String,
    pub content: String,
    /// Comma-separated tag list.
    pub tags: String,
    /// Comma/newline-separated source image URLs referenced by the content.
    pub media_urls: String,
    pub status: String,
    pub created_at: Timestamp,
}

/// DTO for creating a Creative from a completed generation artifact.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCreative {
    pub theme_id: Option<DbId>,
    pub title: String,
    pub content: String,
    pub tags: String,
    pub media_urls: String,
    pub status: String,
}
