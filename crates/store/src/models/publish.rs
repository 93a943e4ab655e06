//! PublishRecord entity: one delivery attempt chain for a Creative.

use cadence_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `publish_records` table.
///
/// `status = publishing` means the single automation session currently
/// owns this record; the claim that sets it is a conditional update, so
/// only one caller process-wide can hold it.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PublishRecord {
    pub id: DbId,
    pub creative_id: DbId,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<Timestamp>,
    /// Earliest instant the record is claimable again after a retryable
    /// failure. `NULL` means immediately eligible.
    pub next_attempt_at: Option<Timestamp>,
    pub published_at: Option<Timestamp>,
    /// Remote identifier returned by the automation driver on success.
    pub note_id: Option<String>,
    pub created_at: Timestamp,
}
