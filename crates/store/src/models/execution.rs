//! JobExecution entity: one concrete run instance of an AutoTask.

use cadence_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `job_executions` table.
///
/// The terminal transition is write-once: once `status` leaves `running`
/// the row is never mutated again. A partial unique index guarantees at
/// most one running execution per `auto_task_id`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JobExecution {
    pub id: DbId,
    pub auto_task_id: DbId,
    /// `scheduled` or `manual`.
    pub trigger: String,
    pub status: String,
    pub started_at: Timestamp,
    pub finished_at: Option<Timestamp>,
    pub result_summary: Option<String>,
    pub error: Option<String>,
}
