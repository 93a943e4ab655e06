//! The durable-store abstraction.
//!
//! Every queue and scheduler component talks to the store through the
//! [`Ledger`] trait. The Postgres implementation ([`crate::PgLedger`])
//! backs production; the in-memory implementation ([`crate::MemLedger`])
//! backs tests and single-process embedding.
//!
//! Claim methods (`claim_execution`, `claim_next_publish_record`,
//! `claim_image_batch`) are atomic compare-and-set operations: when two
//! callers race, exactly one observes the row.

use async_trait::async_trait;
use cadence_core::types::{DbId, Timestamp};
use thiserror::Error;

use crate::models::{
    AutoTask, Creative, GenerationTask, ImageDownloadQueueItem, ImageQueueStats, JobExecution,
    NewAutoTask, NewCreative, NewGenerationTask, NewImageDownload, PublishRecord,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    /// A conditional update found the row in a state that forbids the
    /// transition (for example finishing an execution twice).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistent state shared by the scheduler and the three queues.
///
/// All mutating methods are durable before they return. Methods that
/// enforce a state precondition return [`StoreError::Conflict`] when it
/// does not hold, never silently overwrite.
#[async_trait]
pub trait Ledger: Send + Sync + 'static {
    // ------------------------------------------------------------------
    // Auto tasks
    // ------------------------------------------------------------------

    /// Insert a task. `next_run_at` is computed by the caller from the
    /// schedule expression; validation of the expression also happens
    /// before this call.
    async fn create_auto_task(
        &self,
        task: &NewAutoTask,
        next_run_at: Timestamp,
    ) -> StoreResult<AutoTask>;

    async fn get_auto_task(&self, id: DbId) -> StoreResult<AutoTask>;

    async fn list_auto_tasks(&self) -> StoreResult<Vec<AutoTask>>;

    /// Active tasks whose `next_run_at <= now`, ordered by `next_run_at`.
    async fn due_auto_tasks(&self, now: Timestamp) -> StoreResult<Vec<AutoTask>>;

    /// Move `next_run_at` forward after a run was dispatched or skipped.
    async fn reschedule_auto_task(&self, id: DbId, next_run_at: Timestamp) -> StoreResult<()>;

    /// Bump run counters for a successful run and clear the consecutive
    /// failure streak.
    async fn record_task_success(&self, id: DbId, ran_at: Timestamp) -> StoreResult<AutoTask>;

    /// Bump run counters for a failed run and extend the failure streak.
    /// Returns the updated row so the caller can apply auto-pause.
    async fn record_task_failure(&self, id: DbId, ran_at: Timestamp) -> StoreResult<AutoTask>;

    /// Set `active` / `paused`. Pausing never touches in-flight executions.
    async fn set_auto_task_status(&self, id: DbId, status: &str) -> StoreResult<AutoTask>;

    /// Earliest `next_run_at` over active tasks, if any.
    async fn next_due_at(&self) -> StoreResult<Option<Timestamp>>;

    // ------------------------------------------------------------------
    // Job executions
    // ------------------------------------------------------------------

    /// Atomically open a `running` execution for the task, unless one is
    /// already running. Returns `None` when the task is occupied; the
    /// caller treats that as an overlap skip, not an error.
    async fn claim_execution(
        &self,
        auto_task_id: DbId,
        trigger: &str,
        now: Timestamp,
    ) -> StoreResult<Option<JobExecution>>;

    /// Write-once terminal transition. `status` must be a terminal
    /// execution status; fails with `Conflict` if the row already left
    /// `running`.
    async fn finish_execution(
        &self,
        id: DbId,
        status: &str,
        result_summary: Option<&str>,
        error: Option<&str>,
        finished_at: Timestamp,
    ) -> StoreResult<JobExecution>;

    async fn running_execution_count(&self) -> StoreResult<i64>;

    /// Recent executions, newest first, optionally filtered by task.
    async fn list_executions(
        &self,
        auto_task_id: Option<DbId>,
        limit: i64,
    ) -> StoreResult<Vec<JobExecution>>;

    // ------------------------------------------------------------------
    // Generation queue
    // ------------------------------------------------------------------

    async fn create_generation_task(
        &self,
        task: &NewGenerationTask,
    ) -> StoreResult<GenerationTask>;

    async fn get_generation_task(&self, id: DbId) -> StoreResult<GenerationTask>;

    /// Atomically move the oldest `queued` task to `processing`.
    async fn claim_next_generation_task(&self) -> StoreResult<Option<GenerationTask>>;

    /// `processing` -> `completed` with the artifact and creative refs.
    async fn complete_generation_task(
        &self,
        id: DbId,
        result_asset_id: &str,
        creative_id: Option<DbId>,
    ) -> StoreResult<GenerationTask>;

    /// `processing` -> `failed` with the error message.
    async fn fail_generation_task(&self, id: DbId, error: &str) -> StoreResult<GenerationTask>;

    // ------------------------------------------------------------------
    // Creatives
    // ------------------------------------------------------------------

    async fn create_creative(&self, creative: &NewCreative) -> StoreResult<Creative>;

    async fn get_creative(&self, id: DbId) -> StoreResult<Creative>;

    // ------------------------------------------------------------------
    // Publish queue
    // ------------------------------------------------------------------

    /// Open a `pending` record for the creative.
    async fn create_publish_record(&self, creative_id: DbId) -> StoreResult<PublishRecord>;

    async fn get_publish_record(&self, id: DbId) -> StoreResult<PublishRecord>;

    /// Atomically claim the oldest eligible `pending` record, moving it
    /// to `publishing`. A record is eligible when `next_attempt_at` is
    /// null or `<= now`.
    async fn claim_next_publish_record(
        &self,
        now: Timestamp,
    ) -> StoreResult<Option<PublishRecord>>;

    /// `publishing` -> `published` with the remote note id.
    async fn mark_published(
        &self,
        id: DbId,
        note_id: Option<&str>,
        published_at: Timestamp,
    ) -> StoreResult<PublishRecord>;

    /// Record a failed attempt. `next_attempt_at = None` together with a
    /// terminal decision by the caller means `status` goes to `failed`;
    /// otherwise the record returns to `pending` with the cool-down set.
    async fn record_publish_failure(
        &self,
        id: DbId,
        error: &str,
        attempted_at: Timestamp,
        next_attempt_at: Option<Timestamp>,
        terminal: bool,
    ) -> StoreResult<PublishRecord>;

    // ------------------------------------------------------------------
    // Image download queue
    // ------------------------------------------------------------------

    /// Insert pending items; duplicates of (creative_id, url) pairs that
    /// already exist are skipped. Returns the rows actually inserted.
    async fn enqueue_images(
        &self,
        items: &[NewImageDownload],
    ) -> StoreResult<Vec<ImageDownloadQueueItem>>;

    /// Atomically move up to `limit` of the oldest `pending` items to
    /// `downloading` and return them.
    async fn claim_image_batch(&self, limit: i64) -> StoreResult<Vec<ImageDownloadQueueItem>>;

    /// `downloading` -> `done`.
    async fn complete_image(&self, id: DbId) -> StoreResult<ImageDownloadQueueItem>;

    /// Record a failed download attempt. When `terminal` the item goes to
    /// `failed`, otherwise back to `pending` for a later batch.
    async fn fail_image(
        &self,
        id: DbId,
        error: &str,
        terminal: bool,
    ) -> StoreResult<ImageDownloadQueueItem>;

    async fn image_queue_stats(&self) -> StoreResult<ImageQueueStats>;
}
