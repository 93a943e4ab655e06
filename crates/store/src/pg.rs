//! Postgres [`Ledger`] implementation.
//!
//! Claims use `FOR UPDATE SKIP LOCKED` subselects (or conditional
//! updates guarded by the current status) so concurrent workers never
//! observe the same row twice. Status strings are bound as parameters,
//! never interpolated.

use async_trait::async_trait;
use cadence_core::status;
use cadence_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::ledger::{Ledger, StoreError, StoreResult};
use crate::models::{
    AutoTask, Creative, GenerationTask, ImageDownloadQueueItem, ImageQueueStats, JobExecution,
    NewAutoTask, NewCreative, NewGenerationTask, NewImageDownload, PublishRecord,
};

/// Column list for `auto_tasks` queries.
const TASK_COLUMNS: &str = "\
    id, theme_id, name, schedule, goal, persona, tone, prompt_profile_id, \
    image_model, output_count, min_quality_score, status, last_run_at, \
    next_run_at, total_runs, successful_runs, consecutive_failures, \
    created_at, updated_at";

/// Column list for `job_executions` queries.
const EXECUTION_COLUMNS: &str = "\
    id, auto_task_id, trigger, status, started_at, finished_at, \
    result_summary, error";

/// Column list for `generation_tasks` queries.
const GENERATION_COLUMNS: &str = "\
    id, prompt, model, topic_id, template_key, status, result_asset_id, \
    creative_id, error_message, created_at, updated_at";

/// Column list for `creatives` queries.
const CREATIVE_COLUMNS: &str = "\
    id, theme_id, title, content, tags, media_urls, status, created_at";

/// Column list for `publish_records` queries.
const PUBLISH_COLUMNS: &str = "\
    id, creative_id, status, attempts, last_error, last_attempt_at, \
    next_attempt_at, published_at, note_id, created_at";

/// Column list for `image_download_queue` queries.
const IMAGE_COLUMNS: &str = "\
    id, creative_id, url, target_path, status, attempts, last_error, \
    created_at, updated_at";

/// Partial unique index backing the one-running-execution guarantee.
const ONE_RUNNING_INDEX: &str = "job_executions_one_running_per_task";

pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Distinguish "row missing" from "row in the wrong state" after a
    /// conditional update matched nothing.
    async fn conflict_or_not_found(
        &self,
        table: &str,
        entity: &'static str,
        id: DbId,
        attempted: &str,
    ) -> StoreError {
        let query = format!("SELECT status FROM {table} WHERE id = $1");
        match sqlx::query_scalar::<_, String>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
        {
            Ok(Some(current)) => StoreError::Conflict(format!(
                "{entity} {id} is {current}, cannot {attempted}"
            )),
            Ok(None) => StoreError::NotFound { entity, id },
            Err(err) => StoreError::Database(err),
        }
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn create_auto_task(
        &self,
        task: &NewAutoTask,
        next_run_at: Timestamp,
    ) -> StoreResult<AutoTask> {
        let query = format!(
            "INSERT INTO auto_tasks \
                (theme_id, name, schedule, goal, persona, tone, prompt_profile_id, \
                 image_model, output_count, min_quality_score, status, next_run_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {TASK_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AutoTask>(&query)
            .bind(task.theme_id)
            .bind(&task.name)
            .bind(&task.schedule)
            .bind(&task.config.goal)
            .bind(&task.config.persona)
            .bind(&task.config.tone)
            .bind(task.config.prompt_profile_id)
            .bind(&task.config.image_model)
            .bind(task.config.output_count)
            .bind(task.config.min_quality_score)
            .bind(status::TASK_ACTIVE)
            .bind(next_run_at)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_auto_task(&self, id: DbId) -> StoreResult<AutoTask> {
        let query = format!("SELECT {TASK_COLUMNS} FROM auto_tasks WHERE id = $1");
        sqlx::query_as::<_, AutoTask>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { entity: "auto task", id })
    }

    async fn list_auto_tasks(&self) -> StoreResult<Vec<AutoTask>> {
        let query = format!("SELECT {TASK_COLUMNS} FROM auto_tasks ORDER BY id");
        Ok(sqlx::query_as::<_, AutoTask>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn due_auto_tasks(&self, now: Timestamp) -> StoreResult<Vec<AutoTask>> {
        let query = format!(
            "SELECT {TASK_COLUMNS} FROM auto_tasks \
             WHERE status = $1 AND next_run_at <= $2 \
             ORDER BY next_run_at ASC"
        );
        Ok(sqlx::query_as::<_, AutoTask>(&query)
            .bind(status::TASK_ACTIVE)
            .bind(now)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn reschedule_auto_task(&self, id: DbId, next_run_at: Timestamp) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE auto_tasks SET next_run_at = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(next_run_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { entity: "auto task", id });
        }
        Ok(())
    }

    async fn record_task_success(&self, id: DbId, ran_at: Timestamp) -> StoreResult<AutoTask> {
        let query = format!(
            "UPDATE auto_tasks \
             SET total_runs = total_runs + 1, \
                 successful_runs = successful_runs + 1, \
                 consecutive_failures = 0, \
                 last_run_at = $2, \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {TASK_COLUMNS}"
        );
        sqlx::query_as::<_, AutoTask>(&query)
            .bind(id)
            .bind(ran_at)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { entity: "auto task", id })
    }

    async fn record_task_failure(&self, id: DbId, ran_at: Timestamp) -> StoreResult<AutoTask> {
        let query = format!(
            "UPDATE auto_tasks \
             SET total_runs = total_runs + 1, \
                 consecutive_failures = consecutive_failures + 1, \
                 last_run_at = $2, \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {TASK_COLUMNS}"
        );
        sqlx::query_as::<_, AutoTask>(&query)
            .bind(id)
            .bind(ran_at)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { entity: "auto task", id })
    }

    async fn set_auto_task_status(&self, id: DbId, new_status: &str) -> StoreResult<AutoTask> {
        let query = format!(
            "UPDATE auto_tasks SET status = $2, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {TASK_COLUMNS}"
        );
        sqlx::query_as::<_, AutoTask>(&query)
            .bind(id)
            .bind(new_status)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { entity: "auto task", id })
    }

    async fn next_due_at(&self) -> StoreResult<Option<Timestamp>> {
        let earliest = sqlx::query_scalar::<_, Option<Timestamp>>(
            "SELECT MIN(next_run_at) FROM auto_tasks WHERE status = $1",
        )
        .bind(status::TASK_ACTIVE)
        .fetch_one(&self.pool)
        .await?;
        Ok(earliest)
    }

    async fn claim_execution(
        &self,
        auto_task_id: DbId,
        trigger: &str,
        now: Timestamp,
    ) -> StoreResult<Option<JobExecution>> {
        // The NOT EXISTS guard handles the common case; the partial
        // unique index closes the race between two concurrent inserts.
        let query = format!(
            "INSERT INTO job_executions (auto_task_id, trigger, status, started_at) \
             SELECT $1, $2, $3, $4 \
             WHERE NOT EXISTS ( \
                 SELECT 1 FROM job_executions \
                 WHERE auto_task_id = $1 AND status = $3 \
             ) \
             RETURNING {EXECUTION_COLUMNS}"
        );
        let result = sqlx::query_as::<_, JobExecution>(&query)
            .bind(auto_task_id)
            .bind(trigger)
            .bind(status::EXEC_RUNNING)
            .bind(now)
            .fetch_optional(&self.pool)
            .await;
        match result {
            Ok(row) => Ok(row),
            Err(sqlx::Error::Database(db))
                if db.constraint() == Some(ONE_RUNNING_INDEX) =>
            {
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn finish_execution(
        &self,
        id: DbId,
        new_status: &str,
        result_summary: Option<&str>,
        error: Option<&str>,
        finished_at: Timestamp,
    ) -> StoreResult<JobExecution> {
        if !status::execution_can_transition(status::EXEC_RUNNING, new_status) {
            return Err(StoreError::Validation(format!(
                "{new_status} is not a terminal execution status"
            )));
        }
        let query = format!(
            "UPDATE job_executions \
             SET status = $2, result_summary = $3, error = $4, finished_at = $5 \
             WHERE id = $1 AND status = $6 \
             RETURNING {EXECUTION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobExecution>(&query)
            .bind(id)
            .bind(new_status)
            .bind(result_summary)
            .bind(error)
            .bind(finished_at)
            .bind(status::EXEC_RUNNING)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(exec) => Ok(exec),
            None => Err(self
                .conflict_or_not_found("job_executions", "execution", id, "finish")
                .await),
        }
    }

    async fn running_execution_count(&self) -> StoreResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM job_executions WHERE status = $1",
        )
        .bind(status::EXEC_RUNNING)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn list_executions(
        &self,
        auto_task_id: Option<DbId>,
        limit: i64,
    ) -> StoreResult<Vec<JobExecution>> {
        let rows = match auto_task_id {
            Some(task_id) => {
                let query = format!(
                    "SELECT {EXECUTION_COLUMNS} FROM job_executions \
                     WHERE auto_task_id = $1 \
                     ORDER BY started_at DESC, id DESC \
                     LIMIT $2"
                );
                sqlx::query_as::<_, JobExecution>(&query)
                    .bind(task_id)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let query = format!(
                    "SELECT {EXECUTION_COLUMNS} FROM job_executions \
                     ORDER BY started_at DESC, id DESC \
                     LIMIT $1"
                );
                sqlx::query_as::<_, JobExecution>(&query)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(rows)
    }

    async fn create_generation_task(
        &self,
        task: &NewGenerationTask,
    ) -> StoreResult<GenerationTask> {
        let query = format!(
            "INSERT INTO generation_tasks (prompt, model, topic_id, template_key, status) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {GENERATION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, GenerationTask>(&query)
            .bind(&task.prompt)
            .bind(&task.model)
            .bind(task.topic_id)
            .bind(&task.template_key)
            .bind(status::GEN_QUEUED)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_generation_task(&self, id: DbId) -> StoreResult<GenerationTask> {
        let query = format!("SELECT {GENERATION_COLUMNS} FROM generation_tasks WHERE id = $1");
        sqlx::query_as::<_, GenerationTask>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { entity: "generation task", id })
    }

    async fn claim_next_generation_task(&self) -> StoreResult<Option<GenerationTask>> {
        let query = format!(
            "UPDATE generation_tasks \
             SET status = $1, updated_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM generation_tasks \
                 WHERE status = $2 \
                 ORDER BY id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {GENERATION_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, GenerationTask>(&query)
            .bind(status::GEN_PROCESSING)
            .bind(status::GEN_QUEUED)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn complete_generation_task(
        &self,
        id: DbId,
        result_asset_id: &str,
        creative_id: Option<DbId>,
    ) -> StoreResult<GenerationTask> {
        let query = format!(
            "UPDATE generation_tasks \
             SET status = $2, result_asset_id = $3, creative_id = $4, \
                 error_message = NULL, updated_at = NOW() \
             WHERE id = $1 AND status = $5 \
             RETURNING {GENERATION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, GenerationTask>(&query)
            .bind(id)
            .bind(status::GEN_COMPLETED)
            .bind(result_asset_id)
            .bind(creative_id)
            .bind(status::GEN_PROCESSING)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(task) => Ok(task),
            None => Err(self
                .conflict_or_not_found("generation_tasks", "generation task", id, "complete")
                .await),
        }
    }

    async fn fail_generation_task(&self, id: DbId, error: &str) -> StoreResult<GenerationTask> {
        let query = format!(
            "UPDATE generation_tasks \
             SET status = $2, error_message = $3, updated_at = NOW() \
             WHERE id = $1 AND status = $4 \
             RETURNING {GENERATION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, GenerationTask>(&query)
            .bind(id)
            .bind(status::GEN_FAILED)
            .bind(error)
            .bind(status::GEN_PROCESSING)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(task) => Ok(task),
            None => Err(self
                .conflict_or_not_found("generation_tasks", "generation task", id, "fail")
                .await),
        }
    }

    async fn create_creative(&self, creative: &NewCreative) -> StoreResult<Creative> {
        let query = format!(
            "INSERT INTO creatives (theme_id, title, content, tags, media_urls, status) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {CREATIVE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, Creative>(&query)
            .bind(creative.theme_id)
            .bind(&creative.title)
            .bind(&creative.content)
            .bind(&creative.tags)
            .bind(&creative.media_urls)
            .bind(&creative.status)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_creative(&self, id: DbId) -> StoreResult<Creative> {
        let query = format!("SELECT {CREATIVE_COLUMNS} FROM creatives WHERE id = $1");
        sqlx::query_as::<_, Creative>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { entity: "creative", id })
    }

    async fn create_publish_record(&self, creative_id: DbId) -> StoreResult<PublishRecord> {
        let query = format!(
            "INSERT INTO publish_records (creative_id, status) \
             VALUES ($1, $2) \
             RETURNING {PUBLISH_COLUMNS}"
        );
        let result = sqlx::query_as::<_, PublishRecord>(&query)
            .bind(creative_id)
            .bind(status::PUB_PENDING)
            .fetch_one(&self.pool)
            .await;
        match result {
            Ok(row) => Ok(row),
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                Err(StoreError::NotFound { entity: "creative", id: creative_id })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get_publish_record(&self, id: DbId) -> StoreResult<PublishRecord> {
        let query = format!("SELECT {PUBLISH_COLUMNS} FROM publish_records WHERE id = $1");
        sqlx::query_as::<_, PublishRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { entity: "publish record", id })
    }

    async fn claim_next_publish_record(
        &self,
        now: Timestamp,
    ) -> StoreResult<Option<PublishRecord>> {
        let query = format!(
            "UPDATE publish_records \
             SET status = $1 \
             WHERE id = ( \
                 SELECT id FROM publish_records \
                 WHERE status = $2 \
                   AND (next_attempt_at IS NULL OR next_attempt_at <= $3) \
                 ORDER BY id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {PUBLISH_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, PublishRecord>(&query)
            .bind(status::PUB_PUBLISHING)
            .bind(status::PUB_PENDING)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn mark_published(
        &self,
        id: DbId,
        note_id: Option<&str>,
        published_at: Timestamp,
    ) -> StoreResult<PublishRecord> {
        let query = format!(
            "UPDATE publish_records \
             SET status = $2, attempts = attempts + 1, note_id = $3, \
                 published_at = $4, last_attempt_at = $4, \
                 last_error = NULL, next_attempt_at = NULL \
             WHERE id = $1 AND status = $5 \
             RETURNING {PUBLISH_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PublishRecord>(&query)
            .bind(id)
            .bind(status::PUB_PUBLISHED)
            .bind(note_id)
            .bind(published_at)
            .bind(status::PUB_PUBLISHING)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(record) => Ok(record),
            None => Err(self
                .conflict_or_not_found("publish_records", "publish record", id, "mark published")
                .await),
        }
    }

    async fn record_publish_failure(
        &self,
        id: DbId,
        error: &str,
        attempted_at: Timestamp,
        next_attempt_at: Option<Timestamp>,
        terminal: bool,
    ) -> StoreResult<PublishRecord> {
        let new_status = if terminal { status::PUB_FAILED } else { status::PUB_PENDING };
        let next_attempt_at = if terminal { None } else { next_attempt_at };
        let query = format!(
            "UPDATE publish_records \
             SET status = $2, attempts = attempts + 1, last_error = $3, \
                 last_attempt_at = $4, next_attempt_at = $5 \
             WHERE id = $1 AND status = $6 \
             RETURNING {PUBLISH_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PublishRecord>(&query)
            .bind(id)
            .bind(new_status)
            .bind(error)
            .bind(attempted_at)
            .bind(next_attempt_at)
            .bind(status::PUB_PUBLISHING)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(record) => Ok(record),
            None => Err(self
                .conflict_or_not_found("publish_records", "publish record", id, "record failure")
                .await),
        }
    }

    async fn enqueue_images(
        &self,
        items: &[NewImageDownload],
    ) -> StoreResult<Vec<ImageDownloadQueueItem>> {
        // One statement per item so a duplicate skip never aborts the
        // rest of the batch.
        let query = format!(
            "INSERT INTO image_download_queue (creative_id, url, target_path, status) \
             SELECT $1, $2, $3, $4 \
             WHERE NOT EXISTS ( \
                 SELECT 1 FROM image_download_queue \
                 WHERE creative_id IS NOT DISTINCT FROM $1 \
                   AND url = $2 AND status <> $5 \
             ) \
             RETURNING {IMAGE_COLUMNS}"
        );
        let mut inserted = Vec::with_capacity(items.len());
        for item in items {
            let row = sqlx::query_as::<_, ImageDownloadQueueItem>(&query)
                .bind(item.creative_id)
                .bind(&item.url)
                .bind(&item.target_path)
                .bind(status::IMG_PENDING)
                .bind(status::IMG_FAILED)
                .fetch_optional(&self.pool)
                .await?;
            if let Some(row) = row {
                inserted.push(row);
            }
        }
        Ok(inserted)
    }

    async fn claim_image_batch(&self, limit: i64) -> StoreResult<Vec<ImageDownloadQueueItem>> {
        let query = format!(
            "UPDATE image_download_queue \
             SET status = $1, updated_at = NOW() \
             WHERE id IN ( \
                 SELECT id FROM image_download_queue \
                 WHERE status = $2 \
                 ORDER BY id ASC \
                 LIMIT $3 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {IMAGE_COLUMNS}"
        );
        let mut rows = sqlx::query_as::<_, ImageDownloadQueueItem>(&query)
            .bind(status::IMG_DOWNLOADING)
            .bind(status::IMG_PENDING)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        // RETURNING order is unspecified.
        rows.sort_by_key(|item| item.id);
        Ok(rows)
    }

    async fn complete_image(&self, id: DbId) -> StoreResult<ImageDownloadQueueItem> {
        let query = format!(
            "UPDATE image_download_queue \
             SET status = $2, last_error = NULL, updated_at = NOW() \
             WHERE id = $1 AND status = $3 \
             RETURNING {IMAGE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ImageDownloadQueueItem>(&query)
            .bind(id)
            .bind(status::IMG_DONE)
            .bind(status::IMG_DOWNLOADING)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(item) => Ok(item),
            None => Err(self
                .conflict_or_not_found("image_download_queue", "image download", id, "complete")
                .await),
        }
    }

    async fn fail_image(
        &self,
        id: DbId,
        error: &str,
        terminal: bool,
    ) -> StoreResult<ImageDownloadQueueItem> {
        let new_status = if terminal { status::IMG_FAILED } else { status::IMG_PENDING };
        let query = format!(
            "UPDATE image_download_queue \
             SET status = $2, attempts = attempts + 1, last_error = $3, \
                 updated_at = NOW() \
             WHERE id = $1 AND status = $4 \
             RETURNING {IMAGE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ImageDownloadQueueItem>(&query)
            .bind(id)
            .bind(new_status)
            .bind(error)
            .bind(status::IMG_DOWNLOADING)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(item) => Ok(item),
            None => Err(self
                .conflict_or_not_found("image_download_queue", "image download", id, "fail")
                .await),
        }
    }

    async fn image_queue_stats(&self) -> StoreResult<ImageQueueStats> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM image_download_queue GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut stats = ImageQueueStats::default();
        for (item_status, count) in rows {
            match item_status.as_str() {
                status::IMG_PENDING => stats.pending = count,
                status::IMG_DOWNLOADING => stats.downloading = count,
                status::IMG_DONE => stats.done = count,
                status::IMG_FAILED => stats.failed = count,
                _ => {}
            }
        }
        Ok(stats)
    }
}
