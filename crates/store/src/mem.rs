//! In-memory [`Ledger`] implementation.
//!
//! All tables live behind a single async mutex, so every trait method is
//! one critical section and the compare-and-set claims hold trivially.
//! Used by engine and API tests, and usable for single-process embedding
//! where no Postgres is available.

use async_trait::async_trait;
use cadence_core::status;
use cadence_core::types::{DbId, Timestamp};
use chrono::Utc;
use tokio::sync::Mutex;

use crate::ledger::{Ledger, StoreError, StoreResult};
use crate::models::{
    AutoTask, Creative, GenerationTask, ImageDownloadQueueItem, ImageQueueStats, JobExecution,
    NewAutoTask, NewCreative, NewGenerationTask, NewImageDownload, PublishRecord,
};

#[derive(Default)]
struct Tables {
    next_id: DbId,
    auto_tasks: Vec<AutoTask>,
    executions: Vec<JobExecution>,
    generation_tasks: Vec<GenerationTask>,
    creatives: Vec<Creative>,
    publish_records: Vec<PublishRecord>,
    images: Vec<ImageDownloadQueueItem>,
}

impl Tables {
    fn allocate_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemLedger {
    tables: Mutex<Tables>,
}

impl MemLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Ledger for MemLedger {
    async fn create_auto_task(
        &self,
        task: &NewAutoTask,
        next_run_at: Timestamp,
    ) -> StoreResult<AutoTask> {
        let mut t = self.tables.lock().await;
        let now = Utc::now();
        let row = AutoTask {
            id: t.allocate_id(),
            theme_id: task.theme_id,
            name: task.name.clone(),
            schedule: task.schedule.clone(),
            goal: task.config.goal.clone(),
            persona: task.config.persona.clone(),
            tone: task.config.tone.clone(),
            prompt_profile_id: task.config.prompt_profile_id,
            image_model: task.config.image_model.clone(),
            output_count: task.config.output_count,
            min_quality_score: task.config.min_quality_score,
            status: status::TASK_ACTIVE.to_string(),
            last_run_at: None,
            next_run_at,
            total_runs: 0,
            successful_runs: 0,
            consecutive_failures: 0,
            created_at: now,
            updated_at: now,
        };
        t.auto_tasks.push(row.clone());
        Ok(row)
    }

    async fn get_auto_task(&self, id: DbId) -> StoreResult<AutoTask> {
        let t = self.tables.lock().await;
        t.auto_tasks
            .iter()
            .find(|task| task.id == id)
            .cloned()
            .ok_or(StoreError::NotFound { entity: "auto task", id })
    }

    async fn list_auto_tasks(&self) -> StoreResult<Vec<AutoTask>> {
        let t = self.tables.lock().await;
        let mut tasks = t.auto_tasks.clone();
        tasks.sort_by_key(|task| task.id);
        Ok(tasks)
    }

    async fn due_auto_tasks(&self, now: Timestamp) -> StoreResult<Vec<AutoTask>> {
        let t = self.tables.lock().await;
        let mut due: Vec<AutoTask> = t
            .auto_tasks
            .iter()
            .filter(|task| task.status == status::TASK_ACTIVE && task.next_run_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|task| task.next_run_at);
        Ok(due)
    }

    async fn reschedule_auto_task(&self, id: DbId, next_run_at: Timestamp) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        let task = t
            .auto_tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or(StoreError::NotFound { entity: "auto task", id })?;
        task.next_run_at = next_run_at;
        task.updated_at = Utc::now();
        Ok(())
    }

    async fn record_task_success(&self, id: DbId, ran_at: Timestamp) -> StoreResult<AutoTask> {
        let mut t = self.tables.lock().await;
        let task = t
            .auto_tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or(StoreError::NotFound { entity: "auto task", id })?;
        task.total_runs += 1;
        task.successful_runs += 1;
        task.consecutive_failures = 0;
        task.last_run_at = Some(ran_at);
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn record_task_failure(&self, id: DbId, ran_at: Timestamp) -> StoreResult<AutoTask> {
        let mut t = self.tables.lock().await;
        let task = t
            .auto_tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or(StoreError::NotFound { entity: "auto task", id })?;
        task.total_runs += 1;
        task.consecutive_failures += 1;
        task.last_run_at = Some(ran_at);
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn set_auto_task_status(&self, id: DbId, new_status: &str) -> StoreResult<AutoTask> {
        let mut t = self.tables.lock().await;
        let task = t
            .auto_tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or(StoreError::NotFound { entity: "auto task", id })?;
        task.status = new_status.to_string();
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn next_due_at(&self) -> StoreResult<Option<Timestamp>> {
        let t = self.tables.lock().await;
        Ok(t.auto_tasks
            .iter()
            .filter(|task| task.status == status::TASK_ACTIVE)
            .map(|task| task.next_run_at)
            .min())
    }

    async fn claim_execution(
        &self,
        auto_task_id: DbId,
        trigger: &str,
        now: Timestamp,
    ) -> StoreResult<Option<JobExecution>> {
        let mut t = self.tables.lock().await;
        let occupied = t.executions.iter().any(|exec| {
            exec.auto_task_id == auto_task_id && exec.status == status::EXEC_RUNNING
        });
        if occupied {
            return Ok(None);
        }
        let row = JobExecution {
            id: t.allocate_id(),
            auto_task_id,
            trigger: trigger.to_string(),
            status: status::EXEC_RUNNING.to_string(),
            started_at: now,
            finished_at: None,
            result_summary: None,
            error: None,
        };
        t.executions.push(row.clone());
        Ok(Some(row))
    }

    async fn finish_execution(
        &self,
        id: DbId,
        new_status: &str,
        result_summary: Option<&str>,
        error: Option<&str>,
        finished_at: Timestamp,
    ) -> StoreResult<JobExecution> {
        let mut t = self.tables.lock().await;
        let exec = t
            .executions
            .iter_mut()
            .find(|exec| exec.id == id)
            .ok_or(StoreError::NotFound { entity: "execution", id })?;
        if !status::execution_can_transition(&exec.status, new_status) {
            return Err(StoreError::Conflict(format!(
                "execution {id} is {}, cannot become {new_status}",
                exec.status
            )));
        }
        exec.status = new_status.to_string();
        exec.finished_at = Some(finished_at);
        exec.result_summary = result_summary.map(str::to_string);
        exec.error = error.map(str::to_string);
        Ok(exec.clone())
    }

    async fn running_execution_count(&self) -> StoreResult<i64> {
        let t = self.tables.lock().await;
        Ok(t.executions
            .iter()
            .filter(|exec| exec.status == status::EXEC_RUNNING)
            .count() as i64)
    }

    async fn list_executions(
        &self,
        auto_task_id: Option<DbId>,
        limit: i64,
    ) -> StoreResult<Vec<JobExecution>> {
        let t = self.tables.lock().await;
        let mut execs: Vec<JobExecution> = t
            .executions
            .iter()
            .filter(|exec| auto_task_id.is_none_or(|id| exec.auto_task_id == id))
            .cloned()
            .collect();
        execs.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        execs.truncate(limit.max(0) as usize);
        Ok(execs)
    }

    async fn create_generation_task(
        &self,
        task: &NewGenerationTask,
    ) -> StoreResult<GenerationTask> {
        let mut t = self.tables.lock().await;
        let now = Utc::now();
        let row = GenerationTask {
            id: t.allocate_id(),
            prompt: task.prompt.clone(),
            model: task.model.clone(),
            topic_id: task.topic_id,
            template_key: task.template_key.clone(),
            status: status::GEN_QUEUED.to_string(),
            result_asset_id: None,
            creative_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        t.generation_tasks.push(row.clone());
        Ok(row)
    }

    async fn get_generation_task(&self, id: DbId) -> StoreResult<GenerationTask> {
        let t = self.tables.lock().await;
        t.generation_tasks
            .iter()
            .find(|task| task.id == id)
            .cloned()
            .ok_or(StoreError::NotFound { entity: "generation task", id })
    }

    async fn claim_next_generation_task(&self) -> StoreResult<Option<GenerationTask>> {
        let mut t = self.tables.lock().await;
        let next = t
            .generation_tasks
            .iter_mut()
            .filter(|task| task.status == status::GEN_QUEUED)
            .min_by_key(|task| task.id);
        match next {
            Some(task) => {
                task.status = status::GEN_PROCESSING.to_string();
                task.updated_at = Utc::now();
                Ok(Some(task.clone()))
            }
            None => Ok(None),
        }
    }

    async fn complete_generation_task(
        &self,
        id: DbId,
        result_asset_id: &str,
        creative_id: Option<DbId>,
    ) -> StoreResult<GenerationTask> {
        let mut t = self.tables.lock().await;
        let task = t
            .generation_tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or(StoreError::NotFound { entity: "generation task", id })?;
        if !status::generation_can_transition(&task.status, status::GEN_COMPLETED) {
            return Err(StoreError::Conflict(format!(
                "generation task {id} is {}, cannot complete",
                task.status
            )));
        }
        task.status = status::GEN_COMPLETED.to_string();
        task.result_asset_id = Some(result_asset_id.to_string());
        task.creative_id = creative_id;
        task.error_message = None;
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn fail_generation_task(&self, id: DbId, error: &str) -> StoreResult<GenerationTask> {
        let mut t = self.tables.lock().await;
        let task = t
            .generation_tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or(StoreError::NotFound { entity: "generation task", id })?;
        if !status::generation_can_transition(&task.status, status::GEN_FAILED) {
            return Err(StoreError::Conflict(format!(
                "generation task {id} is {}, cannot fail",
                task.status
            )));
        }
        task.status = status::GEN_FAILED.to_string();
        task.error_message = Some(error.to_string());
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn create_creative(&self, creative: &NewCreative) -> StoreResult<Creative> {
        let mut t = self.tables.lock().await;
        let row = Creative {
            id: t.allocate_id(),
            theme_id: creative.theme_id,
            title: creative.title.clone(),
            content: creative.content.clone(),
            tags: creative.tags.clone(),
            media_urls: creative.media_urls.clone(),
            status: creative.status.clone(),
            created_at: Utc::now(),
        };
        t.creatives.push(row.clone());
        Ok(row)
    }

    async fn get_creative(&self, id: DbId) -> StoreResult<Creative> {
        let t = self.tables.lock().await;
        t.creatives
            .iter()
            .find(|creative| creative.id == id)
            .cloned()
            .ok_or(StoreError::NotFound { entity: "creative", id })
    }

    async fn create_publish_record(&self, creative_id: DbId) -> StoreResult<PublishRecord> {
        let mut t = self.tables.lock().await;
        if !t.creatives.iter().any(|creative| creative.id == creative_id) {
            return Err(StoreError::NotFound { entity: "creative", id: creative_id });
        }
        let row = PublishRecord {
            id: t.allocate_id(),
            creative_id,
            status: status::PUB_PENDING.to_string(),
            attempts: 0,
            last_error: None,
            last_attempt_at: None,
            next_attempt_at: None,
            published_at: None,
            note_id: None,
            created_at: Utc::now(),
        };
        t.publish_records.push(row.clone());
        Ok(row)
    }

    async fn get_publish_record(&self, id: DbId) -> StoreResult<PublishRecord> {
        let t = self.tables.lock().await;
        t.publish_records
            .iter()
            .find(|record| record.id == id)
            .cloned()
            .ok_or(StoreError::NotFound { entity: "publish record", id })
    }

    async fn claim_next_publish_record(
        &self,
        now: Timestamp,
    ) -> StoreResult<Option<PublishRecord>> {
        let mut t = self.tables.lock().await;
        let next = t
            .publish_records
            .iter_mut()
            .filter(|record| {
                record.status == status::PUB_PENDING
                    && record.next_attempt_at.is_none_or(|at| at <= now)
            })
            .min_by_key(|record| record.id);
        match next {
            Some(record) => {
                record.status = status::PUB_PUBLISHING.to_string();
                Ok(Some(record.clone()))
            }
            None => Ok(None),
        }
    }

    async fn mark_published(
        &self,
        id: DbId,
        note_id: Option<&str>,
        published_at: Timestamp,
    ) -> StoreResult<PublishRecord> {
        let mut t = self.tables.lock().await;
        let record = t
            .publish_records
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or(StoreError::NotFound { entity: "publish record", id })?;
        if record.status != status::PUB_PUBLISHING {
            return Err(StoreError::Conflict(format!(
                "publish record {id} is {}, cannot mark published",
                record.status
            )));
        }
        record.status = status::PUB_PUBLISHED.to_string();
        record.attempts += 1;
        record.last_attempt_at = Some(published_at);
        record.published_at = Some(published_at);
        record.note_id = note_id.map(str::to_string);
        record.last_error = None;
        record.next_attempt_at = None;
        Ok(record.clone())
    }

    async fn record_publish_failure(
        &self,
        id: DbId,
        error: &str,
        attempted_at: Timestamp,
        next_attempt_at: Option<Timestamp>,
        terminal: bool,
    ) -> StoreResult<PublishRecord> {
        let mut t = self.tables.lock().await;
        let record = t
            .publish_records
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or(StoreError::NotFound { entity: "publish record", id })?;
        if record.status != status::PUB_PUBLISHING {
            return Err(StoreError::Conflict(format!(
                "publish record {id} is {}, cannot record failure",
                record.status
            )));
        }
        record.attempts += 1;
        record.last_error = Some(error.to_string());
        record.last_attempt_at = Some(attempted_at);
        if terminal {
            record.status = status::PUB_FAILED.to_string();
            record.next_attempt_at = None;
        } else {
            record.status = status::PUB_PENDING.to_string();
            record.next_attempt_at = next_attempt_at;
        }
        Ok(record.clone())
    }

    async fn enqueue_images(
        &self,
        items: &[NewImageDownload],
    ) -> StoreResult<Vec<ImageDownloadQueueItem>> {
        let mut t = self.tables.lock().await;
        let now = Utc::now();
        let mut inserted = Vec::new();
        for item in items {
            let duplicate = t.images.iter().any(|existing| {
                existing.creative_id == item.creative_id
                    && existing.url == item.url
                    && existing.status != status::IMG_FAILED
            });
            if duplicate {
                continue;
            }
            let row = ImageDownloadQueueItem {
                id: t.allocate_id(),
                creative_id: item.creative_id,
                url: item.url.clone(),
                target_path: item.target_path.clone(),
                status: status::IMG_PENDING.to_string(),
                attempts: 0,
                last_error: None,
                created_at: now,
                updated_at: now,
            };
            t.images.push(row.clone());
            inserted.push(row);
        }
        Ok(inserted)
    }

    async fn claim_image_batch(&self, limit: i64) -> StoreResult<Vec<ImageDownloadQueueItem>> {
        let mut t = self.tables.lock().await;
        let now = Utc::now();
        let mut ids: Vec<DbId> = t
            .images
            .iter()
            .filter(|item| item.status == status::IMG_PENDING)
            .map(|item| item.id)
            .collect();
        ids.sort_unstable();
        ids.truncate(limit.max(0) as usize);
        let mut claimed = Vec::with_capacity(ids.len());
        for item in t.images.iter_mut().filter(|item| ids.contains(&item.id)) {
            item.status = status::IMG_DOWNLOADING.to_string();
            item.updated_at = now;
            claimed.push(item.clone());
        }
        claimed.sort_by_key(|item| item.id);
        Ok(claimed)
    }

    async fn complete_image(&self, id: DbId) -> StoreResult<ImageDownloadQueueItem> {
        let mut t = self.tables.lock().await;
        let item = t
            .images
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or(StoreError::NotFound { entity: "image download", id })?;
        if !status::image_can_transition(&item.status, status::IMG_DONE) {
            return Err(StoreError::Conflict(format!(
                "image download {id} is {}, cannot complete",
                item.status
            )));
        }
        item.status = status::IMG_DONE.to_string();
        item.last_error = None;
        item.updated_at = Utc::now();
        Ok(item.clone())
    }

    async fn fail_image(
        &self,
        id: DbId,
        error: &str,
        terminal: bool,
    ) -> StoreResult<ImageDownloadQueueItem> {
        let mut t = self.tables.lock().await;
        let item = t
            .images
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or(StoreError::NotFound { entity: "image download", id })?;
        let target = if terminal { status::IMG_FAILED } else { status::IMG_PENDING };
        if !status::image_can_transition(&item.status, target) {
            return Err(StoreError::Conflict(format!(
                "image download {id} is {}, cannot become {target}",
                item.status
            )));
        }
        item.attempts += 1;
        item.last_error = Some(error.to_string());
        item.status = target.to_string();
        item.updated_at = Utc::now();
        Ok(item.clone())
    }

    async fn image_queue_stats(&self) -> StoreResult<ImageQueueStats> {
        let t = self.tables.lock().await;
        let mut stats = ImageQueueStats::default();
        for item in &t.images {
            match item.status.as_str() {
                status::IMG_PENDING => stats.pending += 1,
                status::IMG_DOWNLOADING => stats.downloading += 1,
                status::IMG_DONE => stats.done += 1,
                status::IMG_FAILED => stats.failed += 1,
                _ => {}
            }
        }
        Ok(stats)
    }
}
