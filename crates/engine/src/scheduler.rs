//! The scheduler: periodic evaluation of recurring AutoTasks.
//!
//! Each tick claims an execution per due active task (the ledger's
//! insert-if-not-running compare-and-set guarantees at most one running
//! execution per task), reschedules `next_run_at` relative to now, and
//! spawns the pipeline for the run: generation workers, image
//! downloads, then the publish queue. The tick never waits on a
//! pipeline; one task's failure is recorded on its own execution and
//! never halts the loop.

use std::sync::Arc;

use cadence_core::error::CoreError;
use cadence_core::schedule::Recurrence;
use cadence_core::status;
use cadence_core::task_config::{self, TaskConfig};
use cadence_core::types::{DbId, Timestamp};
use cadence_store::models::{AutoTask, JobExecution, NewAutoTask, NewGenerationTask};
use cadence_store::Ledger;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::generation::GenerationQueue;
use crate::images::ImageQueue;
use crate::publish::{PublishOutcome, PublishQueue};

/// Delay between polls while waiting for tasks claimed by another
/// worker to reach a terminal status.
const SETTLE_POLL_MS: u64 = 50;

/// Snapshot returned by `get_status`.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    /// Whether the background tick loop is running.
    pub running: bool,
    /// Executions currently in flight across all tasks.
    pub running_executions: i64,
    /// Earliest `next_run_at` over active tasks.
    pub next_due_at: Option<Timestamp>,
}

struct Inner {
    ledger: Arc<dyn Ledger>,
    generation: GenerationQueue,
    publish: PublishQueue,
    images: ImageQueue,
    config: EngineConfig,
    /// Present while the tick loop runs; cancelling it stops the loop.
    cancel: Mutex<Option<CancellationToken>>,
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        generation: GenerationQueue,
        publish: PublishQueue,
        images: ImageQueue,
        config: EngineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                ledger,
                generation,
                publish,
                images,
                config,
                cancel: Mutex::new(None),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Job management
    // ------------------------------------------------------------------

    /// Validate and create a recurring job. The first `next_run_at` is
    /// computed from the schedule relative to now.
    pub async fn create_job(&self, input: &NewAutoTask) -> EngineResult<AutoTask> {
        task_config::validate_task_name(&input.name)?;
        input.config.validate()?;
        let recurrence = Recurrence::parse(&input.schedule)?;
        let next_run_at = recurrence.next_after(Utc::now());
        let task = self.inner.ledger.create_auto_task(input, next_run_at).await?;
        tracing::info!(
            task_id = task.id,
            name = %task.name,
            schedule = %task.schedule,
            next_run_at = %task.next_run_at,
            "Auto task created",
        );
        Ok(task)
    }

    pub async fn get_job(&self, id: DbId) -> EngineResult<AutoTask> {
        Ok(self.inner.ledger.get_auto_task(id).await?)
    }

    /// List jobs, optionally restricted to one theme.
    pub async fn list_jobs(&self, theme_id: Option<DbId>) -> EngineResult<Vec<AutoTask>> {
        let tasks = self.inner.ledger.list_auto_tasks().await?;
        Ok(tasks
            .into_iter()
            .filter(|task| theme_id.is_none_or(|id| task.theme_id == Some(id)))
            .collect())
    }

    pub async fn pause_job(&self, id: DbId) -> EngineResult<AutoTask> {
        let task = self
            .inner
            .ledger
            .set_auto_task_status(id, status::TASK_PAUSED)
            .await?;
        tracing::info!(task_id = id, "Auto task paused");
        Ok(task)
    }

    /// Reactivate a paused job. `next_run_at` is recomputed relative to
    /// now so a long pause does not cause a catch-up burst.
    pub async fn resume_job(&self, id: DbId) -> EngineResult<AutoTask> {
        let task = self.inner.ledger.get_auto_task(id).await?;
        let next_run_at = Recurrence::parse(&task.schedule)?.next_after(Utc::now());
        self.inner.ledger.reschedule_auto_task(id, next_run_at).await?;
        let task = self
            .inner
            .ledger
            .set_auto_task_status(id, status::TASK_ACTIVE)
            .await?;
        tracing::info!(task_id = id, next_run_at = %task.next_run_at, "Auto task resumed");
        Ok(task)
    }

    /// Run a job now, outside its schedule. The same claim guard
    /// applies; a second trigger while one runs is a conflict, not a
    /// silent skip, so the caller can tell.
    pub async fn trigger_job(&self, id: DbId) -> EngineResult<JobExecution> {
        let task = self.inner.ledger.get_auto_task(id).await?;
        let now = Utc::now();
        let Some(execution) = self
            .inner
            .ledger
            .claim_execution(task.id, status::TRIGGER_MANUAL, now)
            .await?
        else {
            return Err(CoreError::Conflict(format!(
                "Auto task {id} already has a running execution"
            ))
            .into());
        };
        tracing::info!(task_id = id, execution_id = execution.id, "Auto task triggered manually");
        let scheduler = self.clone();
        let spawned = execution.clone();
        tokio::spawn(async move {
            scheduler.run_execution(task, spawned).await;
        });
        Ok(execution)
    }

    pub async fn list_executions(
        &self,
        auto_task_id: Option<DbId>,
        limit: i64,
    ) -> EngineResult<Vec<JobExecution>> {
        Ok(self.inner.ledger.list_executions(auto_task_id, limit).await?)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start the background tick loop. Idempotent.
    pub async fn start(&self) {
        let mut guard = self.inner.cancel.lock().await;
        if guard.is_some() {
            tracing::debug!("Scheduler already running");
            return;
        }
        let token = CancellationToken::new();
        *guard = Some(token.clone());
        drop(guard);

        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.inner.config.tick_interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::info!("Scheduler tick loop shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = scheduler.tick().await {
                            tracing::error!(error = %e, "Scheduler tick failed");
                        }
                    }
                }
            }
        });
        tracing::info!(
            tick_interval_secs = self.inner.config.tick_interval.as_secs(),
            "Scheduler started",
        );
    }

    /// Stop the background tick loop. Idempotent; in-flight executions
    /// finish on their own.
    pub async fn stop(&self) {
        let mut guard = self.inner.cancel.lock().await;
        if let Some(token) = guard.take() {
            token.cancel();
            tracing::info!("Scheduler stopped");
        }
    }

    pub async fn get_status(&self) -> EngineResult<SchedulerStatus> {
        let running = self.inner.cancel.lock().await.is_some();
        let running_executions = self.inner.ledger.running_execution_count().await?;
        let next_due_at = self.inner.ledger.next_due_at().await?;
        Ok(SchedulerStatus {
            running,
            running_executions,
            next_due_at,
        })
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// One evaluation pass. Returns the number of executions started.
    pub async fn tick(&self) -> EngineResult<usize> {
        let now = Utc::now();
        let due = self.inner.ledger.due_auto_tasks(now).await?;
        if due.is_empty() {
            return Ok(0);
        }
        tracing::debug!(due = due.len(), "Evaluating due tasks");

        let mut started = 0;
        for task in due {
            match self.evaluate_task(task, now).await {
                Ok(true) => started += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Task evaluation failed");
                }
            }
        }
        Ok(started)
    }

    /// Reschedule and, when no execution is in flight, start one.
    ///
    /// Rescheduling happens before the claim so `next_run_at` moves past
    /// now even on an overlap skip. The pipeline itself runs on a
    /// spawned task; the tick only claims and moves on, so one slow
    /// task never delays the other due tasks or the next tick.
    async fn evaluate_task(&self, task: AutoTask, now: Timestamp) -> EngineResult<bool> {
        let next_run_at = Recurrence::parse(&task.schedule)?.next_after(now);
        self.inner.ledger.reschedule_auto_task(task.id, next_run_at).await?;

        let Some(execution) = self
            .inner
            .ledger
            .claim_execution(task.id, status::TRIGGER_SCHEDULED, now)
            .await?
        else {
            tracing::debug!(task_id = task.id, "Previous execution still running, skipping");
            return Ok(false);
        };
        tracing::info!(
            task_id = task.id,
            execution_id = execution.id,
            next_run_at = %next_run_at,
            "Execution started",
        );
        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.run_execution(task, execution).await;
        });
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Drive one execution to its terminal status and record the outcome
    /// on the task. Never returns an error; everything is written to the
    /// ledger or logged.
    async fn run_execution(&self, task: AutoTask, execution: JobExecution) {
        let outcome = self.drive_pipeline(&task).await;
        let now = Utc::now();
        match outcome {
            Ok(summary) => {
                if let Err(e) = self
                    .inner
                    .ledger
                    .finish_execution(execution.id, status::EXEC_SUCCEEDED, Some(&summary), None, now)
                    .await
                {
                    tracing::error!(execution_id = execution.id, error = %e, "Failed to finish execution");
                }
                if let Err(e) = self.inner.ledger.record_task_success(task.id, now).await {
                    tracing::error!(task_id = task.id, error = %e, "Failed to record task success");
                }
                tracing::info!(task_id = task.id, execution_id = execution.id, summary = %summary, "Execution succeeded");
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(e) = self
                    .inner
                    .ledger
                    .finish_execution(execution.id, status::EXEC_FAILED, None, Some(&message), now)
                    .await
                {
                    tracing::error!(execution_id = execution.id, error = %e, "Failed to finish execution");
                }
                tracing::warn!(task_id = task.id, execution_id = execution.id, error = %message, "Execution failed");
                match self.inner.ledger.record_task_failure(task.id, now).await {
                    Ok(updated) => self.maybe_auto_pause(&updated).await,
                    Err(e) => {
                        tracing::error!(task_id = task.id, error = %e, "Failed to record task failure");
                    }
                }
            }
        }
    }

    async fn maybe_auto_pause(&self, task: &AutoTask) {
        if task.consecutive_failures < self.inner.config.auto_pause_threshold {
            return;
        }
        match self
            .inner
            .ledger
            .set_auto_task_status(task.id, status::TASK_PAUSED)
            .await
        {
            Ok(_) => {
                tracing::warn!(
                    task_id = task.id,
                    consecutive_failures = task.consecutive_failures,
                    "Auto task paused after repeated failures",
                );
            }
            Err(e) => {
                tracing::error!(task_id = task.id, error = %e, "Failed to auto-pause task");
            }
        }
    }

    /// The pipeline for one run: enqueue `output_count` generation
    /// tasks, drain workers, wait for this run's tasks to settle, then
    /// download images and drive the publish queue until idle.
    async fn drive_pipeline(&self, task: &AutoTask) -> EngineResult<String> {
        let config = task.config();
        let mut ids = Vec::with_capacity(config.output_count as usize);
        for index in 0..config.output_count {
            let request = NewGenerationTask {
                prompt: build_prompt(&config, index),
                model: config.image_model.clone().unwrap_or_else(|| "default".to_string()),
                topic_id: task.theme_id,
                template_key: None,
            };
            ids.push(self.inner.generation.enqueue(&request).await?.id);
        }

        self.drain_generation_queue().await?;
        self.wait_for_settled(&ids).await?;

        let mut completed = 0usize;
        for id in &ids {
            let generated = self.inner.generation.get(*id).await?;
            if generated.status == status::GEN_COMPLETED {
                completed += 1;
            }
        }
        if completed == 0 {
            return Err(EngineError::Transient(format!(
                "all {} generation tasks failed",
                ids.len()
            )));
        }

        loop {
            let report = self.inner.images.process_batch().await?;
            if report.claimed == 0 {
                break;
            }
        }
        loop {
            match self.inner.publish.process_next().await? {
                PublishOutcome::Idle => break,
                _ => {}
            }
        }

        Ok(format!("{completed}/{} ideas generated", ids.len()))
    }

    /// Run up to `worker_parallelism` concurrent workers until the
    /// generation queue has no claimable task left.
    async fn drain_generation_queue(&self) -> EngineResult<()> {
        let workers = (0..self.inner.config.worker_parallelism).map(|_| async {
            loop {
                match self.inner.generation.process_next().await {
                    Ok(Some(_)) => continue,
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(e),
                }
            }
        });
        for result in futures::future::join_all(workers).await {
            result?;
        }
        Ok(())
    }

    /// Tasks claimed by a concurrent execution's worker may still be
    /// processing after our own drain; poll until every id is terminal.
    ///
    /// The wait is bounded by the provider timeout plus slack: a healthy
    /// peer finishes within its own timeout, so anything still
    /// `processing` past that holds a dead claim (e.g. a crashed
    /// process) and the execution fails instead of hanging.
    async fn wait_for_settled(&self, ids: &[DbId]) -> EngineResult<()> {
        let budget = self.inner.config.provider_timeout + std::time::Duration::from_secs(1);
        let deadline = tokio::time::Instant::now() + budget;
        loop {
            let mut all_terminal = true;
            for id in ids {
                let generated = self.inner.generation.get(*id).await?;
                if !status::generation_is_terminal(&generated.status) {
                    all_terminal = false;
                    break;
                }
            }
            if all_terminal {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(EngineError::Transient(format!(
                    "generation tasks still processing after {budget:?}"
                )));
            }
            tokio::time::sleep(std::time::Duration::from_millis(SETTLE_POLL_MS)).await;
        }
    }
}

/// Compose the provider prompt from the task's creative brief.
fn build_prompt(config: &TaskConfig, index: i32) -> String {
    let mut prompt = format!("Write a social media post about: {}.", config.goal.trim());
    if let Some(persona) = config.persona.as_deref().filter(|s| !s.trim().is_empty()) {
        prompt.push_str(&format!(" Write as: {}.", persona.trim()));
    }
    if let Some(tone) = config.tone.as_deref().filter(|s| !s.trim().is_empty()) {
        prompt.push_str(&format!(" Tone: {}.", tone.trim()));
    }
    if config.output_count > 1 {
        prompt.push_str(&format!(
            " Variation {} of {}.",
            index + 1,
            config.output_count
        ));
    }
    prompt
}
