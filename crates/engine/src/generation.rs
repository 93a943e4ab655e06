//! Generation queue: fire-and-poll request fulfilment.
//!
//! `enqueue` returns a task id immediately; callers poll `get` for
//! progress. Worker steps (`process_next`) claim exactly one queued
//! task, call the provider under a timeout, and write the terminal
//! status. A completed artifact immediately becomes a Creative with a
//! pending publish record and queued image downloads.

use std::sync::Arc;

use cadence_core::error::CoreError;
use cadence_core::media;
use cadence_core::types::DbId;
use cadence_store::models::{GenerationTask, NewCreative, NewGenerationTask, NewImageDownload};
use cadence_store::Ledger;
use std::time::Duration;

use crate::collaborators::{GeneratedArtifact, GenerationProvider};
use crate::error::EngineResult;
use crate::images;

/// Status a freshly produced creative lands in.
pub const CREATIVE_READY: &str = "ready";

#[derive(Clone)]
pub struct GenerationQueue {
    ledger: Arc<dyn Ledger>,
    provider: Arc<dyn GenerationProvider>,
    provider_timeout: Duration,
    asset_root: String,
}

impl GenerationQueue {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        provider: Arc<dyn GenerationProvider>,
        provider_timeout: Duration,
        asset_root: String,
    ) -> Self {
        Self {
            ledger,
            provider,
            provider_timeout,
            asset_root,
        }
    }

    /// Accept a generation request and return the queued task.
    pub async fn enqueue(&self, request: &NewGenerationTask) -> EngineResult<GenerationTask> {
        if request.prompt.trim().is_empty() {
            return Err(CoreError::Validation("Prompt must not be empty".to_string()).into());
        }
        if request.model.trim().is_empty() {
            return Err(CoreError::Validation("Model must not be empty".to_string()).into());
        }
        let task = self.ledger.create_generation_task(request).await?;
        tracing::info!(task_id = task.id, model = %task.model, "Generation task queued");
        Ok(task)
    }

    /// Poll a task's current state.
    pub async fn get(&self, id: DbId) -> EngineResult<GenerationTask> {
        Ok(self.ledger.get_generation_task(id).await?)
    }

    /// One worker step: claim a queued task and drive it to a terminal
    /// status. Returns `None` when the queue is empty, otherwise the
    /// finished task row.
    pub async fn process_next(&self) -> EngineResult<Option<GenerationTask>> {
        let Some(task) = self.ledger.claim_next_generation_task().await? else {
            return Ok(None);
        };
        tracing::debug!(task_id = task.id, "Generation task claimed");

        let outcome = tokio::time::timeout(self.provider_timeout, self.provider.generate(&task));
        let finished = match outcome.await {
            Ok(Ok(artifact)) => self.finalize_success(&task, &artifact).await?,
            Ok(Err(e)) => {
                tracing::warn!(task_id = task.id, error = %e, "Generation failed");
                self.ledger
                    .fail_generation_task(task.id, &e.to_string())
                    .await?
            }
            Err(_) => {
                let message = format!(
                    "provider timed out after {}s",
                    self.provider_timeout.as_secs()
                );
                tracing::warn!(task_id = task.id, "Generation timed out");
                self.ledger.fail_generation_task(task.id, &message).await?
            }
        };
        Ok(Some(finished))
    }

    /// Persist the artifact: creative, pending publish record, and image
    /// downloads for every referenced URL, then the terminal task write.
    async fn finalize_success(
        &self,
        task: &GenerationTask,
        artifact: &GeneratedArtifact,
    ) -> EngineResult<GenerationTask> {
        let creative = self
            .ledger
            .create_creative(&NewCreative {
                theme_id: None,
                title: artifact.title.clone(),
                content: artifact.content.clone(),
                tags: artifact.tags.clone(),
                media_urls: artifact.media_urls.clone(),
                status: CREATIVE_READY.to_string(),
            })
            .await?;
        self.ledger.create_publish_record(creative.id).await?;

        let downloads: Vec<NewImageDownload> = media::split_media_urls(&artifact.media_urls)
            .into_iter()
            .filter(|url| media::validate_download_url(url).is_ok())
            .map(|url| NewImageDownload {
                creative_id: Some(creative.id),
                target_path: images::target_path(&self.asset_root, &url),
                url,
            })
            .collect();
        if !downloads.is_empty() {
            self.ledger.enqueue_images(&downloads).await?;
        }

        let finished = self
            .ledger
            .complete_generation_task(task.id, &artifact.asset_id, Some(creative.id))
            .await?;
        tracing::info!(
            task_id = task.id,
            creative_id = creative.id,
            asset_id = %artifact.asset_id,
            images = downloads.len(),
            "Generation task completed",
        );
        Ok(finished)
    }
}
