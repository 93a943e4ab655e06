//! Image download queue: batch claims with per-item isolation.
//!
//! Each `process_batch` call claims up to the configured batch size,
//! downloads every item independently, and records per-item retry
//! accounting. One item failing never aborts the batch.

use std::path::Path;
use std::sync::Arc;

use cadence_core::media;
use cadence_core::types::DbId;
use cadence_store::models::{ImageDownloadQueueItem, ImageQueueStats, NewImageDownload};
use cadence_store::Ledger;
use sha2::{Digest, Sha256};

use crate::collaborators::AssetFetcher;
use crate::error::{EngineError, EngineResult};

/// Stable on-disk path for a source URL: sha256 of the URL plus a
/// best-guess extension, under the asset root.
pub fn target_path(asset_root: &str, url: &str) -> String {
    let hash = Sha256::digest(url.as_bytes());
    let ext = media::guess_extension_from_url(url);
    format!("{asset_root}/{hash:x}.{ext}")
}

/// What one `process_batch` call did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub claimed: usize,
    pub downloaded: usize,
    pub failed: usize,
    pub requeued: usize,
}

#[derive(Clone)]
pub struct ImageQueue {
    ledger: Arc<dyn Ledger>,
    fetcher: Arc<dyn AssetFetcher>,
    asset_root: String,
    batch_size: i64,
    max_attempts: i32,
}

impl ImageQueue {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        fetcher: Arc<dyn AssetFetcher>,
        asset_root: String,
        batch_size: i64,
        max_attempts: i32,
    ) -> Self {
        Self {
            ledger,
            fetcher,
            asset_root,
            batch_size,
            max_attempts,
        }
    }

    /// Queue downloads for every valid URL in a media-URL list.
    pub async fn enqueue(
        &self,
        creative_id: Option<DbId>,
        media_urls: &str,
    ) -> EngineResult<Vec<ImageDownloadQueueItem>> {
        let items: Vec<NewImageDownload> = media::split_media_urls(media_urls)
            .into_iter()
            .filter(|url| match media::validate_download_url(url) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Skipping invalid download URL");
                    false
                }
            })
            .map(|url| NewImageDownload {
                creative_id,
                target_path: target_path(&self.asset_root, &url),
                url,
            })
            .collect();
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let inserted = self.ledger.enqueue_images(&items).await?;
        tracing::info!(
            creative_id = creative_id.unwrap_or(0),
            queued = inserted.len(),
            skipped = items.len() - inserted.len(),
            "Image downloads queued",
        );
        Ok(inserted)
    }

    /// Claim and process one batch. Returns per-batch counts; an empty
    /// claim yields a zeroed report.
    pub async fn process_batch(&self) -> EngineResult<BatchReport> {
        let batch = self.ledger.claim_image_batch(self.batch_size).await?;
        let mut report = BatchReport {
            claimed: batch.len(),
            ..BatchReport::default()
        };
        if batch.is_empty() {
            return Ok(report);
        }
        tracing::debug!(claimed = batch.len(), "Image batch claimed");

        for item in batch {
            match self.download_item(&item).await {
                Ok(()) => match self.ledger.complete_image(item.id).await {
                    Ok(_) => report.downloaded += 1,
                    Err(e) => {
                        // A store error on one item (e.g. losing the
                        // finalize race to a peer) must not strand the
                        // rest of the claimed batch.
                        report.failed += 1;
                        tracing::error!(item_id = item.id, url = %item.url, error = %e, "Failed to record image completion");
                    }
                },
                Err(e) => {
                    // Attempts on the row are pre-failure; this failure
                    // makes it attempts + 1.
                    let terminal = item.attempts + 1 >= self.max_attempts;
                    match self.ledger.fail_image(item.id, &e.to_string(), terminal).await {
                        Ok(_) if terminal => {
                            report.failed += 1;
                            tracing::error!(item_id = item.id, url = %item.url, error = %e, "Image download failed permanently");
                        }
                        Ok(_) => {
                            report.requeued += 1;
                            tracing::warn!(item_id = item.id, url = %item.url, error = %e, "Image download failed, requeued");
                        }
                        Err(store_err) => {
                            report.failed += 1;
                            tracing::error!(item_id = item.id, url = %item.url, error = %store_err, "Failed to record image failure");
                        }
                    }
                }
            }
        }
        tracing::info!(
            claimed = report.claimed,
            downloaded = report.downloaded,
            failed = report.failed,
            requeued = report.requeued,
            "Image batch processed",
        );
        Ok(report)
    }

    pub async fn stats(&self) -> EngineResult<ImageQueueStats> {
        Ok(self.ledger.image_queue_stats().await?)
    }

    async fn download_item(&self, item: &ImageDownloadQueueItem) -> EngineResult<()> {
        let bytes = self.fetcher.fetch(&item.url).await?;
        if let Some(parent) = Path::new(&item.target_path).parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EngineError::Transient(format!("create asset dir failed: {e}")))?;
        }
        tokio::fs::write(&item.target_path, &bytes)
            .await
            .map_err(|e| EngineError::Transient(format!("write asset failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_path_is_stable_per_url() {
        let a = target_path("/assets", "https://cdn.test/a.png");
        let b = target_path("/assets", "https://cdn.test/a.png");
        let c = target_path("/assets", "https://cdn.test/b.png");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("/assets/"));
        assert!(a.ends_with(".png"));
    }

    #[test]
    fn target_path_defaults_extension() {
        let p = target_path("/assets", "https://cdn.test/opaque");
        assert!(p.ends_with(".webp"));
    }
}
