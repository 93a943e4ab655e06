//! Publish queue: serialized delivery with bounded retries.
//!
//! `process_next` claims the single oldest eligible pending record via
//! the ledger's pending→publishing compare-and-set, so any number of
//! concurrent or redundant invocations agree on one owner; the losers
//! observe an empty claim and return [`PublishOutcome::Idle`].

use std::sync::Arc;
use std::time::Duration;

use cadence_core::error::CoreError;
use cadence_core::media;
use cadence_core::retry::RetryPolicy;
use cadence_core::types::DbId;
use cadence_store::models::{Creative, PublishRecord};
use cadence_store::Ledger;
use chrono::Utc;

use crate::collaborators::{AutomationDriver, PublishPayload};
use crate::error::{EngineError, EngineResult};

/// Result of one publish step.
#[derive(Debug)]
pub enum PublishOutcome {
    /// No eligible pending record; nothing happened.
    Idle,
    /// Delivery succeeded.
    Published(PublishRecord),
    /// Delivery failed; the record returned to pending with a cool-down.
    Retrying(PublishRecord),
    /// Delivery failed and the attempt budget is spent. Terminal.
    Exhausted(PublishRecord),
}

#[derive(Clone)]
pub struct PublishQueue {
    ledger: Arc<dyn Ledger>,
    driver: Arc<dyn AutomationDriver>,
    driver_timeout: Duration,
    policy: RetryPolicy,
}

impl PublishQueue {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        driver: Arc<dyn AutomationDriver>,
        driver_timeout: Duration,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            ledger,
            driver,
            driver_timeout,
            policy,
        }
    }

    /// Open a pending record for a creative.
    pub async fn enqueue(&self, creative_id: DbId) -> EngineResult<PublishRecord> {
        let record = self.ledger.create_publish_record(creative_id).await?;
        tracing::info!(record_id = record.id, creative_id, "Publish record queued");
        Ok(record)
    }

    pub async fn get(&self, id: DbId) -> EngineResult<PublishRecord> {
        Ok(self.ledger.get_publish_record(id).await?)
    }

    /// One publish step: claim, deliver, finalize.
    pub async fn process_next(&self) -> EngineResult<PublishOutcome> {
        let now = Utc::now();
        let Some(record) = self.ledger.claim_next_publish_record(now).await? else {
            return Ok(PublishOutcome::Idle);
        };
        tracing::debug!(record_id = record.id, attempts = record.attempts, "Publish record claimed");

        let creative = self.ledger.get_creative(record.creative_id).await?;
        if let Err(e) = assert_publishable(&creative) {
            // Malformed content never becomes deliverable; fail now
            // rather than burning driver attempts.
            let failed = self
                .ledger
                .record_publish_failure(record.id, &e.to_string(), now, None, true)
                .await?;
            tracing::warn!(record_id = record.id, error = %e, "Creative not publishable");
            return Ok(PublishOutcome::Exhausted(failed));
        }

        let payload = PublishPayload {
            creative_id: creative.id,
            title: creative.title.clone(),
            content: creative.content.clone(),
            tags: media::split_media_urls(&creative.tags),
            media_urls: media::split_media_urls(&creative.media_urls),
        };

        let outcome = tokio::time::timeout(self.driver_timeout, self.driver.publish(&payload));
        let error = match outcome.await {
            Ok(Ok(receipt)) => {
                let published = self
                    .ledger
                    .mark_published(record.id, receipt.note_id.as_deref(), Utc::now())
                    .await?;
                tracing::info!(
                    record_id = record.id,
                    creative_id = creative.id,
                    note_id = receipt.note_id.as_deref().unwrap_or(""),
                    "Creative published",
                );
                return Ok(PublishOutcome::Published(published));
            }
            Ok(Err(e)) => e,
            Err(_) => EngineError::Transient(format!(
                "driver timed out after {}s",
                self.driver_timeout.as_secs()
            )),
        };

        // The attempt itself may have taken longer than the backoff
        // delay; the cool-down is anchored at the failure instant, not
        // the claim, so the next eligibility is always in the future.
        let failed_at = Utc::now();
        let attempts = record.attempts as u32 + 1;
        if self.policy.is_exhausted(attempts) {
            let failed = self
                .ledger
                .record_publish_failure(record.id, &error.to_string(), failed_at, None, true)
                .await?;
            tracing::error!(
                record_id = record.id,
                attempts,
                error = %error,
                "Publish attempts exhausted",
            );
            Ok(PublishOutcome::Exhausted(failed))
        } else {
            let next_attempt_at = self.policy.eligible_at(failed_at, attempts);
            let retrying = self
                .ledger
                .record_publish_failure(
                    record.id,
                    &error.to_string(),
                    failed_at,
                    Some(next_attempt_at),
                    false,
                )
                .await?;
            tracing::warn!(
                record_id = record.id,
                attempts,
                retry_at = %next_attempt_at,
                error = %error,
                "Publish attempt failed, will retry",
            );
            Ok(PublishOutcome::Retrying(retrying))
        }
    }
}

/// A creative must carry a title and body before it can go out.
fn assert_publishable(creative: &Creative) -> Result<(), CoreError> {
    if creative.title.trim().is_empty() {
        return Err(CoreError::Validation(format!(
            "Creative {} has no title",
            creative.id
        )));
    }
    if creative.content.trim().is_empty() {
        return Err(CoreError::Validation(format!(
            "Creative {} has no content",
            creative.id
        )));
    }
    Ok(())
}
