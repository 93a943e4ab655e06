//! Generation queue behavior: fire-and-poll, terminal writes, and the
//! creative/publish/image fan-out on success.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use cadence_core::error::CoreError;
use cadence_core::status;
use cadence_engine::{EngineError, GenerationQueue};
use cadence_store::models::NewGenerationTask;
use cadence_store::{Ledger, MemLedger};
use chrono::Utc;

use common::{MockProvider, ProviderScript};

fn queue_with(provider: MockProvider, timeout: Duration) -> (Arc<MemLedger>, GenerationQueue) {
    let ledger = Arc::new(MemLedger::new());
    let dyn_ledger: Arc<dyn Ledger> = ledger.clone();
    let queue = GenerationQueue::new(
        dyn_ledger,
        Arc::new(provider),
        timeout,
        common::temp_asset_root().to_string_lossy().to_string(),
    );
    (ledger, queue)
}

fn request(prompt: &str) -> NewGenerationTask {
    NewGenerationTask {
        prompt: prompt.to_string(),
        model: "default".to_string(),
        topic_id: None,
        template_key: None,
    }
}

#[tokio::test]
async fn empty_prompt_is_rejected() {
    let (_ledger, queue) = queue_with(MockProvider::new(), Duration::from_secs(5));
    let result = queue.enqueue(&request("   ")).await;
    assert_matches!(result, Err(EngineError::Core(CoreError::Validation(_))));
}

#[tokio::test]
async fn identical_requests_get_independent_tasks() {
    let (_ledger, queue) = queue_with(MockProvider::new(), Duration::from_secs(5));

    let first = queue.enqueue(&request("same prompt")).await.unwrap();
    let second = queue.enqueue(&request("same prompt")).await.unwrap();
    assert_ne!(first.id, second.id);

    queue.process_next().await.unwrap().unwrap();
    queue.process_next().await.unwrap().unwrap();

    let first = queue.get(first.id).await.unwrap();
    let second = queue.get(second.id).await.unwrap();
    assert_eq!(first.status, status::GEN_COMPLETED);
    assert_eq!(second.status, status::GEN_COMPLETED);
    // Independent artifacts, not a shared one.
    assert_ne!(first.result_asset_id, second.result_asset_id);
}

#[tokio::test]
async fn success_produces_creative_publish_record_and_image_items() {
    let provider =
        MockProvider::new().with_media_urls("https://cdn.test/a.png,https://cdn.test/b.png");
    let (ledger, queue) = queue_with(provider, Duration::from_secs(5));

    let task = queue.enqueue(&request("coffee shops")).await.unwrap();
    let finished = queue.process_next().await.unwrap().unwrap();
    assert_eq!(finished.id, task.id);
    assert_eq!(finished.status, status::GEN_COMPLETED);

    let creative_id = finished.creative_id.expect("creative linked");
    let creative = ledger.get_creative(creative_id).await.unwrap();
    assert!(!creative.title.is_empty());
    assert!(creative.content.contains("coffee shops"));

    // A pending publish record was opened for the creative.
    let record = ledger
        .claim_next_publish_record(Utc::now())
        .await
        .unwrap()
        .expect("publish record queued");
    assert_eq!(record.creative_id, creative_id);

    // Both referenced images were queued for download.
    let stats = ledger.image_queue_stats().await.unwrap();
    assert_eq!(stats.pending, 2);
}

#[tokio::test]
async fn provider_failure_is_terminal_with_message() {
    let provider = MockProvider::new();
    provider
        .push(ProviderScript::Fail("model unavailable".to_string()))
        .await;
    let (_ledger, queue) = queue_with(provider, Duration::from_secs(5));
    let task = queue.enqueue(&request("will fail")).await.unwrap();

    let finished = queue.process_next().await.unwrap().unwrap();
    assert_eq!(finished.id, task.id);
    assert_eq!(finished.status, status::GEN_FAILED);
    assert_eq!(finished.error_message.as_deref(), Some("transient: model unavailable"));
    assert!(finished.creative_id.is_none());
}

#[tokio::test]
async fn slow_provider_times_out() {
    let provider = MockProvider::new().with_delay(Duration::from_secs(5));
    let (_ledger, queue) = queue_with(provider, Duration::from_millis(50));
    let task = queue.enqueue(&request("slow")).await.unwrap();

    let finished = queue.process_next().await.unwrap().unwrap();
    assert_eq!(finished.id, task.id);
    assert_eq!(finished.status, status::GEN_FAILED);
    assert!(finished.error_message.unwrap().contains("timed out"));
}

#[tokio::test]
async fn empty_queue_is_a_noop() {
    let (_ledger, queue) = queue_with(MockProvider::new(), Duration::from_secs(5));
    assert!(queue.process_next().await.unwrap().is_none());
}
