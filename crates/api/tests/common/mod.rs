//! Shared test harness: the full production router over an in-memory
//! ledger and stub collaborators.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use cadence_api::config::ServerConfig;
use cadence_api::router::build_app_router;
use cadence_api::state::AppState;
use cadence_engine::{
    AssetFetcher, AutomationDriver, EngineConfig, GeneratedArtifact, GenerationProvider,
    GenerationQueue, ImageQueue, PublishPayload, PublishQueue, PublishReceipt, Scheduler,
};
use cadence_store::models::GenerationTask;
use cadence_store::{Ledger, MemLedger};

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
    }
}

/// Generation stub: always succeeds with a numbered artifact.
pub struct StubProvider {
    seq: AtomicUsize,
    delay: Duration,
}

impl StubProvider {
    pub fn new() -> Self {
        Self {
            seq: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            seq: AtomicUsize::new(0),
            delay,
        }
    }
}

#[async_trait]
impl GenerationProvider for StubProvider {
    async fn generate(&self, _task: &GenerationTask) -> cadence_engine::EngineResult<GeneratedArtifact> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let n = self.seq.fetch_add(1, Ordering::SeqCst);
        Ok(GeneratedArtifact {
            asset_id: format!("asset-{n}"),
            title: format!("Idea {n}"),
            content: "generated body".to_string(),
            tags: "test".to_string(),
            media_urls: String::new(),
        })
    }
}

/// Driver stub: always reports a successful delivery.
pub struct StubDriver;

#[async_trait]
impl AutomationDriver for StubDriver {
    async fn publish(&self, payload: &PublishPayload) -> cadence_engine::EngineResult<PublishReceipt> {
        Ok(PublishReceipt {
            note_id: Some(format!("note-{}", payload.creative_id)),
        })
    }
}

/// Fetcher stub: every URL resolves to the same bytes.
pub struct StubFetcher;

#[async_trait]
impl AssetFetcher for StubFetcher {
    async fn fetch(&self, _url: &str) -> cadence_engine::EngineResult<Vec<u8>> {
        Ok(b"image-bytes".to_vec())
    }
}

/// Everything a test needs: the router plus direct handles for
/// seeding and asserting against the same ledger the API serves.
pub struct TestApp {
    pub app: Router,
    pub ledger: Arc<MemLedger>,
    pub scheduler: Scheduler,
}

/// Build the full application router with all middleware layers over an
/// in-memory ledger. Mirrors the wiring in `main.rs` so tests exercise
/// the same middleware stack production uses.
pub fn build_test_app() -> TestApp {
    build_test_app_with_provider(Arc::new(StubProvider::new()))
}

pub fn build_test_app_with_provider(provider: Arc<dyn GenerationProvider>) -> TestApp {
    let config = test_config();
    let engine_config = EngineConfig::default();

    let mem = Arc::new(MemLedger::new());
    let ledger: Arc<dyn Ledger> = Arc::clone(&mem) as Arc<dyn Ledger>;

    let asset_root = std::env::temp_dir()
        .join(format!("cadence-api-test-{}", std::process::id()))
        .to_string_lossy()
        .into_owned();

    let generation = GenerationQueue::new(
        Arc::clone(&ledger),
        provider,
        engine_config.provider_timeout,
        asset_root.clone(),
    );
    let publish = PublishQueue::new(
        Arc::clone(&ledger),
        Arc::new(StubDriver),
        engine_config.driver_timeout,
        engine_config.publish_retry_policy(),
    );
    let images = ImageQueue::new(
        Arc::clone(&ledger),
        Arc::new(StubFetcher),
        asset_root,
        engine_config.image_batch_size,
        engine_config.image_max_attempts,
    );
    let scheduler = Scheduler::new(
        Arc::clone(&ledger),
        generation.clone(),
        publish.clone(),
        images.clone(),
        engine_config,
    );

    let state = AppState {
        ledger,
        scheduler: scheduler.clone(),
        generation,
        publish,
        images,
        config: Arc::new(config.clone()),
        pool: None,
    };

    TestApp {
        app: build_app_router(state, &config),
        ledger: mem,
        scheduler,
    }
}
