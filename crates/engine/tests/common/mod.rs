#![allow(dead_code)]

//! Shared mocks and wiring for engine integration tests.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cadence_engine::{
    AssetFetcher, AutomationDriver, EngineConfig, EngineError, EngineResult, GeneratedArtifact,
    GenerationProvider, GenerationQueue, ImageQueue, PublishPayload, PublishQueue, PublishReceipt,
    Scheduler,
};
use cadence_store::models::GenerationTask;
use cadence_store::{Ledger, MemLedger};
use tokio::sync::Mutex;

static DIR_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Fresh per-test directory for downloaded assets.
pub fn temp_asset_root() -> PathBuf {
    let seq = DIR_SEQ.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("cadence-engine-test-{}-{seq}", std::process::id()))
}

// ---------------------------------------------------------------------------
// Generation provider mock
// ---------------------------------------------------------------------------

/// Scripted provider outcome. An empty script means success.
pub enum ProviderScript {
    Ok,
    Fail(String),
}

pub struct MockProvider {
    script: Mutex<VecDeque<ProviderScript>>,
    /// prompt substring -> error message, checked before the script.
    /// Deterministic even when executions run concurrently.
    prompt_failures: Mutex<Vec<(String, String)>>,
    /// Artificial latency applied to every call.
    pub delay: Duration,
    /// media_urls placed on every successful artifact.
    pub media_urls: String,
    pub calls: AtomicUsize,
    seq: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            prompt_failures: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            media_urls: String::new(),
            calls: AtomicUsize::new(0),
            seq: AtomicUsize::new(0),
        }
    }

    /// Fail every call whose prompt contains `needle`.
    pub async fn fail_for_prompt(&self, needle: &str, message: &str) {
        self.prompt_failures
            .lock()
            .await
            .push((needle.to_string(), message.to_string()));
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_media_urls(mut self, media_urls: &str) -> Self {
        self.media_urls = media_urls.to_string();
        self
    }

    pub async fn push(&self, outcome: ProviderScript) {
        self.script.lock().await.push_back(outcome);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for MockProvider {
    async fn generate(&self, task: &GenerationTask) -> EngineResult<GeneratedArtifact> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        {
            let failures = self.prompt_failures.lock().await;
            if let Some((_, message)) = failures
                .iter()
                .find(|(needle, _)| task.prompt.contains(needle.as_str()))
            {
                return Err(EngineError::Transient(message.clone()));
            }
        }
        let scripted = self.script.lock().await.pop_front();
        match scripted.unwrap_or(ProviderScript::Ok) {
            ProviderScript::Ok => {
                let seq = self.seq.fetch_add(1, Ordering::SeqCst);
                Ok(GeneratedArtifact {
                    asset_id: format!("asset-{seq}"),
                    title: format!("Idea {seq}"),
                    content: format!("Generated for: {}", task.prompt),
                    tags: "tag1,tag2".to_string(),
                    media_urls: self.media_urls.clone(),
                })
            }
            ProviderScript::Fail(message) => Err(EngineError::Transient(message)),
        }
    }
}

// ---------------------------------------------------------------------------
// Automation driver mock
// ---------------------------------------------------------------------------

pub struct MockDriver {
    /// Scripted outcomes; empty means success.
    script: Mutex<VecDeque<Result<Option<String>, String>>>,
    /// Artificial latency applied to every call.
    pub delay: Duration,
    pub calls: AtomicUsize,
    seq: AtomicUsize,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            seq: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub async fn push_failure(&self, message: &str) {
        self.script.lock().await.push_back(Err(message.to_string()));
    }

    pub async fn push_success(&self, note_id: Option<&str>) {
        self.script
            .lock()
            .await
            .push_back(Ok(note_id.map(str::to_string)));
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AutomationDriver for MockDriver {
    async fn publish(&self, _payload: &PublishPayload) -> EngineResult<PublishReceipt> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = self.script.lock().await.pop_front();
        match scripted {
            Some(Ok(note_id)) => Ok(PublishReceipt { note_id }),
            Some(Err(message)) => Err(EngineError::Transient(message)),
            None => {
                let seq = self.seq.fetch_add(1, Ordering::SeqCst);
                Ok(PublishReceipt {
                    note_id: Some(format!("note-{seq}")),
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Asset fetcher mock
// ---------------------------------------------------------------------------

pub struct MockFetcher {
    /// url -> remaining failures before success.
    failures: Mutex<HashMap<String, usize>>,
    pub calls: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            failures: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Make `url` fail the next `count` fetches.
    pub async fn fail_times(&self, url: &str, count: usize) {
        self.failures.lock().await.insert(url.to_string(), count);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> EngineResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut failures = self.failures.lock().await;
        if let Some(remaining) = failures.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(EngineError::Transient(format!("fetch failed: {url}")));
            }
        }
        Ok(b"image-bytes".to_vec())
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

pub struct TestEngine {
    pub ledger: Arc<MemLedger>,
    pub scheduler: Scheduler,
    pub provider: Arc<MockProvider>,
    pub driver: Arc<MockDriver>,
    pub fetcher: Arc<MockFetcher>,
    pub asset_root: PathBuf,
}

/// Wire a full scheduler over a fresh in-memory ledger and mocks.
pub fn build_engine(config: EngineConfig, provider: MockProvider) -> TestEngine {
    let ledger = Arc::new(MemLedger::new());
    let provider = Arc::new(provider);
    let driver = Arc::new(MockDriver::new());
    let fetcher = Arc::new(MockFetcher::new());
    let asset_root = temp_asset_root();
    let asset_root_str = asset_root.to_string_lossy().to_string();

    let dyn_ledger: Arc<dyn Ledger> = ledger.clone();
    let generation = GenerationQueue::new(
        dyn_ledger.clone(),
        provider.clone(),
        config.provider_timeout,
        asset_root_str.clone(),
    );
    let publish = PublishQueue::new(
        dyn_ledger.clone(),
        driver.clone(),
        config.driver_timeout,
        config.publish_retry_policy(),
    );
    let images = ImageQueue::new(
        dyn_ledger.clone(),
        fetcher.clone(),
        asset_root_str,
        config.image_batch_size,
        config.image_max_attempts,
    );
    let scheduler = Scheduler::new(dyn_ledger, generation, publish, images, config);

    TestEngine {
        ledger,
        scheduler,
        provider,
        driver,
        fetcher,
        asset_root,
    }
}
