//! External collaborator seams.
//!
//! The engine never talks to the generation provider, the automation
//! driver, or the asset CDN directly; it goes through these traits so
//! production can plug in HTTP clients and tests can plug in mocks.

use async_trait::async_trait;
use cadence_core::types::DbId;
use cadence_store::models::GenerationTask;
use serde::{Deserialize, Serialize};

use crate::error::EngineResult;

/// Artifact returned by a successful generation call.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedArtifact {
    /// Provider-side identifier of the stored asset.
    pub asset_id: String,
    pub title: String,
    pub content: String,
    /// Comma-separated tag list.
    pub tags: String,
    /// Comma/newline-separated image URLs referenced by the content.
    pub media_urls: String,
}

/// What the automation driver delivers to the external platform.
#[derive(Debug, Clone, Serialize)]
pub struct PublishPayload {
    pub creative_id: DbId,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub media_urls: Vec<String>,
}

/// Receipt returned by the driver on successful delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishReceipt {
    /// Remote identifier of the published note, when the platform
    /// reports one.
    pub note_id: Option<String>,
}

/// Fulfils generation requests. Calls may be slow; the queue wraps them
/// in a timeout.
#[async_trait]
pub trait GenerationProvider: Send + Sync + 'static {
    async fn generate(&self, task: &GenerationTask) -> EngineResult<GeneratedArtifact>;
}

/// Delivers a finished creative to the external platform.
///
/// Implementations are assumed to own a single exclusive session; the
/// publish queue guarantees at most one in-flight call.
#[async_trait]
pub trait AutomationDriver: Send + Sync + 'static {
    async fn publish(&self, payload: &PublishPayload) -> EngineResult<PublishReceipt>;
}

/// Fetches one remote asset into memory.
#[async_trait]
pub trait AssetFetcher: Send + Sync + 'static {
    async fn fetch(&self, url: &str) -> EngineResult<Vec<u8>>;
}
