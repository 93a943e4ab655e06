//! Production HTTP implementations of the collaborator traits.
//!
//! Wraps the generation provider and the automation driver behind
//! [`reqwest`], and fetches image assets with a size cap. All failures
//! surface as [`EngineError::Transient`] so the queues apply their
//! normal retry accounting.

use std::time::Duration;

use async_trait::async_trait;
use cadence_store::models::GenerationTask;
use serde_json::json;

use crate::collaborators::{
    AssetFetcher, AutomationDriver, GeneratedArtifact, GenerationProvider, PublishPayload,
    PublishReceipt,
};
use crate::error::{EngineError, EngineResult};

/// Hard cap on a single downloaded asset (15 MiB).
pub const MAX_DOWNLOAD_BYTES: u64 = 15 * 1024 * 1024;

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

async fn error_for_status(response: reqwest::Response) -> EngineResult<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(EngineError::Transient(format!("HTTP {status}: {body}")))
}

// ---------------------------------------------------------------------------
// Generation provider
// ---------------------------------------------------------------------------

/// HTTP client for the external generation provider.
pub struct HttpGenerationProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGenerationProvider {
    /// * `base_url` - e.g. `http://host:8188`.
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            base_url,
        }
    }
}

#[async_trait]
impl GenerationProvider for HttpGenerationProvider {
    async fn generate(&self, task: &GenerationTask) -> EngineResult<GeneratedArtifact> {
        let body = json!({
            "prompt": task.prompt,
            "model": task.model,
            "template_key": task.template_key,
        });
        let response = self
            .client
            .post(format!("{}/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Transient(format!("provider request failed: {e}")))?;
        let response = error_for_status(response).await?;
        response
            .json::<GeneratedArtifact>()
            .await
            .map_err(|e| EngineError::Transient(format!("provider returned bad payload: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Automation driver
// ---------------------------------------------------------------------------

/// HTTP client for the automation driver that owns the platform session.
pub struct HttpAutomationDriver {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAutomationDriver {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            base_url,
        }
    }
}

#[async_trait]
impl AutomationDriver for HttpAutomationDriver {
    async fn publish(&self, payload: &PublishPayload) -> EngineResult<PublishReceipt> {
        let response = self
            .client
            .post(format!("{}/publish", self.base_url))
            .json(payload)
            .send()
            .await
            .map_err(|e| EngineError::Transient(format!("driver request failed: {e}")))?;
        let response = error_for_status(response).await?;
        response
            .json::<PublishReceipt>()
            .await
            .map_err(|e| EngineError::Transient(format!("driver returned bad payload: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Asset fetcher
// ---------------------------------------------------------------------------

/// Downloads image assets with a size cap and plain-http upgrade.
pub struct HttpAssetFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpAssetFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            max_bytes: MAX_DOWNLOAD_BYTES,
        }
    }

    /// CDNs used by the upstream platform serve the same path over TLS.
    fn upgrade_url(url: &str) -> String {
        match url.strip_prefix("http://") {
            Some(rest) => format!("https://{rest}"),
            None => url.to_string(),
        }
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, url: &str) -> EngineResult<Vec<u8>> {
        let url = Self::upgrade_url(url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::Transient(format!("download failed: {e}")))?;
        let response = error_for_status(response).await?;

        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                return Err(EngineError::Transient(format!(
                    "asset too large: {length} bytes (cap {})",
                    self.max_bytes
                )));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| EngineError::Transient(format!("download body failed: {e}")))?;
        if bytes.len() as u64 > self.max_bytes {
            return Err(EngineError::Transient(format!(
                "asset too large: {} bytes (cap {})",
                bytes.len(),
                self.max_bytes
            )));
        }
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_http_is_upgraded() {
        assert_eq!(
            HttpAssetFetcher::upgrade_url("http://cdn.test/a.png"),
            "https://cdn.test/a.png"
        );
    }

    #[test]
    fn https_is_untouched() {
        assert_eq!(
            HttpAssetFetcher::upgrade_url("https://cdn.test/a.png"),
            "https://cdn.test/a.png"
        );
    }
}
