use std::time::Duration;

use cadence_core::retry::RetryPolicy;

/// Engine configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Scheduler evaluation interval.
    pub tick_interval: Duration,
    /// Consecutive failures after which an AutoTask is auto-paused.
    pub auto_pause_threshold: i32,
    /// Cool-down after the first failed publish attempt.
    pub publish_backoff_base_secs: i64,
    /// Upper bound on the publish cool-down.
    pub publish_backoff_cap_secs: i64,
    /// Maximum publish attempts before a record is finalized as failed.
    pub publish_max_attempts: u32,
    /// Items claimed per image-download batch.
    pub image_batch_size: i64,
    /// Maximum download attempts per image item.
    pub image_max_attempts: i32,
    /// Generation workers allowed to run concurrently.
    pub worker_parallelism: usize,
    /// Timeout for a single generation provider call.
    pub provider_timeout: Duration,
    /// Timeout for a single automation-driver delivery.
    pub driver_timeout: Duration,
    /// Timeout for a single image download.
    pub download_timeout: Duration,
    /// Directory downloaded assets are written under.
    pub asset_root: String,
    /// Generation provider base URL.
    pub provider_url: String,
    /// Automation driver base URL.
    pub driver_url: String,
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                  |
    /// |-----------------------------|--------------------------|
    /// | `TICK_INTERVAL_SECS`        | `60`                     |
    /// | `AUTO_PAUSE_THRESHOLD`      | `5`                      |
    /// | `PUBLISH_BACKOFF_BASE_SECS` | `60`                     |
    /// | `PUBLISH_BACKOFF_CAP_SECS`  | `3600`                   |
    /// | `PUBLISH_MAX_ATTEMPTS`      | `3`                      |
    /// | `IMAGE_BATCH_SIZE`          | `10`                     |
    /// | `IMAGE_MAX_ATTEMPTS`        | `3`                      |
    /// | `WORKER_PARALLELISM`        | `1`                      |
    /// | `PROVIDER_TIMEOUT_SECS`     | `120`                    |
    /// | `DRIVER_TIMEOUT_SECS`       | `120`                    |
    /// | `DOWNLOAD_TIMEOUT_SECS`     | `30`                     |
    /// | `ASSET_ROOT`                | `./assets`               |
    /// | `PROVIDER_URL`              | `http://localhost:8188`  |
    /// | `DRIVER_URL`                | `http://localhost:9222`  |
    pub fn from_env() -> Self {
        Self {
            tick_interval: Duration::from_secs(env_u64("TICK_INTERVAL_SECS", 60)),
            auto_pause_threshold: env_u64("AUTO_PAUSE_THRESHOLD", 5) as i32,
            publish_backoff_base_secs: env_u64("PUBLISH_BACKOFF_BASE_SECS", 60) as i64,
            publish_backoff_cap_secs: env_u64("PUBLISH_BACKOFF_CAP_SECS", 3600) as i64,
            publish_max_attempts: env_u64("PUBLISH_MAX_ATTEMPTS", 3) as u32,
            image_batch_size: env_u64("IMAGE_BATCH_SIZE", 10) as i64,
            image_max_attempts: env_u64("IMAGE_MAX_ATTEMPTS", 3) as i32,
            worker_parallelism: env_u64("WORKER_PARALLELISM", 1).max(1) as usize,
            provider_timeout: Duration::from_secs(env_u64("PROVIDER_TIMEOUT_SECS", 120)),
            driver_timeout: Duration::from_secs(env_u64("DRIVER_TIMEOUT_SECS", 120)),
            download_timeout: Duration::from_secs(env_u64("DOWNLOAD_TIMEOUT_SECS", 30)),
            asset_root: std::env::var("ASSET_ROOT").unwrap_or_else(|_| "./assets".into()),
            provider_url: std::env::var("PROVIDER_URL")
                .unwrap_or_else(|_| "http://localhost:8188".into()),
            driver_url: std::env::var("DRIVER_URL")
                .unwrap_or_else(|_| "http://localhost:9222".into()),
        }
    }

    /// Retry curve applied to failed publish attempts.
    pub fn publish_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            chrono::Duration::seconds(self.publish_backoff_base_secs),
            chrono::Duration::seconds(self.publish_backoff_cap_secs),
            self.publish_max_attempts,
        )
    }
}

impl Default for EngineConfig {
    /// Built-in defaults without touching the environment. Used by tests.
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            auto_pause_threshold: 5,
            publish_backoff_base_secs: 60,
            publish_backoff_cap_secs: 3600,
            publish_max_attempts: 3,
            image_batch_size: 10,
            image_max_attempts: 3,
            worker_parallelism: 1,
            provider_timeout: Duration::from_secs(120),
            driver_timeout: Duration::from_secs(120),
            download_timeout: Duration::from_secs(30),
            asset_root: "./assets".into(),
            provider_url: "http://localhost:8188".into(),
            driver_url: "http://localhost:9222".into(),
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid u64")),
        Err(_) => default,
    }
}
