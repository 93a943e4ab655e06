//! AutoTask entity: a user-defined recurring job definition.

use cadence_core::task_config::TaskConfig;
use cadence_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `auto_tasks` table.
///
/// Config fields are stored column-per-field; use [`AutoTask::config`] to
/// view them as a [`TaskConfig`].
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AutoTask {
    pub id: DbId,
    pub theme_id: Option<DbId>,
    pub name: String,
    /// Recurrence expression, validated at creation time.
    pub schedule: String,
    pub goal: String,
    pub persona: Option<String>,
    pub tone: Option<String>,
    pub prompt_profile_id: Option<DbId>,
    pub image_model: Option<String>,
    pub output_count: i32,
    pub min_quality_score: Option<f64>,
    pub status: String,
    pub last_run_at: Option<Timestamp>,
    pub next_run_at: Timestamp,
    pub total_runs: i64,
    pub successful_runs: i64,
    /// Failures since the last success; drives auto-pause.
    pub consecutive_failures: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl AutoTask {
    /// View the flattened config columns as a [`TaskConfig`].
    pub fn config(&self) -> TaskConfig {
        TaskConfig {
            goal: self.goal.clone(),
            persona: self.persona.clone(),
            tone: self.tone.clone(),
            prompt_profile_id: self.prompt_profile_id,
            image_model: self.image_model.clone(),
            output_count: self.output_count,
            min_quality_score: self.min_quality_score,
        }
    }
}

/// DTO for creating an AutoTask.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAutoTask {
    pub name: String,
    pub theme_id: Option<DbId>,
    /// Recurrence expression (`every N minutes` or 5-field cron).
    pub schedule: String,
    pub config: TaskConfig,
}
