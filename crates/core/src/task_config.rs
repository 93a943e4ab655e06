//! Per-task generation/publish configuration and its validation.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

/// Maximum length of a task name.
const MAX_NAME_LEN: usize = 128;

/// Maximum creatives a single execution may produce.
const MAX_OUTPUT_COUNT: i32 = 20;

/// Generation/publish configuration carried by an AutoTask.
///
/// Flattened into the task row column-per-field; the engine reads it when
/// building generation prompts and quality gates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Optimization goal (e.g. "collects", "follows").
    pub goal: String,
    /// Target audience persona, free text.
    pub persona: Option<String>,
    /// Writing tone, free text.
    pub tone: Option<String>,
    /// Prompt profile to render the generation prompt with.
    pub prompt_profile_id: Option<DbId>,
    /// Image model requested from the generation provider.
    pub image_model: Option<String>,
    /// Number of creatives to produce per execution.
    pub output_count: i32,
    /// Minimum acceptable quality score in `0.0..=1.0`.
    pub min_quality_score: Option<f64>,
}

impl TaskConfig {
    /// Validate all config fields.
    ///
    /// Rules:
    /// - `goal` must not be empty.
    /// - `output_count` must be in `1..=MAX_OUTPUT_COUNT`.
    /// - `min_quality_score`, when present, must be in `0.0..=1.0`.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.goal.trim().is_empty() {
            return Err(CoreError::Validation(
                "Task config: goal must not be empty".to_string(),
            ));
        }
        if self.output_count < 1 || self.output_count > MAX_OUTPUT_COUNT {
            return Err(CoreError::Validation(format!(
                "Task config: output_count must be in 1..={MAX_OUTPUT_COUNT}, got {}",
                self.output_count
            )));
        }
        if let Some(score) = self.min_quality_score {
            if !(0.0..=1.0).contains(&score) {
                return Err(CoreError::Validation(format!(
                    "Task config: min_quality_score must be in 0.0..=1.0, got {score}"
                )));
            }
        }
        Ok(())
    }
}

/// Validate a task name: non-empty, bounded length.
pub fn validate_task_name(name: &str) -> Result<(), CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::Validation(
            "Task name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "Task name must not exceed {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}
