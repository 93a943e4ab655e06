//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the durable-store row
//! - A `Deserialize` create DTO for inserts
//!
//! Rows carry statuses as raw strings; the legal values and transitions
//! live in `cadence_core::status`.

pub mod auto_task;
pub mod creative;
pub mod execution;
pub mod generation;
pub mod image;
pub mod publish;

pub use auto_task::{AutoTask, NewAutoTask};
pub use creative::{Creative, NewCreative};
pub use execution::JobExecution;
pub use generation::{GenerationTask, NewGenerationTask};
pub use image::{ImageDownloadQueueItem, ImageQueueStats, NewImageDownload};
pub use publish::PublishRecord;
