use cadence_core::error::CoreError;
use cadence_store::StoreError;
use thiserror::Error;

/// Engine-level error taxonomy.
///
/// `Transient` wraps provider/driver/network failures that are retried
/// with a cool-down; store errors abort the current step with no partial
/// commit.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("transient: {0}")]
    Transient(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
