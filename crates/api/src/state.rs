use std::sync::Arc;

use cadence_engine::{GenerationQueue, ImageQueue, PublishQueue, Scheduler};
use cadence_store::{DbPool, Ledger};

use crate::config::ServerConfig;

/// Shared application state available to all handlers.
///
/// The queues are the same instances the scheduler drives, so work
/// started over HTTP and work started by a tick share one ledger view.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn Ledger>,
    pub scheduler: Scheduler,
    pub generation: GenerationQueue,
    pub publish: PublishQueue,
    pub images: ImageQueue,
    pub config: Arc<ServerConfig>,
    /// Present when backed by Postgres; `None` under the in-memory ledger.
    pub pool: Option<DbPool>,
}
