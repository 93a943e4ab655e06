//! Orchestration engine: the scheduler and the three work queues.
//!
//! The engine owns no persistence of its own; every durable step goes
//! through the [`cadence_store::Ledger`] trait, and every external
//! effect goes through a collaborator trait ([`GenerationProvider`],
//! [`AutomationDriver`], [`AssetFetcher`]). Production wiring plugs in
//! the HTTP implementations from [`http`]; tests plug in mocks.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod generation;
pub mod http;
pub mod images;
pub mod publish;
pub mod scheduler;

pub use collaborators::{
    AssetFetcher, AutomationDriver, GeneratedArtifact, GenerationProvider, PublishPayload,
    PublishReceipt,
};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use generation::GenerationQueue;
pub use http::{HttpAssetFetcher, HttpAutomationDriver, HttpGenerationProvider};
pub use images::{BatchReport, ImageQueue};
pub use publish::{PublishOutcome, PublishQueue};
pub use scheduler::{Scheduler, SchedulerStatus};
