//! Domain layer for the cadence orchestration engine.
//!
//! This crate has zero internal dependencies so it can be used by the
//! store, the engine, and any future worker or CLI tooling.

pub mod error;
pub mod media;
pub mod retry;
pub mod schedule;
pub mod status;
pub mod task_config;
pub mod types;
