//! HTTP control surface for the orchestration engine.
//!
//! Thin axum layer: one route per engine operation, a shared
//! `{ "data": ... }` response envelope, and `AppError` mapping the
//! engine's error taxonomy onto HTTP statuses.

pub mod config;
pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
