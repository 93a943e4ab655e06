//! API error type and HTTP response mapping.
//!
//! Every handler returns `AppResult<T>`; conversion into an HTTP
//! response happens in one place so status codes and body shape stay
//! consistent across the API. The body is always
//! `{ "error": message, "code": CODE }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cadence_core::error::CoreError;
use cadence_engine::EngineError;
use cadence_store::StoreError;
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Engine(e) => engine_parts(e),
            AppError::Core(e) => core_parts(e),
            AppError::Store(e) => store_parts(e),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone())
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        }
    }
}

fn core_parts(e: &CoreError) -> (StatusCode, &'static str, String) {
    match e {
        CoreError::Validation(msg) => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
        }
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            )
        }
    }
}

fn store_parts(e: &StoreError) -> (StatusCode, &'static str, String) {
    match e {
        StoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        StoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        StoreError::Validation(msg) => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
        }
        StoreError::Database(e) => {
            tracing::error!(error = %e, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "Internal server error".to_string(),
            )
        }
    }
}

fn engine_parts(e: &EngineError) -> (StatusCode, &'static str, String) {
    match e {
        EngineError::Core(e) => core_parts(e),
        EngineError::Store(e) => store_parts(e),
        EngineError::Transient(msg) => {
            tracing::error!(error = %msg, "Engine error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            )
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let body = Json(json!({
            "error": message,
            "code": code,
        }));
        (status, body).into_response()
    }
}
