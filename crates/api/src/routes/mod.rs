pub mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /jobs                        list, create
/// /jobs/{id}                   get
/// /jobs/{id}/trigger           run now (POST, 409 while running)
/// /jobs/{id}/pause             pause (POST)
/// /jobs/{id}/resume            resume (POST)
/// /jobs/{id}/executions        per-job execution history
/// /executions                  ledger-wide execution history
///
/// /scheduler/status            tick loop + in-flight summary
/// /scheduler/start             start tick loop (POST, idempotent)
/// /scheduler/stop              stop tick loop (POST, idempotent)
///
/// /generation/tasks            enqueue (POST)
/// /generation/tasks/{id}       get
///
/// /publish/records             enqueue (POST)
/// /publish/records/{id}        get
/// /publish/process-next        claim + deliver one record (POST)
///
/// /images/enqueue              queue downloads (POST)
/// /images/process-batch        claim + download one batch (POST)
/// /images/stats                per-status counts
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/jobs",
            get(handlers::jobs::list_jobs).post(handlers::jobs::create_job),
        )
        .route("/jobs/{id}", get(handlers::jobs::get_job))
        .route("/jobs/{id}/trigger", post(handlers::jobs::trigger_job))
        .route("/jobs/{id}/pause", post(handlers::jobs::pause_job))
        .route("/jobs/{id}/resume", post(handlers::jobs::resume_job))
        .route(
            "/jobs/{id}/executions",
            get(handlers::jobs::list_job_executions),
        )
        .route("/executions", get(handlers::jobs::list_executions))
        .route("/scheduler/status", get(handlers::scheduler::get_status))
        .route("/scheduler/start", post(handlers::scheduler::start))
        .route("/scheduler/stop", post(handlers::scheduler::stop))
        .route(
            "/generation/tasks",
            post(handlers::generation::create_task),
        )
        .route(
            "/generation/tasks/{id}",
            get(handlers::generation::get_task),
        )
        .route("/publish/records", post(handlers::publish::create_record))
        .route(
            "/publish/records/{id}",
            get(handlers::publish::get_record),
        )
        .route(
            "/publish/process-next",
            post(handlers::publish::process_next),
        )
        .route("/images/enqueue", post(handlers::images::enqueue))
        .route(
            "/images/process-batch",
            post(handlers::images::process_batch),
        )
        .route("/images/stats", get(handlers::images::stats))
}
