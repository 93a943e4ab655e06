//! Status constants and state machines for every orchestrated entity.
//!
//! Statuses are stored as TEXT in the durable store; row structs carry the
//! raw string and this module owns the legal values and transitions. Each
//! `can_transition` function answers "may a row move from `from` to `to`";
//! claims in the store layer are conditional updates over these values, so
//! an invalid transition can never be observed even under concurrent
//! callers.

// ---------------------------------------------------------------------------
// AutoTask
// ---------------------------------------------------------------------------

/// AutoTask is eligible for scheduling.
pub const TASK_ACTIVE: &str = "active";
/// AutoTask is skipped by the evaluation loop (manual or auto-pause).
pub const TASK_PAUSED: &str = "paused";

/// All valid AutoTask statuses.
pub const VALID_TASK_STATUSES: &[&str] = &[TASK_ACTIVE, TASK_PAUSED];

// ---------------------------------------------------------------------------
// JobExecution
// ---------------------------------------------------------------------------

/// Execution is in flight. At most one per AutoTask.
pub const EXEC_RUNNING: &str = "running";
/// Execution finished successfully. Terminal.
pub const EXEC_SUCCEEDED: &str = "succeeded";
/// Execution finished with an error. Terminal.
pub const EXEC_FAILED: &str = "failed";

/// Trigger recorded on the execution row: created by the periodic tick.
pub const TRIGGER_SCHEDULED: &str = "scheduled";
/// Trigger recorded on the execution row: forced by an external caller.
pub const TRIGGER_MANUAL: &str = "manual";

/// The terminal transition of an execution is write-once: only `running`
/// may move, and only to a terminal status.
pub fn execution_can_transition(from: &str, to: &str) -> bool {
    from == EXEC_RUNNING && (to == EXEC_SUCCEEDED || to == EXEC_FAILED)
}

// ---------------------------------------------------------------------------
// GenerationTask
// ---------------------------------------------------------------------------

/// Waiting for a worker claim.
pub const GEN_QUEUED: &str = "queued";
/// Claimed by exactly one worker.
pub const GEN_PROCESSING: &str = "processing";
/// Provider returned an artifact. Terminal.
pub const GEN_COMPLETED: &str = "completed";
/// Provider failed or timed out. Terminal.
pub const GEN_FAILED: &str = "failed";

/// Generation statuses are monotonic: queued -> processing -> terminal.
pub fn generation_can_transition(from: &str, to: &str) -> bool {
    match from {
        GEN_QUEUED => to == GEN_PROCESSING,
        GEN_PROCESSING => to == GEN_COMPLETED || to == GEN_FAILED,
        _ => false,
    }
}

/// True when a generation task can make no further progress.
pub fn generation_is_terminal(status: &str) -> bool {
    status == GEN_COMPLETED || status == GEN_FAILED
}

// ---------------------------------------------------------------------------
// PublishRecord
// ---------------------------------------------------------------------------

/// Eligible for the next publish claim (initial state, and the state a
/// retryable failure returns to).
pub const PUB_PENDING: &str = "pending";
/// Claimed: the single automation session is delivering this record.
pub const PUB_PUBLISHING: &str = "publishing";
/// Delivered. Terminal.
pub const PUB_PUBLISHED: &str = "published";
/// Attempts exhausted. Terminal.
pub const PUB_FAILED: &str = "failed";

pub fn publish_can_transition(from: &str, to: &str) -> bool {
    match from {
        PUB_PENDING => to == PUB_PUBLISHING,
        // A retryable failure goes back to pending; otherwise terminal.
        PUB_PUBLISHING => to == PUB_PUBLISHED || to == PUB_FAILED || to == PUB_PENDING,
        _ => false,
    }
}

pub fn publish_is_terminal(status: &str) -> bool {
    status == PUB_PUBLISHED || status == PUB_FAILED
}

// ---------------------------------------------------------------------------
// ImageDownloadQueueItem
// ---------------------------------------------------------------------------

/// Waiting for a batch claim.
pub const IMG_PENDING: &str = "pending";
/// Claimed into the current batch.
pub const IMG_DOWNLOADING: &str = "downloading";
/// Asset stored. Terminal.
pub const IMG_DONE: &str = "done";
/// Attempts exhausted. Terminal.
pub const IMG_FAILED: &str = "failed";

pub fn image_can_transition(from: &str, to: &str) -> bool {
    match from {
        IMG_PENDING => to == IMG_DOWNLOADING,
        IMG_DOWNLOADING => to == IMG_DONE || to == IMG_FAILED || to == IMG_PENDING,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- JobExecution ---------------------------------------------------------

    #[test]
    fn running_to_succeeded() {
        assert!(execution_can_transition(EXEC_RUNNING, EXEC_SUCCEEDED));
    }

    #[test]
    fn running_to_failed() {
        assert!(execution_can_transition(EXEC_RUNNING, EXEC_FAILED));
    }

    #[test]
    fn execution_terminal_is_write_once() {
        assert!(!execution_can_transition(EXEC_SUCCEEDED, EXEC_FAILED));
        assert!(!execution_can_transition(EXEC_FAILED, EXEC_SUCCEEDED));
        assert!(!execution_can_transition(EXEC_SUCCEEDED, EXEC_RUNNING));
    }

    // -- GenerationTask -------------------------------------------------------

    #[test]
    fn generation_queued_to_processing() {
        assert!(generation_can_transition(GEN_QUEUED, GEN_PROCESSING));
    }

    #[test]
    fn generation_processing_to_terminal() {
        assert!(generation_can_transition(GEN_PROCESSING, GEN_COMPLETED));
        assert!(generation_can_transition(GEN_PROCESSING, GEN_FAILED));
    }

    #[test]
    fn generation_never_regresses() {
        assert!(!generation_can_transition(GEN_PROCESSING, GEN_QUEUED));
        assert!(!generation_can_transition(GEN_COMPLETED, GEN_QUEUED));
        assert!(!generation_can_transition(GEN_COMPLETED, GEN_PROCESSING));
        assert!(!generation_can_transition(GEN_FAILED, GEN_PROCESSING));
    }

    #[test]
    fn generation_queued_cannot_skip_processing() {
        assert!(!generation_can_transition(GEN_QUEUED, GEN_COMPLETED));
        assert!(!generation_can_transition(GEN_QUEUED, GEN_FAILED));
    }

    #[test]
    fn generation_terminal_statuses() {
        assert!(generation_is_terminal(GEN_COMPLETED));
        assert!(generation_is_terminal(GEN_FAILED));
        assert!(!generation_is_terminal(GEN_QUEUED));
        assert!(!generation_is_terminal(GEN_PROCESSING));
    }

    // -- PublishRecord --------------------------------------------------------

    #[test]
    fn publish_pending_to_publishing_only() {
        assert!(publish_can_transition(PUB_PENDING, PUB_PUBLISHING));
        assert!(!publish_can_transition(PUB_PENDING, PUB_PUBLISHED));
        assert!(!publish_can_transition(PUB_PENDING, PUB_FAILED));
    }

    #[test]
    fn publish_retryable_failure_returns_to_pending() {
        assert!(publish_can_transition(PUB_PUBLISHING, PUB_PENDING));
    }

    #[test]
    fn publish_terminal_has_no_transitions() {
        assert!(!publish_can_transition(PUB_PUBLISHED, PUB_PENDING));
        assert!(!publish_can_transition(PUB_FAILED, PUB_PENDING));
        assert!(!publish_can_transition(PUB_FAILED, PUB_PUBLISHING));
    }

    // -- ImageDownloadQueueItem -----------------------------------------------

    #[test]
    fn image_pending_to_downloading() {
        assert!(image_can_transition(IMG_PENDING, IMG_DOWNLOADING));
    }

    #[test]
    fn image_retryable_failure_returns_to_pending() {
        assert!(image_can_transition(IMG_DOWNLOADING, IMG_PENDING));
    }

    #[test]
    fn image_terminal_has_no_transitions() {
        assert!(!image_can_transition(IMG_DONE, IMG_PENDING));
        assert!(!image_can_transition(IMG_FAILED, IMG_DOWNLOADING));
    }
}
