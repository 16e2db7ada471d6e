use thiserror::Error;

use crate::jobs::model::JobState;

/// Domain-level failures surfaced to the CLI boundary.
///
/// Subprocess failures never appear here; they are absorbed into the
/// retry/DLQ state machine. Store failures propagate as `anyhow` errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("job not found: {0}")]
    NotFound(String),

    #[error("job {id} is {state}, expected {expected}")]
    IllegalTransition {
        id: String,
        state: JobState,
        expected: JobState,
    },
}
