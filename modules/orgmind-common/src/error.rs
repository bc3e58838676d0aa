use thiserror::Error;

use crate::types::{RunStatus, Stage};

/// Failure of one external capability call. Always batch-fatal, never run-fatal.
#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("{stage} call failed: {message}")]
    Call { stage: Stage, message: String },

    #[error("{stage} call timed out after {secs}s")]
    Timeout { stage: Stage, secs: u64 },

    /// The response arrived but does not match the stage's declared schema.
    #[error("{stage} response failed validation: {message}")]
    Validation { stage: Stage, message: String },
}

impl CapabilityError {
    pub fn stage(&self) -> Stage {
        match self {
            CapabilityError::Call { stage, .. }
            | CapabilityError::Timeout { stage, .. }
            | CapabilityError::Validation { stage, .. } => *stage,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, CapabilityError::Validation { .. })
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    /// Returned by a start request while a run is in progress; carries the untouched status.
    #[error("a run is already in progress")]
    AlreadyRunning(Box<RunStatus>),

    #[error("record source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("batch {batch} panicked: {message}")]
    BatchPanicked { batch: usize, message: String },
}
