//! Pipeline error types

use thiserror::Error;

use crate::config::WindowKind;

/// Errors a change run can end with
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid parameters or an unsupported measurement set; never retried
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("There are no acquisitions for this parameter set for the {window} time period.")]
    NoAcquisitions { window: WindowKind },

    /// Malformed input or a failing pluggable function; retried per chunk
    #[error("Computation failed: {0}")]
    Computation(String),

    #[error(transparent)]
    Core(#[from] specanom_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Chart rendering failed: {0}")]
    Chart(String),

    /// Cooperative abort observed at a checkpoint
    #[error("cancelled")]
    Cancelled,
}

impl From<specanom_parallel::Cancelled> for PipelineError {
    fn from(_: specanom_parallel::Cancelled) -> Self {
        PipelineError::Cancelled
    }
}

impl PipelineError {
    /// Whether re-running the failed unit may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            PipelineError::Configuration(_)
                | PipelineError::NoAcquisitions { .. }
                | PipelineError::Cancelled
        )
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// How a stage ended when it did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Done(T),
    /// Nothing to produce (no covering data)
    Empty,
    Cancelled,
}

impl<T> StageOutcome<T> {
    /// Fold the internal cancellation error into an outcome
    pub(crate) fn from_result(result: Result<Option<T>>) -> Result<Self> {
        match result {
            Ok(Some(v)) => Ok(StageOutcome::Done(v)),
            Ok(None) => Ok(StageOutcome::Empty),
            Err(PipelineError::Cancelled) => Ok(StageOutcome::Cancelled),
            Err(e) => Err(e),
        }
    }

    pub fn done(self) -> Option<T> {
        match self {
            StageOutcome::Done(v) => Some(v),
            _ => None,
        }
    }
}
