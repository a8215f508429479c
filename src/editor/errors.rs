use thiserror::Error;

use super::policies::PolicyId;

/// Errors returned by the editing core. All of them are recoverable by the caller; the
/// session is left as it was before the failing call.
#[derive(Debug, Error)]
pub enum EditorError {
    #[error("policy '{0}' not found")]
    PolicyNotFound(PolicyId),

    #[error("position {position} is out of range (list length {len})")]
    OutOfRange { position: usize, len: usize },

    #[error("no policy is bound to the form")]
    NoBoundRecord,

    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    #[error("{operation} failed: {cause:#}")]
    ExternalFailure {
        operation: &'static str,
        cause: anyhow::Error,
    },
}

impl EditorError {
    /// Wraps a collaborator failure
    pub fn external(operation: &'static str, cause: anyhow::Error) -> Self {
        EditorError::ExternalFailure { operation, cause }
    }

    /// True for both a missing policy id and a list position past the end
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EditorError::PolicyNotFound(_) | EditorError::OutOfRange { .. }
        )
    }
}

pub type EditorResult<T> = Result<T, EditorError>;
