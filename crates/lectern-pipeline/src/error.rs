//! Pipeline error types.

use thiserror::Error;

use lectern_firestore::FirestoreError;
use lectern_gemini::GeminiError;
use lectern_models::TransitionError;
use lectern_storage::StorageError;

use crate::sanitize::MalformedAnalysisError;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Inference failed: {0}")]
    Inference(#[from] GeminiError),

    #[error("Object storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Video store error: {0}")]
    Store(#[from] FirestoreError),

    #[error("Malformed analysis: {0}")]
    MalformedAnalysis(#[from] MalformedAnalysisError),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn malformed_response(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    /// Rejections raised before any state changes; surfaced to the caller
    /// instead of being persisted.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            PipelineError::NotFound(_) | PipelineError::Conflict(_) | PipelineError::Validation(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Inference(e) => e.is_retryable(),
            PipelineError::Storage(e) => e.is_retryable(),
            PipelineError::Store(e) => e.is_retryable(),
            PipelineError::Timeout(_) => true,
            _ => false,
        }
    }
}

impl From<TransitionError> for PipelineError {
    fn from(e: TransitionError) -> Self {
        PipelineError::Conflict(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_models::ProcessingStatus;

    #[test]
    fn test_transition_error_is_conflict() {
        let err: PipelineError = ProcessingStatus::Processing.begin().unwrap_err().into();
        assert!(matches!(err, PipelineError::Conflict(_)));
        assert!(err.is_rejection());
    }

    #[test]
    fn test_upstream_errors_are_not_rejections() {
        let err = PipelineError::from(GeminiError::api(503, "overloaded"));
        assert!(!err.is_rejection());
        assert!(err.is_retryable());
        assert!(err.to_string().contains("503"));
    }
}
