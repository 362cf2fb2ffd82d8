//! Gemini client error types.

use thiserror::Error;

pub type GeminiResult<T> = Result<T, GeminiError>;

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Gemini API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Gemini returned no text")]
    EmptyResponse,

    #[error("Prompt blocked: {0}")]
    Blocked(String),

    #[error("File processing failed: {0}")]
    FileProcessingFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("All models failed: {0}")]
    AllModelsFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GeminiError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Rate limits, server errors and transport failures.
    pub fn is_retryable(&self) -> bool {
        match self {
            GeminiError::Api { status, .. } => *status == 429 || *status >= 500,
            GeminiError::Network(e) => !e.is_decode(),
            _ => false,
        }
    }

    /// Whether trying the next model in the fallback list can help.
    pub fn is_model_specific(&self) -> bool {
        match self {
            GeminiError::Api { status, .. } => matches!(status, 400 | 404 | 429) || *status >= 500,
            GeminiError::EmptyResponse | GeminiError::InvalidResponse(_) | GeminiError::Network(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(GeminiError::api(429, "quota").is_retryable());
        assert!(GeminiError::api(503, "overloaded").is_retryable());
        assert!(!GeminiError::api(400, "bad").is_retryable());
        assert!(!GeminiError::EmptyResponse.is_retryable());
    }

    #[test]
    fn test_model_specific() {
        assert!(GeminiError::api(404, "model not found").is_model_specific());
        assert!(GeminiError::EmptyResponse.is_model_specific());
        assert!(!GeminiError::api(403, "bad key").is_model_specific());
        assert!(!GeminiError::Blocked("SAFETY".into()).is_model_specific());
    }
}
