//! Firestore error types.

use thiserror::Error;

/// Result type for Firestore operations.
pub type FirestoreResult<T> = Result<T, FirestoreError>;

/// Errors that can occur during Firestore operations.
#[derive(Debug, Error)]
pub enum FirestoreError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Rate limited, retry after {0}ms")]
    RateLimited(u64),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Default backoff hint for 429 responses without a usable Retry-After.
const DEFAULT_RATE_LIMIT_MS: u64 = 1000;

impl FirestoreError {
    pub fn auth_error(msg: impl Into<String>) -> Self {
        Self::AuthError(msg.into())
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Map an HTTP status and body to an error.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => Self::AuthError(message),
            403 => Self::PermissionDenied(message),
            404 => Self::NotFound(message),
            409 => Self::AlreadyExists(message),
            412 => Self::PreconditionFailed(message),
            429 => Self::RateLimited(DEFAULT_RATE_LIMIT_MS),
            500..=599 => Self::ServerError(status, message),
            _ => Self::RequestFailed(message),
        }
    }

    /// HTTP status this error corresponds to, when there is one.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::AuthError(_) => Some(401),
            Self::PermissionDenied(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::AlreadyExists(_) => Some(409),
            Self::PreconditionFailed(_) => Some(412),
            Self::RateLimited(_) => Some(429),
            Self::ServerError(code, _) => Some(*code),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited(ms) => Some(*ms),
            _ => None,
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FirestoreError::Network(_) | FirestoreError::RateLimited(_) | FirestoreError::ServerError(_, _)
        )
    }

    /// True if the error was caused by a failed precondition (updateTime mismatch).
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, FirestoreError::PreconditionFailed(_))
            || matches!(
                self,
                FirestoreError::RequestFailed(msg)
                if msg.contains("FAILED_PRECONDITION")
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_http_status_mapping() {
        assert!(matches!(FirestoreError::from_http_status(404, "x"), FirestoreError::NotFound(_)));
        assert!(matches!(FirestoreError::from_http_status(409, "x"), FirestoreError::AlreadyExists(_)));
        assert!(matches!(FirestoreError::from_http_status(412, "x"), FirestoreError::PreconditionFailed(_)));
        assert!(matches!(FirestoreError::from_http_status(503, "x"), FirestoreError::ServerError(503, _)));
        assert!(matches!(FirestoreError::from_http_status(400, "x"), FirestoreError::RequestFailed(_)));
    }

    #[test]
    fn test_retryable() {
        assert!(FirestoreError::from_http_status(500, "boom").is_retryable());
        assert!(FirestoreError::from_http_status(429, "slow down").is_retryable());
        assert!(!FirestoreError::from_http_status(400, "bad").is_retryable());
        assert!(!FirestoreError::from_http_status(412, "stale").is_retryable());
    }

    #[test]
    fn test_http_status_and_retry_after() {
        assert_eq!(FirestoreError::RateLimited(5000).http_status(), Some(429));
        assert_eq!(FirestoreError::RateLimited(5000).retry_after_ms(), Some(5000));
        assert_eq!(FirestoreError::ServerError(502, "gw".into()).http_status(), Some(502));
        assert_eq!(FirestoreError::ServerError(502, "gw".into()).retry_after_ms(), None);
        assert_eq!(FirestoreError::invalid_response("x").http_status(), None);
    }

    #[test]
    fn test_precondition_detection() {
        assert!(FirestoreError::PreconditionFailed("x".into()).is_precondition_failed());
        assert!(FirestoreError::request_failed("status FAILED_PRECONDITION").is_precondition_failed());
        assert!(!FirestoreError::not_found("x").is_precondition_failed());
    }
}
