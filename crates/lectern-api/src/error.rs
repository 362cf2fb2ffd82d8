//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use lectern_pipeline::PipelineError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Upstream error: {0}")]
    BadGateway(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let msg = err.to_string();
        match err {
            PipelineError::NotFound(m) => ApiError::NotFound(m),
            PipelineError::Conflict(m) => ApiError::Conflict(m),
            PipelineError::Validation(m) => ApiError::Validation(m),
            PipelineError::MalformedAnalysis(_) | PipelineError::MalformedResponse(_) => ApiError::Unprocessable(msg),
            PipelineError::Inference(_) => ApiError::BadGateway(msg),
            PipelineError::Timeout(_) => ApiError::Timeout(msg),
            PipelineError::Cancelled(_) => ApiError::Unavailable(msg),
            PipelineError::Config(_)
            | PipelineError::Storage(_)
            | PipelineError::Store(_)
            | PipelineError::Panicked(_)
            | PipelineError::Io(_) => ApiError::Internal(msg),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = match &self {
            ApiError::Internal(_) if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" => {
                "An internal error occurred".to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_taxonomy_maps_to_status_codes() {
        let cases = [
            (PipelineError::not_found("video v1"), StatusCode::NOT_FOUND),
            (PipelineError::conflict("already processing"), StatusCode::CONFLICT),
            (PipelineError::validation("no concepts"), StatusCode::BAD_REQUEST),
            (PipelineError::malformed_response("no JSON object"), StatusCode::UNPROCESSABLE_ENTITY),
            (PipelineError::Timeout("deadline".into()), StatusCode::GATEWAY_TIMEOUT),
            (PipelineError::Cancelled("shutdown".into()), StatusCode::SERVICE_UNAVAILABLE),
            (PipelineError::config("bad"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status_code(), expected);
        }
    }

    #[test]
    fn test_rejection_keeps_message() {
        let err = ApiError::from(PipelineError::conflict("video v1 is already processing"));
        assert_eq!(err.to_string(), "Conflict: video v1 is already processing");
    }
}
