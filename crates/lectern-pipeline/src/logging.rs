//! Structured logging for detached pipeline runs.

use tracing::{error, info, warn, Span};

use lectern_models::VideoId;

/// Logger that tags every lifecycle event with the video and operation.
#[derive(Debug, Clone)]
pub struct JobLogger {
    video_id: String,
    operation: String,
}

impl JobLogger {
    /// `operation` names the run, e.g. "processing" or "refinement".
    pub fn new(video_id: &VideoId, operation: &str) -> Self {
        Self {
            video_id: video_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            video_id = %self.video_id,
            operation = %self.operation,
            "Run started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            video_id = %self.video_id,
            operation = %self.operation,
            "Run progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            video_id = %self.video_id,
            operation = %self.operation,
            "Run warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            video_id = %self.video_id,
            operation = %self.operation,
            "Run error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            video_id = %self.video_id,
            operation = %self.operation,
            "Run completed: {}", message
        );
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span carrying the video id and operation, for instrumenting a run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "run",
            video_id = %self.video_id,
            operation = %self.operation
        )
    }
}
