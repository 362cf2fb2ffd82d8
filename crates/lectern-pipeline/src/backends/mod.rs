//! Seams between the pipeline and its external services.
//!
//! Production adapters wrap the Firestore, R2, Gemini and audit-log
//! clients; tests substitute mocks or the in-memory video store.

mod audit;
mod firestore;
mod gemini;
mod memory;
mod r2;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use lectern_models::{Video, VideoId, VideoPatch};
use lectern_storage::{AnalysisArtifact, EngagementArtifact, RefinementArtifact};

use crate::error::{PipelineError, PipelineResult};

pub use audit::NoopArtifactSink;
pub use firestore::FirestoreVideoStore;
pub use gemini::GeminiInference;
pub use memory::InMemoryVideoStore;
pub use r2::R2ObjectStore;

/// A time-limited read reference to a stored object.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedReference {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// A source object copied to local disk.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalMedia {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Media registered with the inference service.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaHandle {
    /// Provider resource name, used for polling and deletion
    pub name: String,
    pub uri: String,
    pub mime_type: String,
}

/// Raw text returned by the inference service.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOutput {
    pub text: String,
    pub model: String,
}

/// Precondition checked against the current document inside a
/// compare-and-swap update.
pub type Guard<'a> = &'a (dyn Fn(&Video) -> PipelineResult<()> + Send + Sync);

/// Blob storage holding uploaded source videos.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Copy the object at `key` into the local work directory.
    async fn download(&self, key: &str) -> PipelineResult<LocalMedia>;

    /// Issue (or reuse) a time-limited read reference for `key`.
    async fn read_reference(&self, key: &str, ttl: Duration) -> PipelineResult<SignedReference>;

    async fn exists(&self, key: &str) -> PipelineResult<bool>;

    async fn delete(&self, key: &str) -> PipelineResult<()>;
}

/// Multimodal model: media upload, readiness polling and generation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferenceService: Send + Sync {
    async fn upload_media(&self, path: &Path, mime_type: &str) -> PipelineResult<MediaHandle>;

    /// Block until uploaded media is ready for generation.
    async fn wait_until_processed(&self, media: &MediaHandle) -> PipelineResult<MediaHandle>;

    async fn generate_from_media(&self, media: &MediaHandle, prompt: &str) -> PipelineResult<InferenceOutput>;

    async fn generate_text(&self, prompt: &str) -> PipelineResult<InferenceOutput>;

    async fn delete_media(&self, media: &MediaHandle) -> PipelineResult<()>;
}

/// Append-only record of prompts, raw responses and parsed results.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn record_analysis(&self, video_id: &VideoId, artifact: AnalysisArtifact) -> PipelineResult<()>;

    async fn append_refinement(&self, video_id: &VideoId, artifact: RefinementArtifact) -> PipelineResult<()>;

    async fn append_engagement(&self, video_id: &VideoId, artifact: EngagementArtifact) -> PipelineResult<()>;
}

/// Persistence for the video aggregate.
#[async_trait]
pub trait VideoStore: Send + Sync {
    async fn get(&self, id: &VideoId) -> PipelineResult<Option<Video>>;

    async fn create(&self, video: &Video) -> PipelineResult<()>;

    async fn list(&self, limit: u32) -> PipelineResult<Vec<Video>>;

    /// Last-write-wins overwrite of the patched fields.
    async fn update(&self, id: &VideoId, patch: &VideoPatch) -> PipelineResult<()>;

    /// Apply `patch` only if `guard` accepts the current document; the
    /// check and the write are atomic. Returns the video as written.
    async fn update_if(&self, id: &VideoId, guard: Guard<'_>, patch: &VideoPatch) -> PipelineResult<Video>;

    /// Fetch a video that must exist.
    async fn require(&self, id: &VideoId) -> PipelineResult<Video> {
        self.get(id)
            .await?
            .ok_or_else(|| PipelineError::not_found(format!("video {}", id)))
    }
}
