use async_trait::async_trait;

use lectern_firestore::{FirestoreError, VideoRepository};
use lectern_models::{Video, VideoId, VideoPatch};

use super::{Guard, VideoStore};
use crate::error::{PipelineError, PipelineResult};

/// [`VideoStore`] backed by the Firestore video repository.
pub struct FirestoreVideoStore {
    repo: VideoRepository,
}

impl FirestoreVideoStore {
    pub fn new(repo: VideoRepository) -> Self {
        Self { repo }
    }
}

fn map_err(e: FirestoreError) -> PipelineError {
    match e {
        FirestoreError::NotFound(path) => PipelineError::NotFound(path),
        FirestoreError::AlreadyExists(path) => PipelineError::Conflict(format!("{} already exists", path)),
        other => PipelineError::Store(other),
    }
}

#[async_trait]
impl VideoStore for FirestoreVideoStore {
    async fn get(&self, id: &VideoId) -> PipelineResult<Option<Video>> {
        self.repo.get(id).await.map_err(map_err)
    }

    async fn create(&self, video: &Video) -> PipelineResult<()> {
        self.repo.create(video).await.map_err(map_err)
    }

    async fn list(&self, limit: u32) -> PipelineResult<Vec<Video>> {
        self.repo.list(limit).await.map_err(map_err)
    }

    async fn update(&self, id: &VideoId, patch: &VideoPatch) -> PipelineResult<()> {
        self.repo.update(id, patch).await.map_err(map_err)
    }

    async fn update_if(&self, id: &VideoId, guard: Guard<'_>, patch: &VideoPatch) -> PipelineResult<Video> {
        self.repo
            .update_if(id, |video| guard(video), patch)
            .await
            .map_err(map_err)?
    }
}
