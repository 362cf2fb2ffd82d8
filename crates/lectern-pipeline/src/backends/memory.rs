use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use lectern_models::{Video, VideoId, VideoPatch};

use super::{Guard, VideoStore};
use crate::error::{PipelineError, PipelineResult};

/// Process-local video store. Every update holds the write lock for the
/// whole read-check-write, so `update_if` is trivially atomic.
#[derive(Default)]
pub struct InMemoryVideoStore {
    videos: RwLock<HashMap<VideoId, Video>>,
}

impl InMemoryVideoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a video without going through `create`.
    pub async fn insert(&self, video: Video) {
        self.videos.write().await.insert(video.id.clone(), video);
    }

    pub async fn len(&self) -> usize {
        self.videos.read().await.len()
    }
}

#[async_trait]
impl VideoStore for InMemoryVideoStore {
    async fn get(&self, id: &VideoId) -> PipelineResult<Option<Video>> {
        Ok(self.videos.read().await.get(id).cloned())
    }

    async fn create(&self, video: &Video) -> PipelineResult<()> {
        let mut videos = self.videos.write().await;
        if videos.contains_key(&video.id) {
            return Err(PipelineError::conflict(format!("video {} already exists", video.id)));
        }
        videos.insert(video.id.clone(), video.clone());
        Ok(())
    }

    async fn list(&self, limit: u32) -> PipelineResult<Vec<Video>> {
        let videos = self.videos.read().await;
        let mut all: Vec<Video> = videos.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit as usize);
        Ok(all)
    }

    async fn update(&self, id: &VideoId, patch: &VideoPatch) -> PipelineResult<()> {
        let mut videos = self.videos.write().await;
        let video = videos
            .get_mut(id)
            .ok_or_else(|| PipelineError::not_found(format!("video {}", id)))?;
        patch.clone().touch(Utc::now()).apply_to(video);
        Ok(())
    }

    async fn update_if(&self, id: &VideoId, guard: Guard<'_>, patch: &VideoPatch) -> PipelineResult<Video> {
        let mut videos = self.videos.write().await;
        let video = videos
            .get_mut(id)
            .ok_or_else(|| PipelineError::not_found(format!("video {}", id)))?;
        guard(video)?;
        patch.clone().touch(Utc::now()).apply_to(video);
        Ok(video.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_models::{ProcessingStatus, VideoField};
    use tokio_test::{assert_err, assert_ok};

    fn video(id: &str) -> Video {
        Video::new(id, "Lecture", "owner-1", format!("uploads/{}.mp4", id))
    }

    #[tokio::test]
    async fn test_update_if_rejects_without_writing() {
        let store = InMemoryVideoStore::new();
        store.insert(video("v1")).await;
        let id = VideoId::from("v1");

        let patch = VideoPatch::new().set(VideoField::Status(ProcessingStatus::Processing));
        let err = store
            .update_if(&id, &|_| Err(PipelineError::conflict("busy")), &patch)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Conflict(_)));
        assert_eq!(store.require(&id).await.unwrap().status, ProcessingStatus::Uploaded);

        let written = store.update_if(&id, &|_| Ok(()), &patch).await.unwrap();
        assert_eq!(written.status, ProcessingStatus::Processing);
    }

    #[tokio::test]
    async fn test_missing_video() {
        let store = InMemoryVideoStore::new();
        let id = VideoId::from("ghost");
        assert!(matches!(store.require(&id).await, Err(PipelineError::NotFound(_))));
        assert!(matches!(
            store.update(&id, &VideoPatch::new()).await,
            Err(PipelineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let store = InMemoryVideoStore::new();
        assert_ok!(store.create(&video("a")).await);
        assert_ok!(store.create(&video("b")).await);
        assert_err!(store.create(&video("a")).await);
        assert_eq!(store.list(1).await.unwrap().len(), 1);
        assert_eq!(store.len().await, 2);
    }
}
