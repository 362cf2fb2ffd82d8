use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::TempPath;
use tracing::debug;
use uuid::Uuid;

use lectern_storage::{ExpiringCache, R2Client, MAX_PRESIGN_TTL};

use super::{LocalMedia, ObjectStore, SignedReference};
use crate::error::{PipelineError, PipelineResult};

/// [`ObjectStore`] backed by R2, with presigned URLs served from an
/// expiring cache.
pub struct R2ObjectStore {
    client: R2Client,
    work_dir: PathBuf,
    urls: Arc<ExpiringCache<String, String>>,
}

impl R2ObjectStore {
    pub fn new(client: R2Client, work_dir: impl Into<PathBuf>, urls: Arc<ExpiringCache<String, String>>) -> Self {
        Self {
            client,
            work_dir: work_dir.into(),
            urls,
        }
    }
}

/// Local file name for a downloaded object: a fresh uuid plus the key's
/// last path segment, so concurrent runs never share a file.
fn local_name(key: &str) -> String {
    let base = key.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or("media");
    format!("{}-{}", Uuid::new_v4(), base)
}

/// When a reference signed at `now` for `ttl` lapses. The signature never
/// outlives [`MAX_PRESIGN_TTL`], whatever was requested.
fn reference_expiry(now: DateTime<Utc>, ttl: Duration) -> PipelineResult<DateTime<Utc>> {
    let ttl = chrono::Duration::from_std(ttl.min(MAX_PRESIGN_TTL))
        .map_err(|e| PipelineError::config(format!("invalid reference ttl: {}", e)))?;
    Ok(now + ttl)
}

#[async_trait]
impl ObjectStore for R2ObjectStore {
    async fn download(&self, key: &str) -> PipelineResult<LocalMedia> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        // Removed on error or abort; kept only once the copy is complete.
        let partial = TempPath::from_path(self.work_dir.join(local_name(key)));
        let size_bytes = self.client.download_file(key, &partial).await?;
        let path = partial.keep().map_err(|e| e.error)?;
        Ok(LocalMedia { path, size_bytes })
    }

    async fn read_reference(&self, key: &str, ttl: Duration) -> PipelineResult<SignedReference> {
        let cache_key = key.to_string();
        if let Some(cached) = self.urls.get(&cache_key).await {
            debug!(key = %key, "Serving cached read reference");
            return Ok(SignedReference {
                url: cached.value,
                expires_at: cached.expires_at,
            });
        }

        let signed_at = Utc::now();
        let url = self.client.presign_get(key, ttl).await?;
        let expires_at = reference_expiry(signed_at, ttl)?;
        self.urls.insert(cache_key, url.clone(), expires_at).await;

        Ok(SignedReference { url, expires_at })
    }

    async fn exists(&self, key: &str) -> PipelineResult<bool> {
        Ok(self.client.exists(key).await?)
    }

    async fn delete(&self, key: &str) -> PipelineResult<()> {
        self.client.delete_object(key).await?;
        self.urls.invalidate(&key.to_string()).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_name() {
        let name = local_name("uploads/owner/lecture.mp4");
        assert!(name.ends_with("-lecture.mp4"));
        assert_ne!(name, local_name("uploads/owner/lecture.mp4"));
        assert!(local_name("trailing/").ends_with("-media"));
    }

    #[test]
    fn test_reference_expiry_is_capped_at_presign_limit() {
        let now = Utc::now();
        let day = 24 * 3600;

        let short = reference_expiry(now, Duration::from_secs(3600)).unwrap();
        assert_eq!(short - now, chrono::Duration::hours(1));

        let month = reference_expiry(now, Duration::from_secs(30 * day)).unwrap();
        assert_eq!(month - now, chrono::Duration::days(7));
        assert!(month < now + chrono::Duration::days(10));
    }

    #[tokio::test]
    async fn test_capped_reference_is_not_served_past_its_signature() {
        let cache = ExpiringCache::new(Duration::from_secs(60), 8);
        let key = "uploads/a.mp4".to_string();
        let signed_at = Utc::now();
        let expires_at = reference_expiry(signed_at, Duration::from_secs(30 * 24 * 3600)).unwrap();
        cache
            .insert_at(key.clone(), "https://r2.example/a".to_string(), expires_at, signed_at)
            .await;

        let day = chrono::Duration::days(1);
        assert!(cache.get_at(&key, signed_at + day * 6).await.is_some());
        assert!(cache.get_at(&key, signed_at + day * 10).await.is_none());
    }
}
