//! Repository for video documents.

use std::time::Duration;

use chrono::Utc;
use serde_json::Value as Json;
use tracing::{debug, info, warn};

use lectern_models::{Video, VideoId, VideoPatch};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_cas_conflict;
use crate::types::{fields_from_json, Document};

/// Default collection for video documents.
pub const VIDEOS_COLLECTION: &str = "videos";

/// Conditional writes give up after this many lost races.
const MAX_CAS_ATTEMPTS: u32 = 5;

/// Repository for [`Video`] documents.
#[derive(Clone)]
pub struct VideoRepository {
    client: FirestoreClient,
    collection: String,
}

impl VideoRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self::with_collection(client, VIDEOS_COLLECTION)
    }

    pub fn with_collection(client: FirestoreClient, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
        }
    }

    /// Fetch a video together with its document update time.
    async fn get_versioned(&self, id: &VideoId) -> FirestoreResult<Option<(Video, Option<String>)>> {
        let doc = self
            .client
            .with_retry("get_video", || self.client.get_document(&self.collection, id.as_str()))
            .await?;

        doc.map(|d| {
            let update_time = d.update_time.clone();
            document_to_video(&d, id).map(|v| (v, update_time))
        })
        .transpose()
    }

    pub async fn get(&self, id: &VideoId) -> FirestoreResult<Option<Video>> {
        Ok(self.get_versioned(id).await?.map(|(video, _)| video))
    }

    pub async fn create(&self, video: &Video) -> FirestoreResult<()> {
        let json = serde_json::to_value(video)?;
        let Json::Object(mut map) = json else {
            return Err(FirestoreError::SerializationError(
                "video did not serialize to an object".to_string(),
            ));
        };
        map.remove("id");

        self.client
            .create_document(&self.collection, video.id.as_str(), fields_from_json(&map))
            .await?;
        info!(video_id = %video.id, "Created video record");
        Ok(())
    }

    /// List up to `limit` videos (single page).
    pub async fn list(&self, limit: u32) -> FirestoreResult<Vec<Video>> {
        let page = self
            .client
            .with_retry("list_videos", || {
                self.client.list_documents(&self.collection, Some(limit), None)
            })
            .await?;

        let mut videos = Vec::new();
        for doc in page.documents.unwrap_or_default() {
            let Some(id) = doc.doc_id().map(VideoId::from) else {
                continue;
            };
            match document_to_video(&doc, &id) {
                Ok(video) => videos.push(video),
                Err(e) => warn!(video_id = %id, "Skipping unreadable video document: {}", e),
            }
        }
        Ok(videos)
    }

    /// Unconditional partial overwrite of the patched fields.
    pub async fn update(&self, id: &VideoId, patch: &VideoPatch) -> FirestoreResult<()> {
        let patch = patch.clone().touch(Utc::now());
        let fields = fields_from_json(&patch.to_json_map());
        let mask = patch.field_names();

        self.client
            .with_retry("update_video", || {
                self.client
                    .update_document(&self.collection, id.as_str(), fields.clone(), &mask, None)
            })
            .await?;
        Ok(())
    }

    /// Compare-and-swap update.
    ///
    /// Reads the current document, runs `guard` against it and, if the guard
    /// accepts, writes `patch` conditioned on the document's update time. A
    /// lost race re-reads and re-checks. Returns the guard's rejection as the
    /// inner `Err`, or the video as written.
    pub async fn update_if<G, E>(
        &self,
        id: &VideoId,
        guard: G,
        patch: &VideoPatch,
    ) -> FirestoreResult<Result<Video, E>>
    where
        G: Fn(&Video) -> Result<(), E>,
    {
        let patch = patch.clone().touch(Utc::now());
        let fields = fields_from_json(&patch.to_json_map());
        let mask = patch.field_names();

        for attempt in 0..MAX_CAS_ATTEMPTS {
            let (mut video, update_time) = self
                .get_versioned(id)
                .await?
                .ok_or_else(|| FirestoreError::not_found(format!("{}/{}", self.collection, id)))?;

            if let Err(rejection) = guard(&video) {
                return Ok(Err(rejection));
            }

            let Some(update_time) = update_time else {
                return Err(FirestoreError::invalid_response(format!(
                    "document {}/{} has no updateTime",
                    self.collection, id
                )));
            };

            match self
                .client
                .update_document(&self.collection, id.as_str(), fields.clone(), &mask, Some(&update_time))
                .await
            {
                Ok(_) => {
                    patch.apply_to(&mut video);
                    return Ok(Ok(video));
                }
                Err(e) if e.is_precondition_failed() => {
                    record_cas_conflict(&self.collection);
                    debug!(
                        video_id = %id,
                        attempt = attempt + 1,
                        "Conditional video update lost a race, re-reading"
                    );
                    tokio::time::sleep(Duration::from_millis(25 * (attempt as u64 + 1))).await;
                }
                Err(e) => return Err(e),
            }
        }

        warn!(video_id = %id, "Conditional video update exhausted {} attempts", MAX_CAS_ATTEMPTS);
        Err(FirestoreError::PreconditionFailed(format!(
            "{}/{} changed concurrently {} times",
            self.collection, id, MAX_CAS_ATTEMPTS
        )))
    }
}

/// Decode a document into a [`Video`], filling `id` from the path.
pub fn document_to_video(doc: &Document, id: &VideoId) -> FirestoreResult<Video> {
    let mut map = doc.to_json_object();
    map.insert("id".to_string(), Json::String(id.as_str().to_string()));
    serde_json::from_value(Json::Object(map)).map_err(|e| {
        FirestoreError::SerializationError(format!("video {}: {}", id, e))
    })
}
