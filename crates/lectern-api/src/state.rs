//! Application state.

use std::sync::Arc;

use tracing::info;

use lectern_firestore::{FirestoreClient, VideoRepository};
use lectern_gemini::GeminiClient;
use lectern_pipeline::{
    ArtifactSink, Backends, FirestoreVideoStore, GeminiInference, GenerationConfig, NoopArtifactSink, Pipeline,
    PipelineConfig, R2ObjectStore,
};
use lectern_storage::{AuditLog, ExpiringCache, R2Client};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(config: ApiConfig, pipeline: Arc<Pipeline>) -> Self {
        Self { config, pipeline }
    }

    /// Wire the production backends (Firestore, R2, Gemini) from the
    /// environment.
    pub async fn from_env(config: ApiConfig) -> anyhow::Result<Self> {
        let pipeline_config = PipelineConfig::from_env();
        let generation = GenerationConfig::load()?;
        tokio::fs::create_dir_all(&pipeline_config.work_dir).await?;

        let firestore = FirestoreClient::from_env().await?;
        let store = Arc::new(FirestoreVideoStore::new(VideoRepository::new(firestore)));

        let urls = Arc::new(ExpiringCache::new(
            pipeline_config.url_cache_margin,
            pipeline_config.url_cache_capacity,
        ));
        let objects = Arc::new(R2ObjectStore::new(R2Client::from_env()?, &pipeline_config.work_dir, urls));

        let inference = Arc::new(GeminiInference::new(
            GeminiClient::from_env()?,
            pipeline_config.media_poll_interval,
            pipeline_config.media_poll_attempts,
        ));

        let artifacts: Arc<dyn ArtifactSink> = match &pipeline_config.audit_dir {
            Some(dir) => {
                info!("Audit log enabled at {}", dir.display());
                Arc::new(AuditLog::new(dir))
            }
            None => Arc::new(NoopArtifactSink),
        };

        let pipeline = Pipeline::new(
            Backends {
                store,
                objects,
                inference,
                artifacts,
            },
            generation,
            pipeline_config,
        );
        info!(fingerprint = %pipeline.fingerprint(), "Pipeline ready");

        Ok(Self::new(config, pipeline))
    }
}
