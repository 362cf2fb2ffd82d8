//! Shared context for every pipeline operation.

use std::sync::Arc;

use lectern_models::{VideoField, VideoPatch};

use crate::backends::{ArtifactSink, InferenceService, ObjectStore, SignedReference, VideoStore};
use crate::config::PipelineConfig;
use crate::logging::JobLogger;
use crate::prompt::GenerationConfig;
use crate::supervisor::TaskSupervisor;

/// External collaborators the pipeline drives.
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn VideoStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub inference: Arc<dyn InferenceService>,
    pub artifacts: Arc<dyn ArtifactSink>,
}

/// The analysis pipeline: processing state machine, refinement and
/// engagement loop, suggestion merge-back and context summaries.
///
/// Held behind an `Arc`; detached runs keep their own clone.
pub struct Pipeline {
    pub(crate) store: Arc<dyn VideoStore>,
    pub(crate) objects: Arc<dyn ObjectStore>,
    pub(crate) inference: Arc<dyn InferenceService>,
    pub(crate) artifacts: Arc<dyn ArtifactSink>,
    pub(crate) generation: GenerationConfig,
    pub(crate) fingerprint: String,
    pub(crate) config: PipelineConfig,
    pub(crate) supervisor: TaskSupervisor,
}

impl Pipeline {
    pub fn new(backends: Backends, generation: GenerationConfig, config: PipelineConfig) -> Arc<Self> {
        let fingerprint = generation.fingerprint();
        let supervisor = TaskSupervisor::from_config(&config);
        Arc::new(Self {
            store: backends.store,
            objects: backends.objects,
            inference: backends.inference,
            artifacts: backends.artifacts,
            generation,
            fingerprint,
            config,
            supervisor,
        })
    }

    pub fn store(&self) -> &Arc<dyn VideoStore> {
        &self.store
    }

    /// Fingerprint of the active generation config.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn generation_config(&self) -> &GenerationConfig {
        &self.generation
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    /// Fetch a fresh media reference, or `None` when issuing one fails.
    /// A stale reference is no reason to fail a run.
    pub(crate) async fn refresh_media_reference(
        &self,
        storage_path: &str,
        logger: &JobLogger,
    ) -> Option<SignedReference> {
        if storage_path.trim().is_empty() {
            return None;
        }
        match self.objects.read_reference(storage_path, self.config.media_url_ttl).await {
            Ok(reference) => Some(reference),
            Err(e) => {
                logger.log_warning(&format!("could not refresh media reference: {}", e));
                None
            }
        }
    }
}

/// Media reference fields for a patch; empty when nothing was refreshed.
pub(crate) fn media_reference_patch(reference: Option<SignedReference>) -> VideoPatch {
    match reference {
        Some(r) => VideoPatch::new()
            .set(VideoField::MediaUrl(Some(r.url)))
            .set(VideoField::MediaUrlExpiresAt(Some(r.expires_at))),
        None => VideoPatch::new(),
    }
}
