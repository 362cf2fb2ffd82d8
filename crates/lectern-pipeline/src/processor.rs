//! Processing state machine.
//!
//! `uploaded → processing(initializing → uploading_to_gemini →
//! analyzing_content) → ready`, with `error` reachable from any processing
//! stage. Admission is a compare-and-swap on the stored status; the run
//! itself is detached under the task supervisor.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tempfile::TempPath;
use tracing::{warn, Instrument};

use lectern_models::{
    validate_hierarchy, AnalysisResult, ProcessingStage, ProcessingStatus, Video, VideoField, VideoId,
    VideoPatch,
};
use lectern_storage::AnalysisArtifact;

use crate::backends::{InferenceOutput, InferenceService, LocalMedia, MediaHandle};
use crate::error::{PipelineError, PipelineResult};
use crate::logging::JobLogger;
use crate::metrics::{
    record_cache_hit, record_run_completed, record_run_failed, record_run_started, record_timing_violations,
};
use crate::pipeline::{media_reference_patch, Pipeline};
use crate::prompt::{build_analysis_prompt_for, known_duration};
use crate::sanitize::{audit_timing, sanitize_analysis, SanitizePolicy};
use crate::supervisor::TaskHandle;

const OPERATION: &str = "processing";

fn admit(video: &Video) -> PipelineResult<()> {
    video.status.begin()?;
    Ok(())
}

fn still_processing(video: &Video) -> PipelineResult<()> {
    video.status.complete()?;
    Ok(())
}

fn can_fail(video: &Video) -> PipelineResult<()> {
    video.status.fail()?;
    Ok(())
}

impl Pipeline {
    /// Admit a video for processing and detach the run.
    ///
    /// Returns `NotFound` for an unknown video and `Conflict` when it is
    /// already processing; neither changes the stored document.
    pub async fn start_processing(self: &Arc<Self>, id: &VideoId) -> PipelineResult<TaskHandle> {
        let admission = VideoPatch::new()
            .set(VideoField::Status(ProcessingStatus::Processing))
            .set(VideoField::ProcessingStage(Some(ProcessingStage::Initializing)))
            .set(VideoField::ProcessingError(None));

        let video = self.store.update_if(id, &admit, &admission).await?;
        record_run_started(OPERATION);

        let pipeline = Arc::clone(self);
        let on_failure = Arc::clone(self);
        let failed_id = id.clone();

        Ok(self.supervisor.submit(
            format!("{}:{}", OPERATION, id),
            async move { pipeline.run_processing(video).await },
            move |e| async move { on_failure.fail_processing(&failed_id, &e).await },
        ))
    }

    async fn run_processing(self: Arc<Self>, video: Video) -> PipelineResult<()> {
        let logger = JobLogger::new(&video.id, OPERATION);
        let span = logger.create_span();

        async move {
            let started = Instant::now();
            logger.log_start(&format!("storage path '{}'", video.storage_path));

            if video.analysis_is_current(&self.fingerprint) {
                record_cache_hit();
                logger.log_progress("stored analysis matches the current fingerprint, skipping inference");
                self.finish_cached(&video, &logger).await?;
            } else {
                self.analyze_and_persist(&video, &logger).await?;
            }

            record_run_completed(OPERATION, started.elapsed());
            logger.log_completion(&format!("ready after {:.1}s", started.elapsed().as_secs_f64()));
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn finish_cached(&self, video: &Video, logger: &JobLogger) -> PipelineResult<()> {
        let reference = self.refresh_media_reference(&video.storage_path, logger).await;
        let patch = ready_patch().extend(media_reference_patch(reference));
        self.store.update_if(&video.id, &still_processing, &patch).await?;
        Ok(())
    }

    async fn analyze_and_persist(&self, video: &Video, logger: &JobLogger) -> PipelineResult<()> {
        self.advance_stage(&video.id, ProcessingStage::UploadingToGemini).await?;

        let local = self.objects.download(&video.storage_path).await?;
        logger.log_progress(&format!("downloaded {} bytes", local.size_bytes));
        let local_file = TempPath::from_path(&local.path);

        let analyzed = self.analyze_local(video, &local, logger).await;
        if let Err(e) = local_file.close() {
            logger.log_warning(&format!("could not remove {}: {}", local.path.display(), e));
        }
        let (prompt, output, result) = analyzed?;

        self.report_audits(&result, logger);

        let reference = self.refresh_media_reference(&video.storage_path, logger).await;
        let patch = VideoPatch::analysis(&result)
            .set(VideoField::AiAnalysisVersion(Some(self.fingerprint.clone())))
            .set(VideoField::AiAnalysisCompletedAt(Some(Utc::now())))
            .extend(ready_patch())
            .extend(media_reference_patch(reference));
        self.store.update_if(&video.id, &still_processing, &patch).await?;

        let artifact = AnalysisArtifact {
            prompt,
            raw_response: output.text,
            parsed: result,
            fingerprint: self.fingerprint.clone(),
            recorded_at: Utc::now(),
        };
        if let Err(e) = self.artifacts.record_analysis(&video.id, artifact).await {
            logger.log_warning(&format!("audit snapshot not recorded: {}", e));
        }
        Ok(())
    }

    /// Upload, wait, generate and sanitize. Uploaded media is deleted
    /// whether or not generation succeeds, and the local copy is removed
    /// by the caller, so an aborted run leaves neither behind.
    async fn analyze_local(
        &self,
        video: &Video,
        local: &LocalMedia,
        logger: &JobLogger,
    ) -> PipelineResult<(String, InferenceOutput, AnalysisResult)> {
        let media = self.inference.upload_media(&local.path, &video.mime_type).await?;
        logger.log_progress(&format!("uploaded media as {}", media.name));
        let uploaded = UploadedMedia::new(Arc::clone(&self.inference), media);

        let generated = self.generate_analysis(video, uploaded.handle(), logger).await;
        uploaded.delete(logger).await;

        let (prompt, output) = generated?;
        let policy = SanitizePolicy::from_config(&self.generation, known_duration(video.duration));
        let result = sanitize_analysis(&output.text, &policy)?;
        logger.log_progress(&format!(
            "model {} produced {} concepts, {} checkpoints, {} quiz questions",
            output.model,
            result.concepts.len(),
            result.checkpoints.len(),
            result.quiz.len()
        ));
        Ok((prompt, output, result))
    }

    async fn generate_analysis(
        &self,
        video: &Video,
        media: &MediaHandle,
        logger: &JobLogger,
    ) -> PipelineResult<(String, InferenceOutput)> {
        self.advance_stage(&video.id, ProcessingStage::AnalyzingContent).await?;
        let media = self.inference.wait_until_processed(media).await?;
        logger.log_progress("media is ready for analysis");

        let prompt = build_analysis_prompt_for(&self.generation, known_duration(video.duration));
        let output = self.inference.generate_from_media(&media, &prompt).await?;
        Ok((prompt, output))
    }

    /// Move the run to `stage`. Stages only move forward while processing.
    async fn advance_stage(&self, id: &VideoId, stage: ProcessingStage) -> PipelineResult<()> {
        let forward = move |video: &Video| -> PipelineResult<()> {
            video.status.complete()?;
            if let Some(current) = video.processing_stage {
                current.next(stage)?;
            }
            Ok(())
        };
        let patch = VideoPatch::new().set(VideoField::ProcessingStage(Some(stage)));
        self.store.update_if(id, &forward, &patch).await?;
        Ok(())
    }

    fn report_audits(&self, result: &AnalysisResult, logger: &JobLogger) {
        let violations = audit_timing(result, &self.generation);
        record_timing_violations(violations.len());
        for violation in &violations {
            logger.log_warning(&format!("timing: {}", violation));
        }
        for violation in validate_hierarchy(&result.concepts) {
            logger.log_warning(&format!("hierarchy: {}", violation));
        }
    }

    /// Persist `error` with the failure message. Timeline fields are never
    /// part of this write.
    async fn fail_processing(&self, id: &VideoId, error: &PipelineError) {
        record_run_failed(OPERATION);
        let logger = JobLogger::new(id, OPERATION);
        logger.log_error(&error.to_string());

        let patch = VideoPatch::new()
            .set(VideoField::Status(ProcessingStatus::Error))
            .set(VideoField::ProcessingError(Some(error.to_string())));
        if let Err(e) = self.store.update_if(id, &can_fail, &patch).await {
            logger.log_warning(&format!("could not persist error status: {}", e));
        }
    }
}

fn ready_patch() -> VideoPatch {
    VideoPatch::new()
        .set(VideoField::Status(ProcessingStatus::Ready))
        .set(VideoField::ProcessingStage(None))
        .set(VideoField::ProcessingError(None))
}

/// Media uploaded to the inference service for one run.
///
/// Call [`UploadedMedia::delete`] when done. If the guard is dropped first,
/// as happens when the supervisor aborts the run, deletion is spawned in
/// the background.
struct UploadedMedia {
    inference: Arc<dyn InferenceService>,
    media: MediaHandle,
    deleted: bool,
}

impl UploadedMedia {
    fn new(inference: Arc<dyn InferenceService>, media: MediaHandle) -> Self {
        Self {
            inference,
            media,
            deleted: false,
        }
    }

    fn handle(&self) -> &MediaHandle {
        &self.media
    }

    async fn delete(mut self, logger: &JobLogger) {
        if let Err(e) = self.inference.delete_media(&self.media).await {
            logger.log_warning(&format!("could not delete media {}: {}", self.media.name, e));
        }
        self.deleted = true;
    }
}

impl Drop for UploadedMedia {
    fn drop(&mut self) {
        if self.deleted {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(media = %self.media.name, "Runtime gone, uploaded media was not deleted");
            return;
        };

        warn!(media = %self.media.name, "Run ended before media cleanup, deleting in background");
        let inference = Arc::clone(&self.inference);
        let media = self.media.clone();
        runtime.spawn(async move {
            if let Err(e) = inference.delete_media(&media).await {
                warn!(media = %media.name, "Background media deletion failed: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{InMemoryVideoStore, MockArtifactSink, MockInferenceService, MockObjectStore};
    use crate::config::PipelineConfig;
    use crate::pipeline::Backends;
    use crate::prompt::GenerationConfig;
    use crate::supervisor::TaskOutcome;
    use crate::VideoStore;
    use std::path::{Path, PathBuf};

    fn media(mime_type: &str) -> MediaHandle {
        MediaHandle {
            name: "files/abc".into(),
            uri: "https://inference.example/files/abc".into(),
            mime_type: mime_type.into(),
        }
    }

    fn objects_serving(path: PathBuf) -> MockObjectStore {
        let mut objects = MockObjectStore::new();
        objects
            .expect_download()
            .times(1)
            .returning(move |_| Ok(LocalMedia { path: path.clone(), size_bytes: 3 }));
        objects
    }

    async fn pipeline_with(
        objects: MockObjectStore,
        inference: MockInferenceService,
        artifacts: MockArtifactSink,
    ) -> (Arc<Pipeline>, Arc<InMemoryVideoStore>) {
        let store = Arc::new(InMemoryVideoStore::new());
        store
            .insert(Video::new("v1", "Circuits", "owner", "uploads/v1.mp4").with_duration(694.0))
            .await;
        let pipeline = Pipeline::new(
            Backends {
                store: store.clone(),
                objects: Arc::new(objects),
                inference: Arc::new(inference),
                artifacts: Arc::new(artifacts),
            },
            GenerationConfig::default(),
            PipelineConfig::default(),
        );
        (pipeline, store)
    }

    #[tokio::test]
    async fn test_generation_failure_still_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("v1.mp4");
        tokio::fs::write(&local, b"mp4").await.unwrap();

        let mut inference = MockInferenceService::new();
        inference
            .expect_upload_media()
            .times(1)
            .returning(|_: &Path, mime: &str| Ok(media(mime)));
        inference
            .expect_wait_until_processed()
            .returning(|m: &MediaHandle| Ok(m.clone()));
        inference
            .expect_generate_from_media()
            .times(1)
            .returning(|_, _| Err(PipelineError::malformed_response("no candidates")));
        inference.expect_delete_media().times(1).returning(|_| Ok(()));

        let mut artifacts = MockArtifactSink::new();
        artifacts.expect_record_analysis().never();

        let (pipeline, store) = pipeline_with(objects_serving(local.clone()), inference, artifacts).await;
        let id = VideoId::from("v1");

        let outcome = pipeline.start_processing(&id).await.unwrap().outcome().await;
        assert!(matches!(outcome, TaskOutcome::Failed(_)));

        let video = store.require(&id).await.unwrap();
        assert_eq!(video.status, ProcessingStatus::Error);
        assert!(video.processing_error.unwrap().contains("no candidates"));
        assert!(!local.exists());
    }

    #[tokio::test]
    async fn test_success_records_artifact_even_without_media_url() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("v1.mp4");
        tokio::fs::write(&local, b"mp4").await.unwrap();

        let mut objects = objects_serving(local);
        objects
            .expect_read_reference()
            .times(1)
            .returning(|_, _| Err(PipelineError::config("presigning disabled")));

        let mut inference = MockInferenceService::new();
        inference
            .expect_upload_media()
            .returning(|_: &Path, mime: &str| Ok(media(mime)));
        inference
            .expect_wait_until_processed()
            .returning(|m: &MediaHandle| Ok(m.clone()));
        inference.expect_generate_from_media().times(1).returning(|_, _| {
            Ok(InferenceOutput {
                text: r#"{"duration": 694, "concepts": [{"concept": "Ohm's law", "timestamp": 1200}]}"#.into(),
                model: "gemini-test".into(),
            })
        });
        inference.expect_delete_media().returning(|_| Ok(()));

        let mut artifacts = MockArtifactSink::new();
        artifacts
            .expect_record_analysis()
            .withf(|id: &VideoId, artifact: &AnalysisArtifact| {
                id.as_str() == "v1"
                    && artifact.parsed.concepts[0].timestamp == 694.0
                    && artifact.raw_response.contains("Ohm's law")
                    && artifact.prompt.contains("694")
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let (pipeline, store) = pipeline_with(objects, inference, artifacts).await;
        let id = VideoId::from("v1");

        let outcome = pipeline.start_processing(&id).await.unwrap().outcome().await;
        assert_eq!(outcome, TaskOutcome::Completed);

        let video = store.require(&id).await.unwrap();
        assert_eq!(video.status, ProcessingStatus::Ready);
        assert_eq!(video.concepts.len(), 1);
        assert!(video.media_url.is_none());
        assert_eq!(video.ai_analysis_version.as_deref(), Some(pipeline.fingerprint()));
    }

    #[tokio::test]
    async fn test_stage_only_moves_forward() {
        let (pipeline, store) =
            pipeline_with(MockObjectStore::new(), MockInferenceService::new(), MockArtifactSink::new()).await;
        let id = VideoId::from("v1");
        let running = VideoPatch::new()
            .set(VideoField::Status(ProcessingStatus::Processing))
            .set(VideoField::ProcessingStage(Some(ProcessingStage::AnalyzingContent)));
        store.update(&id, &running).await.unwrap();

        let err = pipeline
            .advance_stage(&id, ProcessingStage::UploadingToGemini)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Conflict(_)));
        let err = pipeline
            .advance_stage(&id, ProcessingStage::AnalyzingContent)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Conflict(_)));

        let video = store.require(&id).await.unwrap();
        assert_eq!(video.processing_stage, Some(ProcessingStage::AnalyzingContent));
    }

    #[tokio::test]
    async fn test_stage_advance_requires_processing() {
        let (pipeline, store) =
            pipeline_with(MockObjectStore::new(), MockInferenceService::new(), MockArtifactSink::new()).await;
        let id = VideoId::from("v1");

        let err = pipeline
            .advance_stage(&id, ProcessingStage::UploadingToGemini)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Conflict(_)));
        assert_eq!(store.require(&id).await.unwrap().processing_stage, None);
    }
}
