//! End-to-end runs of the pipeline against the in-memory store and
//! scripted collaborators.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use lectern_models::{
    Concept, EngagementStatus, ProcessingStage, ProcessingStatus, RefinementStatus, Suggestion, Video, VideoId,
};
use lectern_pipeline::{
    Backends, GenerationConfig, InMemoryVideoStore, InferenceOutput, InferenceService, LocalMedia, MediaHandle,
    NoopArtifactSink, ObjectStore, Pipeline, PipelineConfig, PipelineError, PipelineResult, SignedReference,
    TaskOutcome, VideoStore,
};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

struct FakeObjects {
    dir: tempfile::TempDir,
    downloads: AtomicUsize,
    references: AtomicUsize,
}

impl FakeObjects {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            downloads: AtomicUsize::new(0),
            references: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ObjectStore for FakeObjects {
    async fn download(&self, key: &str) -> PipelineResult<LocalMedia> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.path().join(key.replace('/', "_"));
        tokio::fs::write(&path, b"fake video bytes").await?;
        Ok(LocalMedia { path, size_bytes: 16 })
    }

    async fn read_reference(&self, key: &str, ttl: Duration) -> PipelineResult<SignedReference> {
        let n = self.references.fetch_add(1, Ordering::SeqCst);
        Ok(SignedReference {
            url: format!("https://media.example/{}?sig={}", key, n),
            expires_at: Utc::now() + chrono::Duration::from_std(ttl).unwrap(),
        })
    }

    async fn exists(&self, _key: &str) -> PipelineResult<bool> {
        Ok(true)
    }

    async fn delete(&self, _key: &str) -> PipelineResult<()> {
        Ok(())
    }
}

#[derive(Default)]
struct FakeInference {
    analysis: Mutex<String>,
    text: Mutex<String>,
    fail_generation: Mutex<bool>,
    stall: Mutex<Option<Duration>>,
    prompts: Mutex<Vec<String>>,
    uploads: AtomicUsize,
    generations: AtomicUsize,
    deletions: AtomicUsize,
}

impl FakeInference {
    fn with_analysis(body: serde_json::Value) -> Self {
        let fake = Self::default();
        *fake.analysis.lock().unwrap() = body.to_string();
        fake
    }

    fn reply_text(&self, text: impl Into<String>) {
        *self.text.lock().unwrap() = text.into();
    }

    fn calls(&self) -> usize {
        self.uploads.load(Ordering::SeqCst) + self.generations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceService for FakeInference {
    async fn upload_media(&self, path: &Path, mime_type: &str) -> PipelineResult<MediaHandle> {
        assert!(path.exists());
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(MediaHandle {
            name: "files/fake".into(),
            uri: "https://inference.example/files/fake".into(),
            mime_type: mime_type.into(),
        })
    }

    async fn wait_until_processed(&self, media: &MediaHandle) -> PipelineResult<MediaHandle> {
        let stall = *self.stall.lock().unwrap();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        Ok(media.clone())
    }

    async fn generate_from_media(&self, _media: &MediaHandle, prompt: &str) -> PipelineResult<InferenceOutput> {
        self.generations.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if *self.fail_generation.lock().unwrap() {
            return Err(PipelineError::Timeout("all models failed".into()));
        }
        Ok(InferenceOutput {
            text: format!("```json\n{}\n```", self.analysis.lock().unwrap()),
            model: "fake-model".into(),
        })
    }

    async fn generate_text(&self, prompt: &str) -> PipelineResult<InferenceOutput> {
        self.generations.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(InferenceOutput {
            text: self.text.lock().unwrap().clone(),
            model: "fake-model".into(),
        })
    }

    async fn delete_media(&self, _media: &MediaHandle) -> PipelineResult<()> {
        self.deletions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Harness {
    pipeline: Arc<Pipeline>,
    store: Arc<InMemoryVideoStore>,
    objects: Arc<FakeObjects>,
    inference: Arc<FakeInference>,
}

fn harness(inference: FakeInference) -> Harness {
    harness_with_deadline(inference, Duration::from_secs(10))
}

fn harness_with_deadline(inference: FakeInference, task_deadline: Duration) -> Harness {
    let store = Arc::new(InMemoryVideoStore::new());
    let objects = Arc::new(FakeObjects::new());
    let inference = Arc::new(inference);
    let config = PipelineConfig {
        task_deadline,
        ..PipelineConfig::default()
    };

    let pipeline = Pipeline::new(
        Backends {
            store: store.clone(),
            objects: objects.clone(),
            inference: inference.clone(),
            artifacts: Arc::new(NoopArtifactSink),
        },
        GenerationConfig::default(),
        config,
    );

    Harness {
        pipeline,
        store,
        objects,
        inference,
    }
}

fn lecture_analysis() -> serde_json::Value {
    json!({
        "duration": 694,
        "transcript": "[00:00] Today: thermodynamics.",
        "summary": "Energy, heat and entropy.",
        "concepts": [
            {"concept": "Energy", "timestamp": 20, "importance": "core", "conceptType": "main"},
            {"concept": "Work", "timestamp": 75, "conceptType": "sub", "parentId": "20-0"},
            {"concept": "Entropy", "timestamp": 300, "importance": "core"},
            {"concept": "Heat death", "timestamp": 684, "importance": "supplementary"}
        ],
        "checkpoints": [
            {"type": "prediction", "timestamp": 292, "prompt": "What will entropy do?", "relatedConcept": "Entropy"},
            {"type": "quickQuiz", "timestamp": 400, "prompt": "Which grows?", "options": ["Entropy", "Energy"],
             "correctAnswer": 0, "relatedConcept": "Entropy"},
            {"type": "reflection", "timestamp": "11:24", "prompt": "Summarize", "relatedConcept": "Heat death"}
        ],
        "quiz": [
            {"question": "Is energy conserved?", "options": ["Yes", "No"], "correctAnswer": 0}
        ]
    })
}

async fn insert(store: &InMemoryVideoStore, video: Video) -> VideoId {
    let id = video.id.clone();
    store.insert(video).await;
    id
}

fn video(id: &str) -> Video {
    Video::new(id, "Thermodynamics 101", "owner-1", format!("uploads/{}.mp4", id)).with_duration(694.0)
}

fn five_concepts() -> Vec<Concept> {
    ["Energy", "Heat", "Work", "Entropy", "Second law"]
        .iter()
        .enumerate()
        .map(|(i, t)| Concept::new(*t, 60.0 * (i as f64 + 1.0)))
        .collect()
}

// ---------------------------------------------------------------------------
// Processing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_fresh_analysis_of_694_second_video() {
    let h = harness(FakeInference::with_analysis(lecture_analysis()));
    let id = insert(&h.store, video("fresh")).await;

    let handle = h.pipeline.start_processing(&id).await.unwrap();
    assert_eq!(handle.outcome().await, TaskOutcome::Completed);

    let stored = h.store.require(&id).await.unwrap();
    assert_eq!(stored.status, ProcessingStatus::Ready);
    assert_eq!(stored.processing_stage, None);
    assert_eq!(stored.processing_error, None);
    assert_eq!(stored.duration, 694.0);
    assert_eq!(stored.concepts.len(), 4);
    assert_eq!(stored.checkpoints.len(), 3);
    assert_eq!(stored.quiz.len(), 1);
    assert!(stored.analysis_is_current(h.pipeline.fingerprint()));
    assert!(stored.media_url.as_deref().unwrap().starts_with("https://media.example/"));

    let timestamps = stored
        .concepts
        .iter()
        .map(|c| c.timestamp)
        .chain(stored.checkpoints.iter().map(|c| c.timestamp));
    for ts in timestamps {
        assert!((0.0..=684.0).contains(&ts), "timestamp {} out of bounds", ts);
    }

    let prompts = h.inference.prompts.lock().unwrap();
    assert!(prompts[0].contains("latest allowed timestamp is 684 seconds"));
    assert_eq!(h.inference.deletions.load(Ordering::SeqCst), 1);
    assert_eq!(h.objects.downloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_current_fingerprint_skips_inference() {
    let h = harness(FakeInference::with_analysis(lecture_analysis()));
    let mut analyzed = video("cached");
    analyzed.status = ProcessingStatus::Ready;
    analyzed.concepts = five_concepts();
    analyzed.ai_analysis_version = Some(h.pipeline.fingerprint().to_string());
    analyzed.ai_analysis_completed_at = Some(Utc::now());
    let id = insert(&h.store, analyzed).await;

    let handle = h.pipeline.start_processing(&id).await.unwrap();
    assert_eq!(handle.outcome().await, TaskOutcome::Completed);

    let stored = h.store.require(&id).await.unwrap();
    assert_eq!(stored.status, ProcessingStatus::Ready);
    assert_eq!(stored.concepts, five_concepts());
    assert!(stored.media_url.is_some());
    assert_eq!(h.inference.calls(), 0);
    assert_eq!(h.objects.downloads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_changed_fingerprint_forces_full_cycle() {
    let h = harness(FakeInference::with_analysis(lecture_analysis()));
    let mut stale = video("stale");
    stale.status = ProcessingStatus::Ready;
    stale.concepts = five_concepts();
    stale.ai_analysis_version = Some("1.0+000000000000".into());
    stale.ai_analysis_completed_at = Some(Utc::now());
    let id = insert(&h.store, stale).await;

    let handle = h.pipeline.start_processing(&id).await.unwrap();
    assert_eq!(handle.outcome().await, TaskOutcome::Completed);

    let stored = h.store.require(&id).await.unwrap();
    assert_eq!(h.inference.generations.load(Ordering::SeqCst), 1);
    assert_eq!(stored.concepts.len(), 4);
    assert_eq!(stored.ai_analysis_version.as_deref(), Some(h.pipeline.fingerprint()));
}

#[tokio::test]
async fn test_missing_completion_marker_is_stale() {
    let h = harness(FakeInference::with_analysis(lecture_analysis()));
    let mut partial = video("partial");
    partial.ai_analysis_version = Some(h.pipeline.fingerprint().to_string());
    let id = insert(&h.store, partial).await;

    h.pipeline.start_processing(&id).await.unwrap().outcome().await;
    assert_eq!(h.inference.generations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_start_is_rejected() {
    let h = harness(FakeInference::with_analysis(lecture_analysis()));
    let mut busy = video("busy");
    busy.status = ProcessingStatus::Processing;
    busy.processing_stage = Some(ProcessingStage::AnalyzingContent);
    let id = insert(&h.store, busy).await;

    let err = h.pipeline.start_processing(&id).await.err().unwrap();
    assert!(matches!(err, PipelineError::Conflict(_)));

    let stored = h.store.require(&id).await.unwrap();
    assert_eq!(stored.processing_stage, Some(ProcessingStage::AnalyzingContent));
    assert_eq!(h.inference.calls(), 0);
}

#[tokio::test]
async fn test_unknown_video_is_not_found() {
    let h = harness(FakeInference::default());
    let err = h.pipeline.start_processing(&VideoId::from("ghost")).await.err().unwrap();
    assert!(matches!(err, PipelineError::NotFound(_)));
}

#[tokio::test]
async fn test_inference_failure_is_terminal_without_partial_overwrite() {
    let inference = FakeInference::with_analysis(lecture_analysis());
    *inference.fail_generation.lock().unwrap() = true;
    let h = harness(inference);

    let mut previous = video("failing");
    previous.status = ProcessingStatus::Ready;
    previous.duration = 650.0;
    previous.concepts = five_concepts();
    previous.ai_analysis_version = Some("old".into());
    previous.ai_analysis_completed_at = Some(Utc::now());
    let id = insert(&h.store, previous).await;

    let outcome = h.pipeline.start_processing(&id).await.unwrap().outcome().await;
    assert_eq!(outcome, TaskOutcome::TimedOut);

    let stored = h.store.require(&id).await.unwrap();
    assert_eq!(stored.status, ProcessingStatus::Error);
    assert!(!stored.processing_error.as_deref().unwrap_or_default().is_empty());
    assert_eq!(stored.processing_stage, Some(ProcessingStage::AnalyzingContent));
    assert_eq!(stored.duration, 650.0);
    assert_eq!(stored.concepts, five_concepts());
    assert_eq!(stored.ai_analysis_version.as_deref(), Some("old"));
    // Uploaded media is still cleaned up.
    assert_eq!(h.inference.deletions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_deadline_abort_releases_local_copy_and_media() {
    let inference = FakeInference::with_analysis(lecture_analysis());
    *inference.stall.lock().unwrap() = Some(Duration::from_secs(30));
    let h = harness_with_deadline(inference, Duration::from_millis(200));
    let id = insert(&h.store, video("stalled")).await;

    let outcome = h.pipeline.start_processing(&id).await.unwrap().outcome().await;
    assert_eq!(outcome, TaskOutcome::TimedOut);

    let stored = h.store.require(&id).await.unwrap();
    assert_eq!(stored.status, ProcessingStatus::Error);
    assert_eq!(stored.processing_stage, Some(ProcessingStage::AnalyzingContent));
    assert!(stored.concepts.is_empty());

    assert_eq!(h.objects.downloads.load(Ordering::SeqCst), 1);
    assert!(!h.objects.dir.path().join("uploads_stalled.mp4").exists());

    // Media deletion runs in the background once the aborted run unwinds.
    for _ in 0..100 {
        if h.inference.deletions.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(h.inference.deletions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_malformed_output_records_error() {
    let h = harness(FakeInference::default());
    *h.inference.analysis.lock().unwrap() = "I could not watch the video.".into();
    let id = insert(&h.store, video("malformed")).await;

    let outcome = h.pipeline.start_processing(&id).await.unwrap().outcome().await;
    assert!(matches!(outcome, TaskOutcome::Failed(_)));

    let stored = h.store.require(&id).await.unwrap();
    assert_eq!(stored.status, ProcessingStatus::Error);
    assert!(stored.processing_error.unwrap().contains("Malformed analysis"));
    assert!(stored.concepts.is_empty());
}

#[tokio::test]
async fn test_retry_after_error_reenters_processing() {
    let h = harness(FakeInference::with_analysis(lecture_analysis()));
    let mut failed = video("retry");
    failed.status = ProcessingStatus::Error;
    failed.processing_error = Some("previous failure".into());
    let id = insert(&h.store, failed).await;

    let outcome = h.pipeline.start_processing(&id).await.unwrap().outcome().await;
    assert!(outcome.is_success());
    let stored = h.store.require(&id).await.unwrap();
    assert_eq!(stored.status, ProcessingStatus::Ready);
    assert_eq!(stored.processing_error, None);
}

// ---------------------------------------------------------------------------
// Refinement and engagement
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_refinement_then_merge_adds_sixth_concept() {
    let h = harness(FakeInference::default());
    h.inference.reply_text(
        "Here are my suggestions:\n".to_string()
            + &json!({
                "conceptsToAdd": [{
                    "concept": {"concept": "X", "timestamp": 180, "description": "New idea", "importance": "core"},
                    "reason": "Uncovered stretch"
                }],
                "timelineGaps": [{"start": 170, "end": 200, "description": "No anchor"}]
            })
            .to_string(),
    );

    let mut ready = video("refine");
    ready.status = ProcessingStatus::Ready;
    ready.concepts = five_concepts();
    let id = insert(&h.store, ready).await;

    let handle = h
        .pipeline
        .start_refinement(&id, Some("  pacing  ".into()))
        .await
        .unwrap();
    assert!(handle.outcome().await.is_success());

    let stored = h.store.require(&id).await.unwrap();
    assert_eq!(stored.refinement_status, RefinementStatus::Complete);
    assert_eq!(stored.refinement_focus_area.as_deref(), Some("pacing"));
    assert!(stored.refinement_completed_at.is_some());
    let bundle = stored.refinement_suggestions.unwrap();
    assert_eq!(bundle.len(), 1);
    assert!(h.inference.prompts.lock().unwrap()[0].contains("Concentrate every suggestion on: pacing"));

    let suggestion = bundle.into_suggestions().remove(0);
    assert!(matches!(suggestion, Suggestion::ConceptAdd(_)));
    let updated = h.pipeline.apply_suggestion(&id, suggestion).await.unwrap();

    assert_eq!(updated.concepts.len(), 6);
    assert_eq!(&updated.concepts[..5], &five_concepts()[..]);
    assert_eq!(updated.concepts[5].title, "X");
    assert_eq!(h.store.require(&id).await.unwrap().concepts.len(), 6);
}

#[tokio::test]
async fn test_refinement_without_json_records_error() {
    let h = harness(FakeInference::default());
    h.inference.reply_text("Sorry, nothing to suggest.");
    let mut ready = video("refine-bad");
    ready.concepts = five_concepts();
    let id = insert(&h.store, ready).await;

    let outcome = h.pipeline.start_refinement(&id, None).await.unwrap().outcome().await;
    assert!(matches!(outcome, TaskOutcome::Failed(_)));

    let stored = h.store.require(&id).await.unwrap();
    assert_eq!(stored.refinement_status, RefinementStatus::Error);
    assert!(stored.refinement_error.unwrap().contains("no JSON object"));
    assert!(stored.refinement_suggestions.is_none());
}

#[tokio::test]
async fn test_refinement_already_running_is_conflict() {
    let h = harness(FakeInference::default());
    let mut running = video("refining");
    running.concepts = five_concepts();
    running.refinement_status = RefinementStatus::Refining;
    let id = insert(&h.store, running).await;

    let err = h.pipeline.start_refinement(&id, None).await.err().unwrap();
    assert!(matches!(err, PipelineError::Conflict(_)));
}

#[tokio::test]
async fn test_engagement_requires_concepts() {
    let h = harness(FakeInference::default());
    let mut empty = video("no-concepts");
    empty.engagement_status = EngagementStatus::Complete;
    let id = insert(&h.store, empty).await;

    let err = h.pipeline.start_engagement(&id).await.err().unwrap();
    assert!(matches!(err, PipelineError::Validation(_)));

    let stored = h.store.require(&id).await.unwrap();
    assert_eq!(stored.engagement_status, EngagementStatus::Complete);
    assert_eq!(h.inference.calls(), 0);

    let err = h.pipeline.start_refinement(&id, None).await.err().unwrap();
    assert!(matches!(err, PipelineError::Validation(_)));
}

#[tokio::test]
async fn test_engagement_report_is_stored_and_grounds_refinement() {
    let h = harness(FakeInference::default());
    h.inference.reply_text(
        json!({
            "engagementRate": {"score": 72, "explanation": "steady"},
            "learningRateGraph": {
                "segments": [],
                "criticalDrops": [{"timestamp": "4:10", "reason": "Long derivation", "fix": "Add a checkpoint"}]
            },
            "overallAnalysis": {"overallScore": 68, "tier": "good", "topPriorities": ["Shorten the derivation"]}
        })
        .to_string(),
    );
    let mut ready = video("engage");
    ready.concepts = five_concepts();
    let id = insert(&h.store, ready).await;

    let outcome = h.pipeline.start_engagement(&id).await.unwrap().outcome().await;
    assert!(outcome.is_success());

    let stored = h.store.require(&id).await.unwrap();
    assert_eq!(stored.engagement_status, EngagementStatus::Complete);
    assert!(stored.engagement_analyzed_at.is_some());
    let report = stored.engagement_analysis.unwrap();
    assert_eq!(report.overall_analysis.overall_score, 68.0);
    assert_eq!(report.learning_rate_graph.critical_drops[0].timestamp, 250.0);

    h.inference.reply_text(json!({}).to_string());
    h.pipeline.start_refinement(&id, None).await.unwrap().outcome().await;
    let prompts = h.inference.prompts.lock().unwrap();
    assert!(prompts.last().unwrap().contains("Shorten the derivation"));
}

#[tokio::test]
async fn test_context_summary_for_stored_video() {
    let h = harness(FakeInference::default());
    let mut ready = video("context");
    ready.concepts = five_concepts();
    let id = insert(&h.store, ready).await;

    let request = lectern_pipeline::ContextRequest {
        current_time: 125.0,
        ..Default::default()
    };
    let summary = h.pipeline.context_summary(&id, &request).await.unwrap();
    assert!(summary.contains("Nearby concepts: Energy (01:00), Heat (02:00), Work (03:00)."));
    assert!(summary.chars().count() <= 900);

    let missing = h.pipeline.context_summary(&VideoId::from("nope"), &request).await;
    assert!(matches!(missing, Err(PipelineError::NotFound(_))));
}
