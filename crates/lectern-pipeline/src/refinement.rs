//! Refinement and engagement runs.
//!
//! Both follow the same shape: a synchronous precondition (the video has
//! concepts), a compare-and-swap into the running state, then a detached
//! text-generation run whose JSON result is persisted with a completion
//! marker or turned into an `error` status.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::Instrument;

use lectern_models::{
    EngagementAnalysis, EngagementStatus, RefinementStatus, RefinementSuggestionBundle, Video, VideoField,
    VideoId, VideoPatch,
};
use lectern_storage::{EngagementArtifact, RefinementArtifact};

use crate::error::{PipelineError, PipelineResult};
use crate::json_extract::parse_first_json_object;
use crate::logging::JobLogger;
use crate::metrics::{record_run_completed, record_run_failed, record_run_started};
use crate::pipeline::Pipeline;
use crate::prompt::{build_engagement_prompt, build_refinement_prompt, VideoMetadata};
use crate::supervisor::TaskHandle;

const REFINEMENT: &str = "refinement";
const ENGAGEMENT: &str = "engagement";

fn require_concepts(video: &Video) -> PipelineResult<()> {
    if video.has_concepts() {
        Ok(())
    } else {
        Err(PipelineError::validation(format!(
            "video {} has no concepts yet; process it first",
            video.id
        )))
    }
}

fn refinement_can_begin(video: &Video) -> PipelineResult<()> {
    require_concepts(video)?;
    video.refinement_status.begin()?;
    Ok(())
}

fn refinement_is_running(video: &Video) -> PipelineResult<()> {
    video.refinement_status.complete()?;
    Ok(())
}

fn refinement_can_fail(video: &Video) -> PipelineResult<()> {
    video.refinement_status.fail()?;
    Ok(())
}

fn engagement_can_begin(video: &Video) -> PipelineResult<()> {
    require_concepts(video)?;
    video.engagement_status.begin()?;
    Ok(())
}

fn engagement_is_running(video: &Video) -> PipelineResult<()> {
    video.engagement_status.complete()?;
    Ok(())
}

fn engagement_can_fail(video: &Video) -> PipelineResult<()> {
    video.engagement_status.fail()?;
    Ok(())
}

impl Pipeline {
    /// Start a refinement run, optionally narrowed to `focus_area`.
    ///
    /// A video without concepts is rejected with `Validation` before any
    /// write; a run already in progress is a `Conflict`.
    pub async fn start_refinement(
        self: &Arc<Self>,
        id: &VideoId,
        focus_area: Option<String>,
    ) -> PipelineResult<TaskHandle> {
        let video = self.store.require(id).await?;
        require_concepts(&video)?;

        let focus_area = focus_area
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty());

        let begin = VideoPatch::new()
            .set(VideoField::RefinementStatus(RefinementStatus::Refining))
            .set(VideoField::RefinementSuggestions(None))
            .set(VideoField::RefinementError(None))
            .set(VideoField::RefinementCompletedAt(None))
            .set(VideoField::RefinementFocusArea(focus_area.clone()));
        self.store.update_if(id, &refinement_can_begin, &begin).await?;
        record_run_started(REFINEMENT);

        let pipeline = Arc::clone(self);
        let on_failure = Arc::clone(self);
        let run_id = id.clone();
        let failed_id = id.clone();

        Ok(self.supervisor.submit(
            format!("{}:{}", REFINEMENT, id),
            async move { pipeline.run_refinement(run_id, focus_area).await },
            move |e| async move { on_failure.fail_refinement(&failed_id, &e).await },
        ))
    }

    async fn run_refinement(self: Arc<Self>, id: VideoId, focus_area: Option<String>) -> PipelineResult<()> {
        let logger = JobLogger::new(&id, REFINEMENT);
        let span = logger.create_span();

        async move {
            let started = Instant::now();
            logger.log_start(focus_area.as_deref().unwrap_or("no focus area"));

            let video = self.store.require(&id).await?;
            let prompt = build_refinement_prompt(
                &video.concepts,
                &video.checkpoints,
                &video.quiz,
                &VideoMetadata::from_video(&video),
                video.engagement_analysis.as_ref(),
                focus_area.as_deref(),
            );
            let output = self.inference.generate_text(&prompt).await?;
            let bundle: RefinementSuggestionBundle = parse_first_json_object(&output.text)?;
            logger.log_progress(&format!(
                "model {} proposed {} suggestions and {} gaps",
                output.model,
                bundle.len(),
                bundle.timeline_gaps.len()
            ));

            let complete = VideoPatch::new()
                .set(VideoField::RefinementStatus(RefinementStatus::Complete))
                .set(VideoField::RefinementSuggestions(Some(bundle.clone())))
                .set(VideoField::RefinementCompletedAt(Some(Utc::now())))
                .set(VideoField::RefinementError(None));
            self.store.update_if(&id, &refinement_is_running, &complete).await?;

            let artifact = RefinementArtifact {
                focus_area,
                suggestions: bundle,
                recorded_at: Utc::now(),
            };
            if let Err(e) = self.artifacts.append_refinement(&id, artifact).await {
                logger.log_warning(&format!("audit append failed: {}", e));
            }

            record_run_completed(REFINEMENT, started.elapsed());
            logger.log_completion("suggestions stored");
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn fail_refinement(&self, id: &VideoId, error: &PipelineError) {
        record_run_failed(REFINEMENT);
        let logger = JobLogger::new(id, REFINEMENT);
        logger.log_error(&error.to_string());

        let patch = VideoPatch::new()
            .set(VideoField::RefinementStatus(RefinementStatus::Error))
            .set(VideoField::RefinementError(Some(error.to_string())));
        if let Err(e) = self.store.update_if(id, &refinement_can_fail, &patch).await {
            logger.log_warning(&format!("could not persist error status: {}", e));
        }
    }

    /// Start an engagement analysis run.
    ///
    /// Same preconditions as [`start_refinement`](Self::start_refinement).
    pub async fn start_engagement(self: &Arc<Self>, id: &VideoId) -> PipelineResult<TaskHandle> {
        let video = self.store.require(id).await?;
        require_concepts(&video)?;

        let begin = VideoPatch::new()
            .set(VideoField::EngagementStatus(EngagementStatus::Analyzing))
            .set(VideoField::EngagementAnalysis(None))
            .set(VideoField::EngagementAnalyzedAt(None))
            .set(VideoField::EngagementError(None));
        self.store.update_if(id, &engagement_can_begin, &begin).await?;
        record_run_started(ENGAGEMENT);

        let pipeline = Arc::clone(self);
        let on_failure = Arc::clone(self);
        let run_id = id.clone();
        let failed_id = id.clone();

        Ok(self.supervisor.submit(
            format!("{}:{}", ENGAGEMENT, id),
            async move { pipeline.run_engagement(run_id).await },
            move |e| async move { on_failure.fail_engagement(&failed_id, &e).await },
        ))
    }

    async fn run_engagement(self: Arc<Self>, id: VideoId) -> PipelineResult<()> {
        let logger = JobLogger::new(&id, ENGAGEMENT);
        let span = logger.create_span();

        async move {
            let started = Instant::now();
            logger.log_start("scoring learning effectiveness");

            let video = self.store.require(&id).await?;
            let prompt = build_engagement_prompt(&VideoMetadata::from_video(&video), &video.timeline());
            let output = self.inference.generate_text(&prompt).await?;
            let analysis: EngagementAnalysis = parse_first_json_object(&output.text)?;
            logger.log_progress(&format!(
                "model {} scored {:.0}/100",
                output.model, analysis.overall_analysis.overall_score
            ));

            let complete = VideoPatch::new()
                .set(VideoField::EngagementStatus(EngagementStatus::Complete))
                .set(VideoField::EngagementAnalysis(Some(analysis.clone())))
                .set(VideoField::EngagementAnalyzedAt(Some(Utc::now())))
                .set(VideoField::EngagementError(None));
            self.store.update_if(&id, &engagement_is_running, &complete).await?;

            let artifact = EngagementArtifact {
                analysis,
                recorded_at: Utc::now(),
            };
            if let Err(e) = self.artifacts.append_engagement(&id, artifact).await {
                logger.log_warning(&format!("audit append failed: {}", e));
            }

            record_run_completed(ENGAGEMENT, started.elapsed());
            logger.log_completion("engagement report stored");
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn fail_engagement(&self, id: &VideoId, error: &PipelineError) {
        record_run_failed(ENGAGEMENT);
        let logger = JobLogger::new(id, ENGAGEMENT);
        logger.log_error(&error.to_string());

        let patch = VideoPatch::new()
            .set(VideoField::EngagementStatus(EngagementStatus::Error))
            .set(VideoField::EngagementError(Some(error.to_string())));
        if let Err(e) = self.store.update_if(id, &engagement_can_fail, &patch).await {
            logger.log_warning(&format!("could not persist error status: {}", e));
        }
    }
}
