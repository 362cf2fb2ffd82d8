//! Processing trigger, status polling and timeline handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use lectern_models::{
    AnalysisResult, EngagementStatus, ProcessingStage, ProcessingStatus, RefinementStatus, VideoId,
};
use lectern_pipeline::VideoStore;

use crate::error::ApiResult;
use crate::metrics::record_run_submitted;
use crate::state::AppState;

/// Body of every 202 response for a detached run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAccepted {
    pub video_id: String,
    pub operation: &'static str,
    pub task: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatusResponse {
    pub video_id: String,
    pub status: ProcessingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_stage: Option<ProcessingStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_error: Option<String>,
    /// Whether the stored analysis matches the active generation config
    pub analysis_current: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_analysis_completed_at: Option<DateTime<Utc>>,
    pub refinement_status: RefinementStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refinement_error: Option<String>,
    pub engagement_status: EngagementStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engagement_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
}

/// Start (or re-run) processing for a video.
///
/// 202 when admitted, 404 for an unknown video, 409 while a run is in
/// progress.
pub async fn start_processing(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> ApiResult<(StatusCode, Json<RunAccepted>)> {
    let id = VideoId::from(video_id);
    let handle = state.pipeline.start_processing(&id).await?;
    record_run_submitted("processing");
    info!(video_id = %id, task = %handle.name(), "Processing accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(RunAccepted {
            video_id: id.to_string(),
            operation: "processing",
            task: handle.name().to_string(),
        }),
    ))
}

/// Poll processing, refinement and engagement state.
pub async fn get_video_status(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> ApiResult<Json<VideoStatusResponse>> {
    let id = VideoId::from(video_id);
    let video = state.pipeline.store().require(&id).await?;

    Ok(Json(VideoStatusResponse {
        video_id: id.to_string(),
        analysis_current: video.analysis_is_current(state.pipeline.fingerprint()),
        status: video.status,
        processing_stage: video.processing_stage,
        processing_error: video.processing_error,
        ai_analysis_completed_at: video.ai_analysis_completed_at,
        refinement_status: video.refinement_status,
        refinement_error: video.refinement_error,
        engagement_status: video.engagement_status,
        engagement_error: video.engagement_error,
        media_url: video.media_url,
    }))
}

/// Current learning timeline of a video.
pub async fn get_timeline(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> ApiResult<Json<AnalysisResult>> {
    let video = state.pipeline.store().require(&VideoId::from(video_id)).await?;
    Ok(Json(video.timeline()))
}
