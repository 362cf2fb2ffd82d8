//! Refinement, engagement, suggestion merge-back and context handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use lectern_models::{AnalysisResult, Suggestion, VideoId};
use lectern_pipeline::ContextRequest;

use crate::error::ApiResult;
use crate::handlers::videos::RunAccepted;
use crate::metrics::{record_run_submitted, record_suggestion_applied};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinementRequest {
    #[serde(default)]
    pub focus_area: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ContextSummaryResponse {
    pub summary: String,
}

/// Start a refinement run. The body is optional.
///
/// 400 when the video has no concepts, 409 while a run is in progress.
pub async fn start_refinement(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    body: Option<Json<RefinementRequest>>,
) -> ApiResult<(StatusCode, Json<RunAccepted>)> {
    let id = VideoId::from(video_id);
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let handle = state.pipeline.start_refinement(&id, request.focus_area).await?;
    record_run_submitted("refinement");
    info!(video_id = %id, task = %handle.name(), "Refinement accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(RunAccepted {
            video_id: id.to_string(),
            operation: "refinement",
            task: handle.name().to_string(),
        }),
    ))
}

/// Start an engagement analysis run.
pub async fn start_engagement(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> ApiResult<(StatusCode, Json<RunAccepted>)> {
    let id = VideoId::from(video_id);
    let handle = state.pipeline.start_engagement(&id).await?;
    record_run_submitted("engagement");
    info!(video_id = %id, task = %handle.name(), "Engagement analysis accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(RunAccepted {
            video_id: id.to_string(),
            operation: "engagement",
            task: handle.name().to_string(),
        }),
    ))
}

/// Merge one accepted suggestion into the stored timeline.
pub async fn apply_suggestion(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    Json(suggestion): Json<Suggestion>,
) -> ApiResult<Json<AnalysisResult>> {
    let id = VideoId::from(video_id);
    let kind = suggestion.kind();
    let video = state.pipeline.apply_suggestion(&id, suggestion).await?;
    record_suggestion_applied(kind);
    info!(video_id = %id, kind, "Suggestion applied");

    Ok(Json(video.timeline()))
}

pub async fn context_summary(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    Json(request): Json<ContextRequest>,
) -> ApiResult<Json<ContextSummaryResponse>> {
    let summary = state.pipeline.context_summary(&VideoId::from(video_id), &request).await?;
    Ok(Json(ContextSummaryResponse { summary }))
}
