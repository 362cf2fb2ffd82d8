//! Typed partial updates to a [`Video`].
//!
//! Stores apply a [`VideoPatch`] as a last-write-wins overwrite of exactly
//! the listed fields.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::engagement::EngagementAnalysis;
use crate::refinement::RefinementSuggestionBundle;
use crate::status::{EngagementStatus, ProcessingStage, ProcessingStatus, RefinementStatus};
use crate::timeline::{AnalysisResult, Checkpoint, Concept, QuizQuestion};
use crate::video::Video;

/// One persisted field and its new value.
#[derive(Debug, Clone, PartialEq)]
pub enum VideoField {
    Title(String),
    UpdatedAt(DateTime<Utc>),
    Status(ProcessingStatus),
    ProcessingStage(Option<ProcessingStage>),
    ProcessingError(Option<String>),
    MediaUrl(Option<String>),
    MediaUrlExpiresAt(Option<DateTime<Utc>>),
    Duration(f64),
    AiAnalysisCompletedAt(Option<DateTime<Utc>>),
    AiAnalysisVersion(Option<String>),
    Concepts(Vec<Concept>),
    Checkpoints(Vec<Checkpoint>),
    Quiz(Vec<QuizQuestion>),
    Transcript(String),
    Summary(String),
    RefinementStatus(RefinementStatus),
    RefinementSuggestions(Option<RefinementSuggestionBundle>),
    RefinementFocusArea(Option<String>),
    RefinementCompletedAt(Option<DateTime<Utc>>),
    RefinementError(Option<String>),
    EngagementStatus(EngagementStatus),
    EngagementAnalysis(Option<EngagementAnalysis>),
    EngagementAnalyzedAt(Option<DateTime<Utc>>),
    EngagementError(Option<String>),
}

fn to_value<T: serde::Serialize>(v: &T) -> Value {
    serde_json::to_value(v).unwrap_or(Value::Null)
}

impl VideoField {
    /// Document field name (camelCase).
    pub fn name(&self) -> &'static str {
        match self {
            VideoField::Title(_) => "title",
            VideoField::UpdatedAt(_) => "updatedAt",
            VideoField::Status(_) => "status",
            VideoField::ProcessingStage(_) => "processingStage",
            VideoField::ProcessingError(_) => "processingError",
            VideoField::MediaUrl(_) => "mediaUrl",
            VideoField::MediaUrlExpiresAt(_) => "mediaUrlExpiresAt",
            VideoField::Duration(_) => "duration",
            VideoField::AiAnalysisCompletedAt(_) => "aiAnalysisCompletedAt",
            VideoField::AiAnalysisVersion(_) => "aiAnalysisVersion",
            VideoField::Concepts(_) => "concepts",
            VideoField::Checkpoints(_) => "checkpoints",
            VideoField::Quiz(_) => "quiz",
            VideoField::Transcript(_) => "transcript",
            VideoField::Summary(_) => "summary",
            VideoField::RefinementStatus(_) => "refinementStatus",
            VideoField::RefinementSuggestions(_) => "refinementSuggestions",
            VideoField::RefinementFocusArea(_) => "refinementFocusArea",
            VideoField::RefinementCompletedAt(_) => "refinementCompletedAt",
            VideoField::RefinementError(_) => "refinementError",
            VideoField::EngagementStatus(_) => "engagementStatus",
            VideoField::EngagementAnalysis(_) => "engagementAnalysis",
            VideoField::EngagementAnalyzedAt(_) => "engagementAnalyzedAt",
            VideoField::EngagementError(_) => "engagementError",
        }
    }

    /// JSON value as it appears in the stored document.
    pub fn to_json(&self) -> Value {
        match self {
            VideoField::Title(v) => to_value(v),
            VideoField::UpdatedAt(v) => to_value(v),
            VideoField::Status(v) => to_value(v),
            VideoField::ProcessingStage(v) => to_value(v),
            VideoField::ProcessingError(v) => to_value(v),
            VideoField::MediaUrl(v) => to_value(v),
            VideoField::MediaUrlExpiresAt(v) => to_value(v),
            VideoField::Duration(v) => to_value(v),
            VideoField::AiAnalysisCompletedAt(v) => to_value(v),
            VideoField::AiAnalysisVersion(v) => to_value(v),
            VideoField::Concepts(v) => to_value(v),
            VideoField::Checkpoints(v) => to_value(v),
            VideoField::Quiz(v) => to_value(v),
            VideoField::Transcript(v) => to_value(v),
            VideoField::Summary(v) => to_value(v),
            VideoField::RefinementStatus(v) => to_value(v),
            VideoField::RefinementSuggestions(v) => to_value(v),
            VideoField::RefinementFocusArea(v) => to_value(v),
            VideoField::RefinementCompletedAt(v) => to_value(v),
            VideoField::RefinementError(v) => to_value(v),
            VideoField::EngagementStatus(v) => to_value(v),
            VideoField::EngagementAnalysis(v) => to_value(v),
            VideoField::EngagementAnalyzedAt(v) => to_value(v),
            VideoField::EngagementError(v) => to_value(v),
        }
    }

    pub fn apply_to(&self, video: &mut Video) {
        match self.clone() {
            VideoField::Title(v) => video.title = v,
            VideoField::UpdatedAt(v) => video.updated_at = v,
            VideoField::Status(v) => video.status = v,
            VideoField::ProcessingStage(v) => video.processing_stage = v,
            VideoField::ProcessingError(v) => video.processing_error = v,
            VideoField::MediaUrl(v) => video.media_url = v,
            VideoField::MediaUrlExpiresAt(v) => video.media_url_expires_at = v,
            VideoField::Duration(v) => video.duration = v,
            VideoField::AiAnalysisCompletedAt(v) => video.ai_analysis_completed_at = v,
            VideoField::AiAnalysisVersion(v) => video.ai_analysis_version = v,
            VideoField::Concepts(v) => video.concepts = v,
            VideoField::Checkpoints(v) => video.checkpoints = v,
            VideoField::Quiz(v) => video.quiz = v,
            VideoField::Transcript(v) => video.transcript = v,
            VideoField::Summary(v) => video.summary = v,
            VideoField::RefinementStatus(v) => video.refinement_status = v,
            VideoField::RefinementSuggestions(v) => video.refinement_suggestions = v,
            VideoField::RefinementFocusArea(v) => video.refinement_focus_area = v,
            VideoField::RefinementCompletedAt(v) => video.refinement_completed_at = v,
            VideoField::RefinementError(v) => video.refinement_error = v,
            VideoField::EngagementStatus(v) => video.engagement_status = v,
            VideoField::EngagementAnalysis(v) => video.engagement_analysis = v,
            VideoField::EngagementAnalyzedAt(v) => video.engagement_analyzed_at = v,
            VideoField::EngagementError(v) => video.engagement_error = v,
        }
    }
}

/// An ordered list of field writes. Later writes to the same field win.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoPatch {
    fields: Vec<VideoField>,
}

impl VideoPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: VideoField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn push(&mut self, field: VideoField) {
        self.fields.push(field);
    }

    /// Append `updatedAt = now` unless the patch already sets it.
    pub fn touch(mut self, now: DateTime<Utc>) -> Self {
        if !self.fields.iter().any(|f| matches!(f, VideoField::UpdatedAt(_))) {
            self.fields.push(VideoField::UpdatedAt(now));
        }
        self
    }

    /// Timeline fields (plus duration) from an analysis.
    pub fn analysis(result: &AnalysisResult) -> Self {
        Self::new()
            .set(VideoField::Duration(result.duration))
            .set(VideoField::Concepts(result.concepts.clone()))
            .set(VideoField::Checkpoints(result.checkpoints.clone()))
            .set(VideoField::Quiz(result.quiz.clone()))
            .set(VideoField::Transcript(result.transcript.clone()))
            .set(VideoField::Summary(result.summary.clone()))
    }

    pub fn extend(mut self, other: VideoPatch) -> Self {
        self.fields.extend(other.fields);
        self
    }

    pub fn fields(&self) -> &[VideoField] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Distinct field names, in first-write order.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            if !names.contains(&field.name()) {
                names.push(field.name());
            }
        }
        names
    }

    pub fn apply_to(&self, video: &mut Video) {
        for field in &self.fields {
            field.apply_to(video);
        }
    }

    /// Field-name to JSON map; the last write to a name wins.
    pub fn to_json_map(&self) -> serde_json::Map<String, Value> {
        let mut map = serde_json::Map::new();
        for field in &self.fields {
            map.insert(field.name().to_string(), field.to_json());
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_touches_only_listed_fields() {
        let mut video = Video::new("v1", "Lecture", "u", "p");
        video.transcript = "keep me".into();

        let patch = VideoPatch::new()
            .set(VideoField::Status(ProcessingStatus::Processing))
            .set(VideoField::ProcessingStage(Some(ProcessingStage::Initializing)));
        patch.apply_to(&mut video);

        assert_eq!(video.status, ProcessingStatus::Processing);
        assert_eq!(video.processing_stage, Some(ProcessingStage::Initializing));
        assert_eq!(video.transcript, "keep me");
    }

    #[test]
    fn test_last_write_wins() {
        let patch = VideoPatch::new()
            .set(VideoField::ProcessingError(Some("first".into())))
            .set(VideoField::ProcessingError(None));

        let map = patch.to_json_map();
        assert_eq!(map["processingError"], Value::Null);
        assert_eq!(patch.field_names(), vec!["processingError"]);
    }

    #[test]
    fn test_touch_adds_updated_at_once() {
        let now = Utc::now();
        let patch = VideoPatch::new()
            .set(VideoField::Status(ProcessingStatus::Ready))
            .touch(now)
            .touch(now);
        assert_eq!(patch.fields().len(), 2);
        assert_eq!(patch.to_json_map()["status"], "ready");
    }

    #[test]
    fn test_analysis_patch_names() {
        let patch = VideoPatch::analysis(&AnalysisResult::default());
        assert_eq!(
            patch.field_names(),
            vec!["duration", "concepts", "checkpoints", "quiz", "transcript", "summary"]
        );
    }
}
