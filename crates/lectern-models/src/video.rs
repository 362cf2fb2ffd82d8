//! Video aggregate root.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::engagement::EngagementAnalysis;
use crate::refinement::RefinementSuggestionBundle;
use crate::status::{EngagementStatus, ProcessingStage, ProcessingStatus, RefinementStatus};
use crate::timeline::{AnalysisResult, Checkpoint, Concept, QuizQuestion};

/// Default MIME type for uploaded lectures.
pub const DEFAULT_MIME_TYPE: &str = "video/mp4";

fn default_mime_type() -> String {
    DEFAULT_MIME_TYPE.to_string()
}

/// Unique identifier for an uploaded video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Generate a new random video ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A lecture video and everything derived from it.
///
/// Stored as one document; every nested entity is owned by its array
/// position in this aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: VideoId,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub owner_id: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    // --- processing ---
    #[serde(default)]
    pub status: ProcessingStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_stage: Option<ProcessingStage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_error: Option<String>,

    /// Object key of the uploaded source file
    #[serde(default)]
    pub storage_path: String,

    #[serde(default = "default_mime_type")]
    pub mime_type: String,

    /// Time-limited playback reference for the source file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url_expires_at: Option<DateTime<Utc>>,

    /// Duration in seconds (0 when unknown)
    #[serde(default)]
    pub duration: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_analysis_completed_at: Option<DateTime<Utc>>,

    /// Generation config fingerprint of the stored analysis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_analysis_version: Option<String>,

    // --- timeline ---
    #[serde(default)]
    pub concepts: Vec<Concept>,

    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,

    #[serde(default)]
    pub quiz: Vec<QuizQuestion>,

    #[serde(default)]
    pub transcript: String,

    #[serde(default)]
    pub summary: String,

    // --- refinement ---
    #[serde(default)]
    pub refinement_status: RefinementStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinement_suggestions: Option<RefinementSuggestionBundle>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinement_focus_area: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinement_completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinement_error: Option<String>,

    // --- engagement ---
    #[serde(default)]
    pub engagement_status: EngagementStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement_analysis: Option<EngagementAnalysis>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement_analyzed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement_error: Option<String>,
}

impl Video {
    /// Create a freshly uploaded video.
    pub fn new(
        id: impl Into<VideoId>,
        title: impl Into<String>,
        owner_id: impl Into<String>,
        storage_path: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            owner_id: owner_id.into(),
            created_at: now,
            updated_at: now,
            status: ProcessingStatus::Uploaded,
            processing_stage: None,
            processing_error: None,
            storage_path: storage_path.into(),
            mime_type: default_mime_type(),
            media_url: None,
            media_url_expires_at: None,
            duration: 0.0,
            ai_analysis_completed_at: None,
            ai_analysis_version: None,
            concepts: Vec::new(),
            checkpoints: Vec::new(),
            quiz: Vec::new(),
            transcript: String::new(),
            summary: String::new(),
            refinement_status: RefinementStatus::Idle,
            refinement_suggestions: None,
            refinement_focus_area: None,
            refinement_completed_at: None,
            refinement_error: None,
            engagement_status: EngagementStatus::Idle,
            engagement_analysis: None,
            engagement_analyzed_at: None,
            engagement_error: None,
        }
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Copy an analysis into the timeline fields.
    pub fn with_analysis(mut self, analysis: AnalysisResult) -> Self {
        self.duration = analysis.duration;
        self.concepts = analysis.concepts;
        self.checkpoints = analysis.checkpoints;
        self.quiz = analysis.quiz;
        self.transcript = analysis.transcript;
        self.summary = analysis.summary;
        self
    }

    /// Whether the stored analysis was produced with `fingerprint`.
    ///
    /// A missing version or completion marker always counts as stale.
    pub fn analysis_is_current(&self, fingerprint: &str) -> bool {
        self.ai_analysis_completed_at.is_some()
            && self.ai_analysis_version.as_deref() == Some(fingerprint)
    }

    pub fn has_concepts(&self) -> bool {
        !self.concepts.is_empty()
    }

    /// Snapshot of the timeline as an analysis result.
    pub fn timeline(&self) -> AnalysisResult {
        AnalysisResult {
            transcript: self.transcript.clone(),
            concepts: self.concepts.clone(),
            quiz: self.quiz.clone(),
            checkpoints: self.checkpoints.clone(),
            summary: self.summary.clone(),
            duration: self.duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_video_id_generation() {
        let a = VideoId::new();
        let b = VideoId::new();
        assert_ne!(a, b);
        assert_eq!(VideoId::from("abc").to_string(), "abc");
    }

    #[test]
    fn test_new_video_defaults() {
        let video = Video::new("v1", "Thermodynamics", "user-1", "videos/v1.mp4");
        assert_eq!(video.status, ProcessingStatus::Uploaded);
        assert_eq!(video.mime_type, "video/mp4");
        assert_eq!(video.refinement_status, RefinementStatus::Idle);
        assert!(!video.has_concepts());
    }

    #[test]
    fn test_analysis_is_current_requires_both_markers() {
        let mut video = Video::new("v1", "t", "u", "p");
        assert!(!video.analysis_is_current("v3+abc"));

        video.ai_analysis_version = Some("v3+abc".into());
        assert!(!video.analysis_is_current("v3+abc"));

        video.ai_analysis_completed_at = Some(Utc::now());
        assert!(video.analysis_is_current("v3+abc"));
        assert!(!video.analysis_is_current("v4+abc"));
    }

    #[test]
    fn test_serializes_camel_case() {
        let video = Video::new("v1", "t", "u", "videos/v1.mp4");
        let value = serde_json::to_value(&video).unwrap();
        assert_eq!(value["storagePath"], "videos/v1.mp4");
        assert_eq!(value["refinementStatus"], "idle");
        assert!(value.get("processingError").is_none());
    }

    #[test]
    fn test_deserializes_sparse_document() {
        let video: Video = serde_json::from_value(json!({
            "id": "v9",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z",
            "status": "ready",
            "concepts": [{"concept": "Entropy", "timestamp": "01:00"}]
        }))
        .unwrap();

        assert_eq!(video.status, ProcessingStatus::Ready);
        assert_eq!(video.concepts[0].timestamp, 60.0);
        assert_eq!(video.engagement_status, EngagementStatus::Idle);
        assert_eq!(video.mime_type, DEFAULT_MIME_TYPE);
    }
}
