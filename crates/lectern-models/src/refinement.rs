//! Refinement suggestions and the typed merge-back union.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::timeline::{Checkpoint, Concept, QuizQuestion};
use crate::timestamp::lenient_seconds;

/// An `original`/`improved` pair for a concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConceptImprovement {
    pub original: Concept,
    pub improved: Concept,
    #[serde(default)]
    pub reason: String,
}

/// An improvement to the checkpoint at `index` (captured at suggestion time).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointImprovement {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<Checkpoint>,
    pub improved: Checkpoint,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuizImprovement {
    pub original: QuizQuestion,
    pub improved: QuizQuestion,
    #[serde(default)]
    pub reason: String,
}

/// A concept the model proposes to add.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConceptAddition {
    pub concept: Concept,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointAddition {
    pub checkpoint: Checkpoint,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuizAddition {
    pub question: QuizQuestion,
    #[serde(default)]
    pub reason: String,
}

/// A stretch of the video with no learning anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimelineGap {
    #[serde(default, with = "lenient_seconds")]
    #[schemars(with = "f64")]
    pub start: f64,
    #[serde(default, with = "lenient_seconds")]
    #[schemars(with = "f64")]
    pub end: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub suggestion: String,
}

/// Output of a refinement run. Ephemeral until items are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefinementSuggestionBundle {
    #[serde(default)]
    pub concepts_to_add: Vec<ConceptAddition>,
    #[serde(default)]
    pub concepts_to_improve: Vec<ConceptImprovement>,
    #[serde(default)]
    pub timeline_gaps: Vec<TimelineGap>,
    #[serde(default)]
    pub checkpoints_to_add: Vec<CheckpointAddition>,
    #[serde(default)]
    pub checkpoints_to_improve: Vec<CheckpointImprovement>,
    #[serde(default)]
    pub quiz_to_add: Vec<QuizAddition>,
    #[serde(default)]
    pub quiz_to_improve: Vec<QuizImprovement>,
}

impl RefinementSuggestionBundle {
    /// Total number of actionable suggestions (gaps excluded).
    pub fn len(&self) -> usize {
        self.concepts_to_add.len()
            + self.concepts_to_improve.len()
            + self.checkpoints_to_add.len()
            + self.checkpoints_to_improve.len()
            + self.quiz_to_add.len()
            + self.quiz_to_improve.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten the bundle into individually applicable suggestions.
    pub fn into_suggestions(self) -> Vec<Suggestion> {
        let mut out = Vec::with_capacity(self.len());
        out.extend(self.concepts_to_add.into_iter().map(Suggestion::ConceptAdd));
        out.extend(self.concepts_to_improve.into_iter().map(Suggestion::ConceptImprove));
        out.extend(self.checkpoints_to_add.into_iter().map(Suggestion::CheckpointAdd));
        out.extend(self.checkpoints_to_improve.into_iter().map(Suggestion::CheckpointImprove));
        out.extend(self.quiz_to_add.into_iter().map(Suggestion::QuizAdd));
        out.extend(self.quiz_to_improve.into_iter().map(Suggestion::QuizImprove));
        out
    }
}

/// A single suggestion a creator accepted for merge-back.
///
/// Serialized as `{"type": "conceptAdd", "suggestion": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", content = "suggestion", rename_all = "camelCase")]
pub enum Suggestion {
    ConceptAdd(ConceptAddition),
    ConceptImprove(ConceptImprovement),
    CheckpointAdd(CheckpointAddition),
    CheckpointImprove(CheckpointImprovement),
    QuizAdd(QuizAddition),
    QuizImprove(QuizImprovement),
}

impl Suggestion {
    pub fn kind(&self) -> &'static str {
        match self {
            Suggestion::ConceptAdd(_) => "conceptAdd",
            Suggestion::ConceptImprove(_) => "conceptImprove",
            Suggestion::CheckpointAdd(_) => "checkpointAdd",
            Suggestion::CheckpointImprove(_) => "checkpointImprove",
            Suggestion::QuizAdd(_) => "quizAdd",
            Suggestion::QuizImprove(_) => "quizImprove",
        }
    }
}
