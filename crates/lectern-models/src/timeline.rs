//! Learning timeline models: concepts, checkpoints and quiz questions.

use std::collections::HashMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::timestamp::{lenient_seconds, lenient_seconds_opt};

/// Default pause before a checkpoint overlay appears (seconds).
pub const DEFAULT_PAUSE_DELAY_SECS: f64 = 0.5;

fn default_pause_delay() -> f64 {
    DEFAULT_PAUSE_DELAY_SECS
}

/// Implements a tolerant `Deserialize` for string enums: any JSON value is
/// accepted and mapped through `parse_lenient`, falling back to the default.
macro_rules! lenient_enum_deserialize {
    ($ty:ty) => {
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let value = Value::deserialize(deserializer)?;
                Ok(value.as_str().map(<$ty>::parse_lenient).unwrap_or_default())
            }
        }
    };
}

// ============================================================================
// Concepts
// ============================================================================

/// How central a concept is to the lecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Core,
    #[default]
    Supporting,
    Supplementary,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Supporting => "supporting",
            Self::Supplementary => "supplementary",
        }
    }

    /// Parse model output, accepting the high/medium/low aliases.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "core" | "high" | "critical" => Self::Core,
            "supplementary" | "low" | "optional" => Self::Supplementary,
            _ => Self::Supporting,
        }
    }
}

lenient_enum_deserialize!(Importance);

/// Position of a concept in the two-level hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConceptType {
    #[default]
    Main,
    Sub,
}

impl ConceptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Sub => "sub",
        }
    }

    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "sub" | "subconcept" | "sub-concept" | "child" => Self::Sub,
            _ => Self::Main,
        }
    }
}

lenient_enum_deserialize!(ConceptType);

/// A titled, timestamped topic marker in the video timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Concept {
    /// Concept title
    #[serde(rename = "concept", alias = "title", default)]
    pub title: String,

    /// Seconds from the start of the video
    #[serde(default, with = "lenient_seconds")]
    #[schemars(with = "f64")]
    pub timestamp: f64,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub importance: Importance,

    #[serde(default)]
    pub concept_type: ConceptType,

    /// `{timestamp}-{index}` key of the parent main concept (sub concepts only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(default)]
    pub visual_emphasis: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_elements: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_snippet: Option<String>,
}

impl Concept {
    /// Create a main concept with default importance.
    pub fn new(title: impl Into<String>, timestamp: f64) -> Self {
        Self {
            title: title.into(),
            timestamp,
            description: String::new(),
            importance: Importance::default(),
            concept_type: ConceptType::Main,
            parent_id: None,
            visual_emphasis: false,
            visual_elements: None,
            transcript_snippet: None,
        }
    }

    /// Turn this concept into a sub concept of `parent_key`.
    pub fn with_parent(mut self, parent_key: impl Into<String>) -> Self {
        self.concept_type = ConceptType::Sub;
        self.parent_id = Some(parent_key.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_importance(mut self, importance: Importance) -> Self {
        self.importance = importance;
        self
    }

    /// Composite key used by sub concepts to reference this concept.
    pub fn key(&self, index: usize) -> String {
        concept_key(self.timestamp, index)
    }

    pub fn is_main(&self) -> bool {
        self.concept_type == ConceptType::Main
    }
}

/// Build the `{timestamp}-{index}` key of the concept at `index`.
pub fn concept_key(timestamp: f64, index: usize) -> String {
    format!("{}-{}", timestamp, index)
}

/// A broken parent/child relation between concepts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HierarchyViolation {
    #[error("Sub concept '{title}' (index {index}) has no parentId")]
    SubWithoutParent { index: usize, title: String },

    #[error("Sub concept '{title}' (index {index}) references unknown parent '{parent_id}'")]
    DanglingParent {
        index: usize,
        title: String,
        parent_id: String,
    },

    #[error("Sub concept '{title}' (index {index}) references '{parent_id}', which is not a main concept")]
    ParentNotMain {
        index: usize,
        title: String,
        parent_id: String,
    },

    #[error("Main concept '{title}' (index {index}) must not carry parentId '{parent_id}'")]
    MainWithParent {
        index: usize,
        title: String,
        parent_id: String,
    },
}

/// Check the main/sub hierarchy of a concept list.
///
/// Returns every violation found; an empty vector means the hierarchy is
/// consistent.
pub fn validate_hierarchy(concepts: &[Concept]) -> Vec<HierarchyViolation> {
    let by_key: HashMap<String, &Concept> = concepts
        .iter()
        .enumerate()
        .map(|(i, c)| (c.key(i), c))
        .collect();

    let mut violations = Vec::new();

    for (index, concept) in concepts.iter().enumerate() {
        let parent = concept
            .parent_id
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());

        match (concept.concept_type, parent) {
            (ConceptType::Main, None) => {}
            (ConceptType::Main, Some(parent_id)) => {
                violations.push(HierarchyViolation::MainWithParent {
                    index,
                    title: concept.title.clone(),
                    parent_id: parent_id.to_string(),
                });
            }
            (ConceptType::Sub, None) => {
                violations.push(HierarchyViolation::SubWithoutParent {
                    index,
                    title: concept.title.clone(),
                });
            }
            (ConceptType::Sub, Some(parent_id)) => match by_key.get(parent_id) {
                None => violations.push(HierarchyViolation::DanglingParent {
                    index,
                    title: concept.title.clone(),
                    parent_id: parent_id.to_string(),
                }),
                Some(p) if !p.is_main() => violations.push(HierarchyViolation::ParentNotMain {
                    index,
                    title: concept.title.clone(),
                    parent_id: parent_id.to_string(),
                }),
                Some(_) => {}
            },
        }
    }

    violations
}

// ============================================================================
// Checkpoints
// ============================================================================

/// Pedagogical type of an interactive checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub enum CheckpointType {
    QuickQuiz,
    #[default]
    Reflection,
    Prediction,
    Application,
}

impl CheckpointType {
    pub const ALL: [CheckpointType; 4] = [
        Self::QuickQuiz,
        Self::Reflection,
        Self::Prediction,
        Self::Application,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuickQuiz => "quickQuiz",
            Self::Reflection => "reflection",
            Self::Prediction => "prediction",
            Self::Application => "application",
        }
    }

    pub fn parse_lenient(s: &str) -> Self {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "quickquiz" | "quiz" => Self::QuickQuiz,
            "prediction" | "predict" => Self::Prediction,
            "application" | "apply" => Self::Application,
            _ => Self::Reflection,
        }
    }
}

impl fmt::Display for CheckpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

lenient_enum_deserialize!(CheckpointType);

/// An interactive pause point in the video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    #[serde(default, with = "lenient_seconds")]
    #[schemars(with = "f64")]
    pub timestamp: f64,

    #[serde(rename = "type", default)]
    pub checkpoint_type: CheckpointType,

    #[serde(default)]
    pub prompt: String,

    /// Answer options (quickQuiz only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,

    /// Index into `options` (quickQuiz only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,

    /// Title of the concept this checkpoint reinforces
    #[serde(default)]
    pub related_concept: String,

    /// Absolute seconds where rewatch context begins
    #[serde(default, with = "lenient_seconds_opt", skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<f64>")]
    pub context_start_timestamp: Option<f64>,

    #[serde(default = "default_pause_delay")]
    pub pause_delay_seconds: f64,
}

impl Checkpoint {
    pub fn new(
        timestamp: f64,
        checkpoint_type: CheckpointType,
        prompt: impl Into<String>,
        related_concept: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            checkpoint_type,
            prompt: prompt.into(),
            options: None,
            correct_answer: None,
            hint: None,
            related_concept: related_concept.into(),
            context_start_timestamp: None,
            pause_delay_seconds: DEFAULT_PAUSE_DELAY_SECS,
        }
    }

    /// Attach quiz options; used for quickQuiz checkpoints.
    pub fn with_options(mut self, options: Vec<String>, correct_answer: usize) -> Self {
        self.options = Some(options);
        self.correct_answer = Some(correct_answer);
        self
    }

    /// Structural check: quickQuiz checkpoints need options and a valid answer.
    pub fn validate(&self) -> Result<(), String> {
        if self.prompt.trim().is_empty() {
            return Err("Checkpoint prompt cannot be empty".to_string());
        }
        if self.checkpoint_type != CheckpointType::QuickQuiz {
            return Ok(());
        }

        let options = self
            .options
            .as_ref()
            .filter(|o| o.len() >= 2)
            .ok_or_else(|| "quickQuiz checkpoints need at least 2 options".to_string())?;

        match self.correct_answer {
            Some(answer) if answer < options.len() => Ok(()),
            Some(answer) => Err(format!(
                "correctAnswer {} is out of range for {} options",
                answer,
                options.len()
            )),
            None => Err("quickQuiz checkpoints need a correctAnswer".to_string()),
        }
    }
}

// ============================================================================
// Quiz
// ============================================================================

/// A multiple-choice question covering the lecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    #[serde(default)]
    pub question: String,

    #[serde(default)]
    pub options: Vec<String>,

    #[serde(default)]
    pub correct_answer: usize,

    #[serde(default)]
    pub explanation: String,

    #[serde(default)]
    pub related_concept: String,
}

impl QuizQuestion {
    pub fn validate(&self) -> Result<(), String> {
        if self.question.trim().is_empty() {
            return Err("Quiz question text cannot be empty".to_string());
        }
        if self.options.len() < 2 {
            return Err("Quiz questions need at least 2 options".to_string());
        }
        if self.correct_answer >= self.options.len() {
            return Err(format!(
                "correctAnswer {} is out of range for {} options",
                self.correct_answer,
                self.options.len()
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Analysis result
// ============================================================================

/// Canonical, persistable output of one analysis run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub concepts: Vec<Concept>,
    #[serde(default)]
    pub quiz: Vec<QuizQuestion>,
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
    #[serde(default)]
    pub summary: String,
    /// Video duration in seconds (0 when unknown)
    #[serde(default)]
    pub duration: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_concept_deserializes_concept_or_title() {
        let a: Concept = serde_json::from_value(json!({"concept": "Entropy", "timestamp": 12})).unwrap();
        let b: Concept = serde_json::from_value(json!({"title": "Entropy", "timestamp": "00:12"})).unwrap();
        assert_eq!(a.title, "Entropy");
        assert_eq!(b.title, "Entropy");
        assert_eq!(b.timestamp, 12.0);
        assert_eq!(a.concept_type, ConceptType::Main);
    }

    #[test]
    fn test_concept_serializes_with_concept_field() {
        let concept = Concept::new("Entropy", 30.0);
        let value = serde_json::to_value(&concept).unwrap();
        assert_eq!(value["concept"], "Entropy");
        assert_eq!(value["conceptType"], "main");
        assert!(value.get("parentId").is_none());
    }

    #[test]
    fn test_importance_aliases() {
        assert_eq!(Importance::parse_lenient("high"), Importance::Core);
        assert_eq!(Importance::parse_lenient("Medium"), Importance::Supporting);
        assert_eq!(Importance::parse_lenient("low"), Importance::Supplementary);
        assert_eq!(Importance::parse_lenient("???"), Importance::Supporting);

        let c: Concept = serde_json::from_value(json!({"concept": "x", "importance": "high"})).unwrap();
        assert_eq!(c.importance, Importance::Core);
        let c: Concept = serde_json::from_value(json!({"concept": "x", "importance": 7})).unwrap();
        assert_eq!(c.importance, Importance::Supporting);
    }

    #[test]
    fn test_checkpoint_type_parse() {
        assert_eq!(CheckpointType::parse_lenient("quickQuiz"), CheckpointType::QuickQuiz);
        assert_eq!(CheckpointType::parse_lenient("quick_quiz"), CheckpointType::QuickQuiz);
        assert_eq!(CheckpointType::parse_lenient("Prediction"), CheckpointType::Prediction);
        assert_eq!(CheckpointType::parse_lenient("discussion"), CheckpointType::Reflection);
    }

    #[test]
    fn test_sub_without_parent_is_violation() {
        let mut sub = Concept::new("Child", 20.0);
        sub.concept_type = ConceptType::Sub;
        let violations = validate_hierarchy(&[Concept::new("Root", 10.0), sub]);
        assert_eq!(violations.len(), 1);
        assert!(matches!(violations[0], HierarchyViolation::SubWithoutParent { index: 1, .. }));
    }

    #[test]
    fn test_main_with_parent_is_violation() {
        let mut main = Concept::new("Root", 10.0);
        main.parent_id = Some("5-0".to_string());
        let violations = validate_hierarchy(&[main]);
        assert!(matches!(violations[0], HierarchyViolation::MainWithParent { .. }));
    }

    #[test]
    fn test_valid_hierarchy() {
        let root = Concept::new("Root", 10.0);
        let child = Concept::new("Child", 20.0).with_parent(root.key(0));
        assert_eq!(root.key(0), "10-0");
        assert!(validate_hierarchy(&[root, child]).is_empty());
    }

    #[test]
    fn test_dangling_and_non_main_parent() {
        let root = Concept::new("Root", 10.0);
        let child = Concept::new("Child", 20.0).with_parent("10-0");
        let grandchild = Concept::new("Grandchild", 30.0).with_parent("20-1");
        let orphan = Concept::new("Orphan", 40.0).with_parent("99-9");
        let violations = validate_hierarchy(&[root, child, grandchild, orphan]);
        assert_eq!(violations.len(), 2);
        assert!(matches!(violations[0], HierarchyViolation::ParentNotMain { index: 2, .. }));
        assert!(matches!(violations[1], HierarchyViolation::DanglingParent { index: 3, .. }));
    }

    #[test]
    fn test_quick_quiz_checkpoint_validation() {
        let cp = Checkpoint::new(60.0, CheckpointType::QuickQuiz, "Which?", "Entropy");
        assert!(cp.validate().is_err());

        let cp = cp.with_options(vec!["a".into(), "b".into()], 1);
        assert!(cp.validate().is_ok());

        let reflection = Checkpoint::new(60.0, CheckpointType::Reflection, "Why?", "Entropy");
        assert!(reflection.validate().is_ok());
    }

    #[test]
    fn test_checkpoint_defaults_pause_delay() {
        let cp: Checkpoint = serde_json::from_value(json!({
            "timestamp": "1:00",
            "type": "reflection",
            "prompt": "Think"
        }))
        .unwrap();
        assert_eq!(cp.timestamp, 60.0);
        assert_eq!(cp.pause_delay_seconds, DEFAULT_PAUSE_DELAY_SECS);
        assert_eq!(cp.context_start_timestamp, None);
    }

    #[test]
    fn test_quiz_validation() {
        let q = QuizQuestion {
            question: "2+2?".into(),
            options: vec!["3".into(), "4".into()],
            correct_answer: 1,
            explanation: String::new(),
            related_concept: String::new(),
        };
        assert!(q.validate().is_ok());
        assert!(QuizQuestion { correct_answer: 2, ..q }.validate().is_err());
    }
}
