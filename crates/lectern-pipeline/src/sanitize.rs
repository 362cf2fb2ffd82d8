//! Turning raw model output into a canonical, bounded [`AnalysisResult`].
//!
//! The sanitizer is deliberately forgiving: apart from a payload that is not
//! a JSON object at all, every defect is repaired (coerced, clamped,
//! defaulted or dropped) rather than reported. Timing policy is checked
//! separately by [`audit_timing`], which never rejects.

use std::collections::HashSet;

use serde_json::{Map, Value};
use thiserror::Error;

use lectern_models::timeline::DEFAULT_PAUSE_DELAY_SECS;
use lectern_models::timestamp::coerce_seconds_str;
use lectern_models::{
    coerce_seconds, AnalysisResult, Checkpoint, CheckpointType, Concept, ConceptType, Importance,
    QuizQuestion,
};

use crate::prompt::generation_config::{non_negative, GenerationConfig};

/// The payload could not be read as a JSON object.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedAnalysisError {
    #[error("analysis response is empty")]
    Empty,

    #[error("analysis response is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("analysis response is a JSON {0}, expected an object")]
    NotAnObject(&'static str),
}

/// Inputs the sanitizer needs besides the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizePolicy {
    /// Duration to use when the payload reports none
    pub fallback_duration: Option<f64>,
    pub default_pause_delay: f64,
}

impl Default for SanitizePolicy {
    fn default() -> Self {
        Self {
            fallback_duration: None,
            default_pause_delay: DEFAULT_PAUSE_DELAY_SECS,
        }
    }
}

impl SanitizePolicy {
    pub fn from_config(config: &GenerationConfig, fallback_duration: Option<f64>) -> Self {
        Self {
            fallback_duration,
            default_pause_delay: non_negative(config.timing.pause_delay.default),
        }
    }
}

/// Remove a surrounding Markdown code fence (```` ```json ```` or ```` ``` ````).
pub fn strip_code_fences(text: &str) -> &str {
    let mut t = text.trim();
    if let Some(rest) = t.strip_prefix("```") {
        t = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    }
    let t = t.trim();
    t.strip_suffix("```").unwrap_or(t).trim()
}

/// Parse and sanitize a raw analysis response.
pub fn sanitize_analysis(
    raw: &str,
    policy: &SanitizePolicy,
) -> Result<AnalysisResult, MalformedAnalysisError> {
    let text = strip_code_fences(raw);
    if text.is_empty() {
        return Err(MalformedAnalysisError::Empty);
    }

    let value: Value =
        serde_json::from_str(text).map_err(|e| MalformedAnalysisError::InvalidJson(e.to_string()))?;

    match value {
        Value::Object(map) => Ok(sanitize_object(&map, policy)),
        other => Err(MalformedAnalysisError::NotAnObject(json_kind(&other))),
    }
}

/// Sanitize an already-parsed payload object.
pub fn sanitize_object(obj: &Map<String, Value>, policy: &SanitizePolicy) -> AnalysisResult {
    let duration = resolve_duration(obj.get("duration"), policy.fallback_duration);
    let ceiling = (duration > 0.0).then_some(duration);

    let concepts = objects(obj, "concepts")
        .map(|m| sanitize_concept(m, ceiling))
        .collect();

    let checkpoints = objects(obj, "checkpoints")
        .map(|m| sanitize_checkpoint(m, ceiling, policy.default_pause_delay))
        .collect();

    let quiz = objects(obj, "quiz").filter_map(sanitize_question).collect();

    AnalysisResult {
        transcript: text_block(obj.get("transcript")),
        concepts: resolve_hierarchy(concepts),
        quiz,
        checkpoints,
        summary: text_block(obj.get("summary")),
        duration,
    }
}

fn resolve_duration(reported: Option<&Value>, fallback: Option<f64>) -> f64 {
    let reported = reported.map(coerce_seconds).unwrap_or(0.0);
    if reported.is_finite() && reported > 0.0 {
        return reported;
    }
    fallback
        .filter(|d| d.is_finite() && *d > 0.0)
        .unwrap_or(0.0)
}

/// Clamp to `[0, ceiling]`, or only to `>= 0` when the duration is unknown.
pub fn clamp_timestamp(ts: f64, ceiling: Option<f64>) -> f64 {
    let ts = non_negative(ts);
    match ceiling {
        Some(d) => ts.min(d),
        None => ts,
    }
}

fn sanitize_concept(m: &Map<String, Value>, ceiling: Option<f64>) -> Concept {
    Concept {
        title: string_field(m, &["concept", "title", "name"]),
        timestamp: clamp_timestamp(m.get("timestamp").map(coerce_seconds).unwrap_or(0.0), ceiling),
        description: string_field(m, &["description"]),
        importance: enum_field(m, "importance", Importance::parse_lenient),
        concept_type: enum_field(m, "conceptType", ConceptType::parse_lenient),
        parent_id: optional_string(m, "parentId"),
        visual_emphasis: bool_field(m, "visualEmphasis"),
        visual_elements: optional_string(m, "visualElements"),
        transcript_snippet: optional_string(m, "transcriptSnippet"),
    }
}

/// Drop `parentId` from main concepts and demote sub concepts whose parent
/// is not a main concept in this list.
fn resolve_hierarchy(mut concepts: Vec<Concept>) -> Vec<Concept> {
    let main_keys: HashSet<String> = concepts
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_main())
        .map(|(i, c)| c.key(i))
        .collect();

    for concept in &mut concepts {
        match concept.concept_type {
            ConceptType::Main => concept.parent_id = None,
            ConceptType::Sub => {
                let resolved = concept
                    .parent_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|p| main_keys.contains(*p))
                    .map(str::to_string);
                match resolved {
                    Some(parent) => concept.parent_id = Some(parent),
                    None => {
                        concept.concept_type = ConceptType::Main;
                        concept.parent_id = None;
                    }
                }
            }
        }
    }
    concepts
}

fn sanitize_checkpoint(m: &Map<String, Value>, ceiling: Option<f64>, default_pause: f64) -> Checkpoint {
    let mut checkpoint_type = enum_field(m, "type", CheckpointType::parse_lenient);
    let options = string_list(m.get("options"));
    let answer = m.get("correctAnswer").and_then(index_value);

    let (options, correct_answer) = match checkpoint_type {
        CheckpointType::QuickQuiz if options.len() >= 2 => {
            let answer = answer.filter(|a| *a < options.len()).unwrap_or(0);
            (Some(options), Some(answer))
        }
        CheckpointType::QuickQuiz => {
            checkpoint_type = CheckpointType::Reflection;
            (None, None)
        }
        _ => (None, None),
    };

    Checkpoint {
        timestamp: clamp_timestamp(m.get("timestamp").map(coerce_seconds).unwrap_or(0.0), ceiling),
        checkpoint_type,
        prompt: string_field(m, &["prompt", "question"]),
        options,
        correct_answer,
        hint: optional_string(m, "hint"),
        related_concept: string_field(m, &["relatedConcept"]),
        context_start_timestamp: m.get("contextStartTimestamp").and_then(seconds_value).map(non_negative),
        pause_delay_seconds: m
            .get("pauseDelaySeconds")
            .and_then(seconds_value)
            .map(non_negative)
            .unwrap_or(default_pause),
    }
}

fn sanitize_question(m: &Map<String, Value>) -> Option<QuizQuestion> {
    let question = string_field(m, &["question", "prompt"]);
    let options = string_list(m.get("options"));
    if question.is_empty() || options.len() < 2 {
        return None;
    }
    let correct_answer = m
        .get("correctAnswer")
        .and_then(index_value)
        .filter(|a| *a < options.len())
        .unwrap_or(0);

    Some(QuizQuestion {
        question,
        options,
        correct_answer,
        explanation: string_field(m, &["explanation"]),
        related_concept: string_field(m, &["relatedConcept"]),
    })
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn objects<'a>(obj: &'a Map<String, Value>, key: &str) -> impl Iterator<Item = &'a Map<String, Value>> {
    obj.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

fn string_field(m: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| m.get(*k).and_then(Value::as_str))
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn optional_string(m: &Map<String, Value>, key: &str) -> Option<String> {
    m.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn enum_field<T: Default>(m: &Map<String, Value>, key: &str, parse: fn(&str) -> T) -> T {
    m.get(key).and_then(Value::as_str).map(parse).unwrap_or_default()
}

fn bool_field(m: &Map<String, Value>, key: &str) -> bool {
    match m.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Transcript and summary: a string, or an array of strings / `{text}` lines.
fn text_block(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.as_str()),
                Value::Object(m) => m.get("text").and_then(Value::as_str),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn index_value(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64))
            .map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Seconds from a number or numeric text; `None` for absent or
/// non-numeric values.
fn seconds_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) if s.chars().any(|c| c.is_ascii_digit()) => Some(coerce_seconds_str(s)),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Timing audit
// ---------------------------------------------------------------------------

/// A checkpoint or concept placement that breaks the instructed timing
/// policy. Reported, never enforced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimingViolation {
    #[error("concept {index} at {timestamp}s is past the {ceiling}s end-of-video ceiling")]
    ConceptPastEndMargin { index: usize, timestamp: f64, ceiling: f64 },

    #[error("checkpoint {index} at {timestamp}s is past the {ceiling}s end-of-video ceiling")]
    CheckpointPastEndMargin { index: usize, timestamp: f64, ceiling: f64 },

    #[error(
        "prediction checkpoint {index} at {timestamp}s is outside the {min}-{max}s window before '{concept}' ({concept_timestamp}s)"
    )]
    PredictionOutsideWindow {
        index: usize,
        timestamp: f64,
        concept: String,
        concept_timestamp: f64,
        min: f64,
        max: f64,
    },

    #[error("checkpoint {index} at {timestamp}s precedes the explanation of '{concept}' (earliest {earliest}s)")]
    BeforeExplanation {
        index: usize,
        timestamp: f64,
        concept: String,
        earliest: f64,
    },

    #[error("checkpoints {previous} and {index} are {gap}s apart, minimum is {min}s")]
    TooClose {
        previous: usize,
        index: usize,
        gap: f64,
        min: f64,
    },
}

/// Check a sanitized result against the timing rules the analysis prompt
/// states.
pub fn audit_timing(result: &AnalysisResult, config: &GenerationConfig) -> Vec<TimingViolation> {
    let timing = &config.timing;
    let mut violations = Vec::new();

    if result.duration > 0.0 {
        let ceiling = non_negative(result.duration - non_negative(timing.end_safety_margin_secs));
        for (index, concept) in result.concepts.iter().enumerate() {
            if concept.timestamp > ceiling {
                violations.push(TimingViolation::ConceptPastEndMargin {
                    index,
                    timestamp: concept.timestamp,
                    ceiling,
                });
            }
        }
        for (index, checkpoint) in result.checkpoints.iter().enumerate() {
            if checkpoint.timestamp > ceiling {
                violations.push(TimingViolation::CheckpointPastEndMargin {
                    index,
                    timestamp: checkpoint.timestamp,
                    ceiling,
                });
            }
        }
    }

    let (window_min, window_max) = timing.prediction_window.ordered();
    let explanation = non_negative(timing.explanation_window_secs);

    for (index, checkpoint) in result.checkpoints.iter().enumerate() {
        let Some(concept) = find_concept(&result.concepts, &checkpoint.related_concept) else {
            continue;
        };

        if checkpoint.checkpoint_type == CheckpointType::Prediction {
            let lead = concept.timestamp - checkpoint.timestamp;
            if lead < window_min || lead > window_max {
                violations.push(TimingViolation::PredictionOutsideWindow {
                    index,
                    timestamp: checkpoint.timestamp,
                    concept: concept.title.clone(),
                    concept_timestamp: concept.timestamp,
                    min: window_min,
                    max: window_max,
                });
            }
        } else {
            let earliest = concept.timestamp + explanation;
            if checkpoint.timestamp < earliest {
                violations.push(TimingViolation::BeforeExplanation {
                    index,
                    timestamp: checkpoint.timestamp,
                    concept: concept.title.clone(),
                    earliest,
                });
            }
        }
    }

    let spacing = non_negative(timing.checkpoint_min_spacing_secs);
    if spacing > 0.0 {
        let mut order: Vec<usize> = (0..result.checkpoints.len()).collect();
        order.sort_by(|a, b| {
            result.checkpoints[*a]
                .timestamp
                .total_cmp(&result.checkpoints[*b].timestamp)
        });
        for pair in order.windows(2) {
            let gap = result.checkpoints[pair[1]].timestamp - result.checkpoints[pair[0]].timestamp;
            if gap < spacing {
                violations.push(TimingViolation::TooClose {
                    previous: pair[0],
                    index: pair[1],
                    gap,
                    min: spacing,
                });
            }
        }
    }

    violations
}

fn find_concept<'a>(concepts: &'a [Concept], title: &str) -> Option<&'a Concept> {
    let title = title.trim();
    if title.is_empty() {
        return None;
    }
    concepts
        .iter()
        .find(|c| c.title.trim().eq_ignore_ascii_case(title))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sanitize(value: Value, fallback: Option<f64>) -> AnalysisResult {
        let policy = SanitizePolicy {
            fallback_duration: fallback,
            ..Default::default()
        };
        sanitize_analysis(&value.to_string(), &policy).unwrap()
    }

    #[test]
    fn test_empty_object_defaults() {
        let result = sanitize(json!({}), None);
        assert_eq!(result, AnalysisResult::default());
        assert_eq!(result.duration, 0.0);
        assert!(result.transcript.is_empty() && result.summary.is_empty());
    }

    #[test]
    fn test_malformed_payloads() {
        let policy = SanitizePolicy::default();
        assert_eq!(sanitize_analysis("   ", &policy), Err(MalformedAnalysisError::Empty));
        assert_eq!(sanitize_analysis("```json\n```", &policy), Err(MalformedAnalysisError::Empty));
        assert!(matches!(
            sanitize_analysis("The video covers entropy.", &policy),
            Err(MalformedAnalysisError::InvalidJson(_))
        ));
        assert_eq!(
            sanitize_analysis("[1, 2]", &policy),
            Err(MalformedAnalysisError::NotAnObject("array"))
        );
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn test_clamps_to_duration() {
        let d = 694.0;
        let result = sanitize(
            json!({
                "duration": d,
                "concepts": [
                    {"concept": "Late", "timestamp": d + 500.0},
                    {"concept": "Negative", "timestamp": -12},
                    {"concept": "Clock", "timestamp": "1:30"}
                ],
                "checkpoints": [{"type": "reflection", "prompt": "p", "timestamp": 10_000}]
            }),
            None,
        );

        assert_eq!(result.concepts[0].timestamp, d);
        assert_eq!(result.concepts[1].timestamp, 0.0);
        assert_eq!(result.concepts[2].timestamp, 90.0);
        assert_eq!(result.checkpoints[0].timestamp, d);
        for c in &result.concepts {
            assert!(c.timestamp >= 0.0 && c.timestamp <= d);
        }
    }

    #[test]
    fn test_unknown_duration_only_enforces_non_negative() {
        let result = sanitize(
            json!({"concepts": [{"concept": "A", "timestamp": 5000}, {"concept": "B", "timestamp": -1}]}),
            None,
        );
        assert_eq!(result.duration, 0.0);
        assert_eq!(result.concepts[0].timestamp, 5000.0);
        assert_eq!(result.concepts[1].timestamp, 0.0);
    }

    #[test]
    fn test_duration_fallback() {
        let result = sanitize(json!({"duration": "n/a", "concepts": [{"timestamp": 900}]}), Some(600.0));
        assert_eq!(result.duration, 600.0);
        assert_eq!(result.concepts[0].timestamp, 600.0);

        let result = sanitize(json!({"duration": 300}), Some(600.0));
        assert_eq!(result.duration, 300.0);
    }

    #[test]
    fn test_enum_coercion_and_aliases() {
        let result = sanitize(
            json!({
                "concepts": [
                    {"title": "Aliased", "importance": "HIGH", "conceptType": "weird"},
                    {"concept": "Unknown", "importance": "pivotal"}
                ],
                "checkpoints": [{"type": "essay", "prompt": "Explain"}]
            }),
            None,
        );
        assert_eq!(result.concepts[0].title, "Aliased");
        assert_eq!(result.concepts[0].importance, Importance::Core);
        assert_eq!(result.concepts[0].concept_type, ConceptType::Main);
        assert_eq!(result.concepts[1].importance, Importance::Supporting);
        assert_eq!(result.checkpoints[0].checkpoint_type, CheckpointType::Reflection);
    }

    #[test]
    fn test_hierarchy_repair() {
        let result = sanitize(
            json!({
                "duration": 600,
                "concepts": [
                    {"concept": "Main", "timestamp": 60, "conceptType": "main", "parentId": "0-9"},
                    {"concept": "Child", "timestamp": 90, "conceptType": "sub", "parentId": "60-0"},
                    {"concept": "Orphan", "timestamp": 120, "conceptType": "sub"},
                    {"concept": "Grandchild", "timestamp": 150, "conceptType": "sub", "parentId": "90-1"}
                ]
            }),
            None,
        );

        let c = &result.concepts;
        assert_eq!(c[0].parent_id, None);
        assert_eq!(c[1].concept_type, ConceptType::Sub);
        assert_eq!(c[1].parent_id.as_deref(), Some("60-0"));
        assert_eq!(c[2].concept_type, ConceptType::Main);
        assert_eq!(c[3].concept_type, ConceptType::Main);
        assert!(lectern_models::validate_hierarchy(c).is_empty());
    }

    #[test]
    fn test_checkpoint_fields() {
        let result = sanitize(
            json!({
                "duration": 100,
                "checkpoints": [
                    {
                        "type": "quickQuiz", "prompt": "Pick one", "timestamp": 50,
                        "options": ["a", "b", "c"], "correctAnswer": 7,
                        "contextStartTimestamp": -4, "pauseDelaySeconds": "1.5"
                    },
                    {"type": "quickQuiz", "prompt": "No options", "timestamp": 60},
                    {"type": "prediction", "prompt": "Guess", "options": ["x", "y"],
                     "contextStartTimestamp": 500, "pauseDelaySeconds": -2}
                ]
            }),
            None,
        );

        let quiz = &result.checkpoints[0];
        assert_eq!(quiz.options.as_ref().map(Vec::len), Some(3));
        assert_eq!(quiz.correct_answer, Some(0));
        assert_eq!(quiz.context_start_timestamp, Some(0.0));
        assert_eq!(quiz.pause_delay_seconds, 1.5);

        let demoted = &result.checkpoints[1];
        assert_eq!(demoted.checkpoint_type, CheckpointType::Reflection);
        assert_eq!(demoted.pause_delay_seconds, DEFAULT_PAUSE_DELAY_SECS);

        let prediction = &result.checkpoints[2];
        assert!(prediction.options.is_none());
        // Not tied to the duration ceiling.
        assert_eq!(prediction.context_start_timestamp, Some(500.0));
        assert_eq!(prediction.pause_delay_seconds, 0.0);
    }

    #[test]
    fn test_drops_non_objects_and_invalid_questions() {
        let result = sanitize(
            json!({
                "concepts": ["just a string", null, {"concept": "Kept"}],
                "quiz": [
                    {"question": "Q1", "options": ["a", "b"], "correctAnswer": 1},
                    {"question": "Q2", "options": ["only one"]},
                    {"question": "", "options": ["a", "b"]},
                    42
                ],
                "transcript": ["[00:00] Hello", {"text": "[00:05] World"}]
            }),
            None,
        );
        assert_eq!(result.concepts.len(), 1);
        assert_eq!(result.quiz.len(), 1);
        assert_eq!(result.quiz[0].correct_answer, 1);
        assert_eq!(result.transcript, "[00:00] Hello\n[00:05] World");
    }

    #[test]
    fn test_audit_timing_reports_without_rejecting() {
        let config = GenerationConfig::default();
        let result = AnalysisResult {
            duration: 694.0,
            concepts: vec![Concept::new("Entropy", 100.0), Concept::new("Wrap-up", 690.0)],
            checkpoints: vec![
                Checkpoint::new(92.0, CheckpointType::Prediction, "Guess", "entropy"),
                Checkpoint::new(98.0, CheckpointType::Prediction, "Too late", "Entropy"),
                Checkpoint::new(105.0, CheckpointType::Reflection, "Too early", "Entropy"),
                Checkpoint::new(400.0, CheckpointType::Reflection, "Unrelated", "Nothing"),
            ],
            ..Default::default()
        };

        let violations = audit_timing(&result, &config);
        assert!(violations.contains(&TimingViolation::ConceptPastEndMargin {
            index: 1,
            timestamp: 690.0,
            ceiling: 684.0
        }));
        assert!(violations
            .iter()
            .any(|v| matches!(v, TimingViolation::PredictionOutsideWindow { index: 1, .. })));
        assert!(!violations
            .iter()
            .any(|v| matches!(v, TimingViolation::PredictionOutsideWindow { index: 0, .. })));
        assert!(violations
            .iter()
            .any(|v| matches!(v, TimingViolation::BeforeExplanation { index: 2, earliest, .. } if *earliest == 115.0)));
        assert!(violations
            .iter()
            .any(|v| matches!(v, TimingViolation::TooClose { previous: 0, index: 1, .. })));
    }
}
