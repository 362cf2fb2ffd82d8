//! Instruction document for the initial lecture analysis.

use serde_json::json;

use lectern_models::CheckpointType;

use super::generation_config::GenerationConfig;
use super::{known_duration, secs, to_pretty_json};

/// Build the analysis instruction for a video of unknown length.
pub fn build_analysis_prompt(config: &GenerationConfig) -> String {
    build_analysis_prompt_for(config, None)
}

/// Build the analysis instruction, stating the concrete timestamp ceiling
/// when the video duration is already known.
pub fn build_analysis_prompt_for(config: &GenerationConfig, duration: Option<f64>) -> String {
    let timing = &config.timing;
    let margin = secs(timing.end_safety_margin_secs);
    let (concepts_min, concepts_max) = config.counts.concepts.ordered();
    let (checkpoints_min, checkpoints_max) = config.counts.checkpoints.ordered();
    let (quiz_min, quiz_max) = config.counts.quiz.ordered();
    let (predict_min, predict_max) = timing.prediction_window.ordered();
    let (sub_min, sub_max) = config.hierarchy.sub_concept_ratio.ordered();
    let pause = &timing.pause_delay;
    let (pause_min, pause_max) = (pause.min.min(pause.max), pause.min.max(pause.max));

    let ceiling_rule = match duration.and_then(known_duration) {
        Some(d) => format!(
            "- The video is {} seconds long. The latest allowed timestamp is {} seconds \
             (duration minus the {}-second safety margin).",
            secs(d),
            secs(d - super::generation_config::non_negative(timing.end_safety_margin_secs)),
            margin
        ),
        None => format!(
            "- Never place a concept or checkpoint later than the video duration minus {} seconds.",
            margin
        ),
    };

    let type_mix = CheckpointType::ALL
        .iter()
        .map(|t| format!("{} {}%", t, config.checkpoint_weights.weight(*t)))
        .collect::<Vec<_>>()
        .join(", ");

    let weights = &config.importance_weights;

    format!(
        r#"You are an expert instructional designer. Watch the entire lecture video and build an interactive learning timeline for it.

## Output
Return ONLY a single JSON object that matches this schema. Do not add prose or code fences.
{schema}

## Timestamps
- Every timestamp is a number of seconds from the start of the video.
{ceiling_rule}
- Report the total length of the video in seconds as "duration".

## Concepts
- Identify between {concepts_min} and {concepts_max} concepts in the order they are taught.
- Importance mix: about {core}% "core", {supporting}% "supporting", {supplementary}% "supplementary".
- conceptType is "main" or "sub". Between {sub_min_pct}% and {sub_max_pct}% of concepts should be sub concepts, with at most {max_sub} sub concepts per main concept.
- A sub concept sets parentId to "<timestamp>-<index>" of its main concept, where index is that main concept's zero-based position in the concepts array. Main concepts never set parentId.
- Set visualEmphasis to true when the concept relies on something shown on screen, and describe it in visualElements.

## Checkpoints
- Create between {checkpoints_min} and {checkpoints_max} checkpoints, at least {spacing} seconds apart.
- Type mix: {type_mix}.
- A "prediction" checkpoint is placed {predict_min} to {predict_max} seconds BEFORE its related concept is introduced.
- Every other checkpoint is placed at least {explain} seconds AFTER its related concept has been explained.
- "quickQuiz" checkpoints need 2 to 4 options and the zero-based index of the correct answer. Other types omit options.
- relatedConcept is the exact title of the concept the checkpoint reinforces.
- contextStartTimestamp is the absolute second where a learner should start rewatching for context; it is never after the checkpoint itself.
- pauseDelaySeconds is between {pause_min} and {pause_max}; use {pause_default} unless the moment needs more time.

## Quiz
- Write between {quiz_min} and {quiz_max} multiple-choice questions covering the core concepts.
- Each question has 2 to 4 options, a zero-based correctAnswer, an explanation and the relatedConcept title.

## Transcript and summary
- transcript: the full spoken transcript with [MM:SS] markers at least every 30 seconds.
- summary: two or three sentences describing what the lecture teaches.

Configuration version: {version}"#,
        schema = to_pretty_json(&analysis_schema()),
        ceiling_rule = ceiling_rule,
        concepts_min = concepts_min,
        concepts_max = concepts_max,
        core = weights.core,
        supporting = weights.supporting,
        supplementary = weights.supplementary,
        sub_min_pct = (sub_min * 100.0).round(),
        sub_max_pct = (sub_max * 100.0).round(),
        max_sub = config.hierarchy.max_sub_per_main,
        checkpoints_min = checkpoints_min,
        checkpoints_max = checkpoints_max,
        spacing = secs(timing.checkpoint_min_spacing_secs),
        type_mix = type_mix,
        predict_min = secs(predict_min),
        predict_max = secs(predict_max),
        explain = secs(timing.explanation_window_secs),
        pause_min = secs(pause_min),
        pause_max = secs(pause_max),
        pause_default = secs(pause.default),
        quiz_min = quiz_min,
        quiz_max = quiz_max,
        version = config.version,
    )
}

fn analysis_schema() -> serde_json::Value {
    json!({
        "duration": 0,
        "transcript": "string",
        "summary": "string",
        "concepts": [{
            "concept": "string",
            "timestamp": 0,
            "description": "string",
            "importance": "core | supporting | supplementary",
            "conceptType": "main | sub",
            "parentId": "string (sub concepts only)",
            "visualEmphasis": false,
            "visualElements": "string (optional)",
            "transcriptSnippet": "string (optional)"
        }],
        "checkpoints": [{
            "timestamp": 0,
            "type": "quickQuiz | reflection | prediction | application",
            "prompt": "string",
            "options": ["string (quickQuiz only)"],
            "correctAnswer": 0,
            "hint": "string (optional)",
            "relatedConcept": "string",
            "contextStartTimestamp": 0,
            "pauseDelaySeconds": 0.5
        }],
        "quiz": [{
            "question": "string",
            "options": ["string"],
            "correctAnswer": 0,
            "explanation": "string",
            "relatedConcept": "string"
        }]
    })
}
