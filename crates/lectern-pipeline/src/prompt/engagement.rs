//! Instruction document for the engagement effectiveness report.

use serde_json::json;

use lectern_models::engagement::LEARNING_RATE_SEGMENTS;
use lectern_models::{format_clock, AnalysisResult};

use super::{duration_line, to_pretty_json, VideoMetadata};

pub fn build_engagement_prompt(metadata: &VideoMetadata, timeline: &AnalysisResult) -> String {
    let segments = match metadata.known_duration() {
        Some(d) => {
            let width = d / LEARNING_RATE_SEGMENTS as f64;
            (0..LEARNING_RATE_SEGMENTS)
                .map(|i| {
                    let start = width * i as f64;
                    format!("  {}. {} - {}", i + 1, format_clock(start), format_clock(start + width))
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        None => format!(
            "  Split the video into {} equal segments.",
            LEARNING_RATE_SEGMENTS
        ),
    };

    format!(
        r#"You are a learning scientist evaluating how effectively a lecture video teaches.

## Video
Title: {title}
Duration: {duration}

## Timeline
Concepts:
{concepts}
Checkpoints:
{checkpoints}
Quiz questions: {quiz_count}

## Transcript excerpt
{transcript}

## Task
Score the video from 0 to 100 on engagement rate, accessibility and pedagogy, estimate the share of active versus passive learning time, and rate the learning rate of each of these {count} segments:
{segments}
Flag every critical drop in learning rate with its timestamp in seconds, the reason and a concrete fix. Finish with an overall score, a tier ("excellent", "good", "fair" or "poor") and the top three priorities.

## Output
Return ONLY a single JSON object with this schema:
{schema}"#,
        title = metadata.title.trim(),
        duration = duration_line(metadata.duration),
        concepts = to_pretty_json(&timeline.concepts),
        checkpoints = to_pretty_json(&timeline.checkpoints),
        quiz_count = timeline.quiz.len(),
        transcript = excerpt(&timeline.transcript, 6000),
        count = LEARNING_RATE_SEGMENTS,
        segments = segments,
        schema = to_pretty_json(&engagement_schema()),
    )
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "(no transcript)".to_string();
    }
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

fn engagement_schema() -> serde_json::Value {
    json!({
        "engagementRate": { "score": 0, "explanation": "string" },
        "accessibilityScore": { "score": 0, "issues": ["string"] },
        "activePassiveBalance": {
            "activePercentage": 0,
            "passivePercentage": 0,
            "recommendation": "string"
        },
        "learningRateGraph": {
            "segments": [{ "start": 0, "end": 0, "learningRate": 0, "label": "string" }],
            "criticalDrops": [{ "timestamp": 0, "reason": "string", "fix": "string" }]
        },
        "pedagogicalScore": { "score": 0, "strengths": ["string"], "weaknesses": ["string"] },
        "overallAnalysis": {
            "overallScore": 0,
            "tier": "excellent | good | fair | poor",
            "topPriorities": ["string"],
            "summary": "string"
        }
    })
}
