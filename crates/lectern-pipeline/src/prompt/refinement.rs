//! Instruction document for refinement suggestions.

use serde_json::{json, Value};

use lectern_models::{Checkpoint, Concept, EngagementAnalysis, QuizQuestion};

use super::{duration_line, to_pretty_json, VideoMetadata};

/// Build the refinement instruction over the full current timeline.
///
/// `engagement` adds a condensed report as grounding context and
/// `focus_area` narrows the scope; blank focus text is ignored.
pub fn build_refinement_prompt(
    concepts: &[Concept],
    checkpoints: &[Checkpoint],
    quiz: &[QuizQuestion],
    metadata: &VideoMetadata,
    engagement: Option<&EngagementAnalysis>,
    focus_area: Option<&str>,
) -> String {
    let mut prompt = format!(
        "You are reviewing the interactive learning timeline of a lecture video and \
         proposing concrete improvements.\n\n\
         ## Video\n\
         Title: {title}\n\
         Duration: {duration}\n\
         Summary: {summary}\n",
        title = if metadata.title.trim().is_empty() { "(untitled)" } else { metadata.title.trim() },
        duration = duration_line(metadata.duration),
        summary = if metadata.summary.trim().is_empty() { "(none)" } else { metadata.summary.trim() },
    );

    prompt.push_str(&format!(
        "\n## Current concepts ({})\n{}\n",
        concepts.len(),
        to_pretty_json(&concepts)
    ));
    prompt.push_str(&format!(
        "\n## Current checkpoints ({}), with their array index\n{}\n",
        checkpoints.len(),
        to_pretty_json(&indexed(checkpoints))
    ));
    prompt.push_str(&format!(
        "\n## Current quiz ({})\n{}\n",
        quiz.len(),
        to_pretty_json(&quiz)
    ));

    if let Some(focus) = focus_area.map(str::trim).filter(|f| !f.is_empty()) {
        prompt.push_str(&format!(
            "\n## Focus area\nConcentrate every suggestion on: {}\n",
            focus
        ));
    }

    if let Some(report) = engagement {
        prompt.push_str(&format!(
            "\n## Prior engagement report\n{}\nPrioritize changes that address the critical drops and top priorities above.\n",
            report.condensed()
        ));
    }

    let ceiling = match metadata.known_duration() {
        Some(d) => format!("between 0 and {} seconds", super::secs(d)),
        None => "non-negative seconds".to_string(),
    };

    prompt.push_str(&format!(
        "\n## Rules\n\
         - Keep every timestamp {ceiling}.\n\
         - conceptsToImprove.original must repeat the existing concept exactly as listed above.\n\
         - quizToImprove.original must repeat the existing question exactly as listed above.\n\
         - checkpointsToImprove.index is the index shown above for the checkpoint being replaced.\n\
         - New sub concepts must reference an existing main concept through parentId.\n\
         - Use timelineGaps for stretches of the video with no concept or checkpoint.\n\
         - Return empty arrays for categories with no suggestions.\n\n\
         ## Output\n\
         Return ONLY a single JSON object with this schema:\n{schema}\n",
        ceiling = ceiling,
        schema = to_pretty_json(&refinement_schema()),
    ));

    prompt
}

fn indexed(checkpoints: &[Checkpoint]) -> Vec<Value> {
    checkpoints
        .iter()
        .enumerate()
        .map(|(index, checkpoint)| {
            let mut value = serde_json::to_value(checkpoint).unwrap_or(Value::Null);
            if let Value::Object(map) = &mut value {
                map.insert("index".to_string(), json!(index));
            }
            value
        })
        .collect()
}

fn refinement_schema() -> Value {
    let concept = json!({
        "concept": "string",
        "timestamp": 0,
        "description": "string",
        "importance": "core | supporting | supplementary",
        "conceptType": "main | sub",
        "parentId": "string (sub concepts only)"
    });
    let checkpoint = json!({
        "timestamp": 0,
        "type": "quickQuiz | reflection | prediction | application",
        "prompt": "string",
        "options": ["string (quickQuiz only)"],
        "correctAnswer": 0,
        "relatedConcept": "string",
        "pauseDelaySeconds": 0.5
    });
    let question = json!({
        "question": "string",
        "options": ["string"],
        "correctAnswer": 0,
        "explanation": "string",
        "relatedConcept": "string"
    });

    json!({
        "conceptsToAdd": [{ "concept": concept, "reason": "string" }],
        "conceptsToImprove": [{ "original": concept, "improved": concept, "reason": "string" }],
        "timelineGaps": [{ "start": 0, "end": 0, "description": "string", "suggestion": "string" }],
        "checkpointsToAdd": [{ "checkpoint": checkpoint, "reason": "string" }],
        "checkpointsToImprove": [{ "index": 0, "original": checkpoint, "improved": checkpoint, "reason": "string" }],
        "quizToAdd": [{ "question": question, "reason": "string" }],
        "quizToImprove": [{ "original": question, "improved": question, "reason": "string" }]
    })
}
