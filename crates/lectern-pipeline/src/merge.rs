//! Merging accepted refinement suggestions back into the timeline.
//!
//! Each suggestion touches exactly one array, and only that array is
//! written back (last write wins). Improvements locate their target by
//! concept title, question text or captured checkpoint index; when two
//! entries share a title or question text the first one is replaced.

use lectern_models::{
    validate_hierarchy, Checkpoint, Concept, QuizQuestion, Suggestion, Video, VideoField, VideoId, VideoPatch,
};

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::Pipeline;
use crate::prompt::known_duration;
use crate::sanitize::clamp_timestamp;

/// Compute the replacement array for `suggestion` against `video`.
///
/// Pure; nothing is written. Returns `Validation` when the target cannot
/// be found or the merged entry is invalid.
pub fn merge_suggestion(video: &Video, suggestion: Suggestion) -> PipelineResult<VideoField> {
    let ceiling = known_duration(video.duration);

    match suggestion {
        Suggestion::ConceptAdd(add) => {
            let mut concepts = video.concepts.clone();
            concepts.push(normalize_concept(add.concept, ceiling)?);
            check_hierarchy(&video.concepts, &concepts)?;
            Ok(VideoField::Concepts(concepts))
        }
        Suggestion::ConceptImprove(improve) => {
            let target = improve.original.title.trim();
            let index = video
                .concepts
                .iter()
                .position(|c| c.title.trim() == target)
                .ok_or_else(|| PipelineError::validation(format!("no concept titled '{}'", target)))?;

            let mut concepts = video.concepts.clone();
            concepts[index] = normalize_concept(improve.improved, ceiling)?;
            check_hierarchy(&video.concepts, &concepts)?;
            Ok(VideoField::Concepts(concepts))
        }
        Suggestion::CheckpointAdd(add) => {
            let mut checkpoints = video.checkpoints.clone();
            checkpoints.push(normalize_checkpoint(add.checkpoint, ceiling)?);
            Ok(VideoField::Checkpoints(checkpoints))
        }
        Suggestion::CheckpointImprove(improve) => {
            if improve.index >= video.checkpoints.len() {
                return Err(PipelineError::validation(format!(
                    "checkpoint index {} is out of range for {} checkpoints",
                    improve.index,
                    video.checkpoints.len()
                )));
            }
            let mut checkpoints = video.checkpoints.clone();
            checkpoints[improve.index] = normalize_checkpoint(improve.improved, ceiling)?;
            Ok(VideoField::Checkpoints(checkpoints))
        }
        Suggestion::QuizAdd(add) => {
            let mut quiz = video.quiz.clone();
            quiz.push(normalize_question(add.question)?);
            Ok(VideoField::Quiz(quiz))
        }
        Suggestion::QuizImprove(improve) => {
            let target = improve.original.question.trim();
            let index = video
                .quiz
                .iter()
                .position(|q| q.question.trim() == target)
                .ok_or_else(|| PipelineError::validation(format!("no quiz question '{}'", target)))?;

            let mut quiz = video.quiz.clone();
            quiz[index] = normalize_question(improve.improved)?;
            Ok(VideoField::Quiz(quiz))
        }
    }
}

fn normalize_concept(mut concept: Concept, ceiling: Option<f64>) -> PipelineResult<Concept> {
    concept.title = concept.title.trim().to_string();
    if concept.title.is_empty() {
        return Err(PipelineError::validation("concept title cannot be empty"));
    }
    concept.timestamp = clamp_timestamp(concept.timestamp, ceiling);
    if concept.is_main() {
        concept.parent_id = None;
    }
    Ok(concept)
}

fn normalize_checkpoint(mut checkpoint: Checkpoint, ceiling: Option<f64>) -> PipelineResult<Checkpoint> {
    checkpoint.timestamp = clamp_timestamp(checkpoint.timestamp, ceiling);
    checkpoint.context_start_timestamp = checkpoint.context_start_timestamp.map(|t| clamp_timestamp(t, None));
    checkpoint.pause_delay_seconds = clamp_timestamp(checkpoint.pause_delay_seconds, None);
    checkpoint.validate().map_err(PipelineError::Validation)?;
    Ok(checkpoint)
}

fn normalize_question(question: QuizQuestion) -> PipelineResult<QuizQuestion> {
    question.validate().map_err(PipelineError::Validation)?;
    Ok(question)
}

/// Reject a merge that introduces hierarchy violations the timeline did
/// not already have.
fn check_hierarchy(before: &[Concept], after: &[Concept]) -> PipelineResult<()> {
    let existing = validate_hierarchy(before);
    let introduced: Vec<String> = validate_hierarchy(after)
        .into_iter()
        .filter(|v| !existing.contains(v))
        .map(|v| v.to_string())
        .collect();

    if introduced.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::validation(introduced.join("; ")))
    }
}

impl Pipeline {
    /// Merge one accepted suggestion and return the updated video.
    pub async fn apply_suggestion(&self, id: &VideoId, suggestion: Suggestion) -> PipelineResult<Video> {
        let mut video = self.store.require(id).await?;
        let kind = suggestion.kind();
        let field = merge_suggestion(&video, suggestion)?;

        let patch = VideoPatch::new().set(field);
        self.store.update(id, &patch).await?;
        patch.apply_to(&mut video);

        tracing::info!(video_id = %id, suggestion = kind, "Applied refinement suggestion");
        Ok(video)
    }
}
