//! Compact playback-context text for an external conversational agent.

use serde::{Deserialize, Serialize};

use lectern_models::{format_clock, parse_timestamp, Video, VideoId};

use crate::error::PipelineResult;
use crate::pipeline::Pipeline;

/// Upper bound on the summary length, in characters.
pub const MAX_SUMMARY_CHARS: usize = 900;

/// Concepts and checkpoints within this many seconds of the playback
/// position count as nearby.
pub const NEARBY_WINDOW_SECS: f64 = 60.0;

const SNIPPET_CHARS: usize = 240;
const MAX_INTERACTIONS: usize = 5;
const MAX_MESSAGES: usize = 4;

/// A learner action, e.g. answering a checkpoint or seeking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionEvent {
    pub kind: String,
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: String,
    pub text: String,
}

/// Playback state sent by the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRequest {
    #[serde(default)]
    pub current_time: f64,
    /// Oldest first
    #[serde(default)]
    pub interaction_history: Vec<InteractionEvent>,
    /// Oldest first
    #[serde(default)]
    pub recent_messages: Vec<ChatMessage>,
}

/// Build the summary for `video` at the request's playback position.
pub fn build_context_summary(video: &Video, request: &ContextRequest) -> String {
    let now = if request.current_time.is_finite() {
        request.current_time.max(0.0)
    } else {
        0.0
    };
    let mut lines = Vec::new();

    let title = if video.title.trim().is_empty() { "Untitled lecture" } else { video.title.trim() };
    if video.duration > 0.0 {
        lines.push(format!(
            "Lecture \"{}\", learner is at {} of {}.",
            title,
            format_clock(now),
            format_clock(video.duration)
        ));
    } else {
        lines.push(format!("Lecture \"{}\", learner is at {}.", title, format_clock(now)));
    }

    if let Some(snippet) = transcript_snippet(&video.transcript, now, video.duration) {
        lines.push(format!("Transcript here: {}", snippet));
    }

    let nearby: Vec<_> = video
        .concepts
        .iter()
        .filter(|c| (c.timestamp - now).abs() <= NEARBY_WINDOW_SECS)
        .collect();
    let (label, concepts) = if nearby.is_empty() {
        ("Lecture concepts", video.concepts.iter().collect::<Vec<_>>())
    } else {
        ("Nearby concepts", nearby)
    };
    if !concepts.is_empty() {
        let list = concepts
            .iter()
            .map(|c| format!("{} ({})", c.title, format_clock(c.timestamp)))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("{}: {}.", label, list));
    }

    let checkpoints = video
        .checkpoints
        .iter()
        .filter(|c| (c.timestamp - now).abs() <= NEARBY_WINDOW_SECS)
        .map(|c| format!("{} at {}: {}", c.checkpoint_type, format_clock(c.timestamp), c.prompt))
        .collect::<Vec<_>>();
    if !checkpoints.is_empty() {
        lines.push(format!("Nearby checkpoints: {}.", checkpoints.join("; ")));
    }

    let history = tail(&request.interaction_history, MAX_INTERACTIONS)
        .iter()
        .map(|e| {
            if e.detail.trim().is_empty() {
                format!("{} at {}", e.kind, format_clock(e.timestamp))
            } else {
                format!("{} at {} ({})", e.kind, format_clock(e.timestamp), e.detail.trim())
            }
        })
        .collect::<Vec<_>>();
    if !history.is_empty() {
        lines.push(format!("Recent activity: {}.", history.join("; ")));
    }

    let messages = tail(&request.recent_messages, MAX_MESSAGES)
        .iter()
        .map(|m| format!("{}: {}", m.role, m.text.trim()))
        .collect::<Vec<_>>();
    if !messages.is_empty() {
        lines.push(format!("Recent messages: {}", messages.join(" | ")));
    }

    truncate_chars(&lines.join("\n"), MAX_SUMMARY_CHARS)
}

fn tail<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

/// Text of the transcript segment covering `now`.
///
/// Transcripts carry `[MM:SS]` markers; without markers the snippet is
/// taken proportionally from the duration.
fn transcript_snippet(transcript: &str, now: f64, duration: f64) -> Option<String> {
    let transcript = transcript.trim();
    if transcript.is_empty() {
        return None;
    }

    let segments = marked_segments(transcript);
    let text = if segments.is_empty() {
        let chars: Vec<char> = transcript.chars().collect();
        let start = if duration > 0.0 {
            ((now / duration).clamp(0.0, 1.0) * chars.len() as f64) as usize
        } else {
            0
        };
        let start = start.min(chars.len().saturating_sub(SNIPPET_CHARS));
        chars[start..].iter().collect::<String>()
    } else {
        segments
            .iter()
            .rev()
            .find(|(ts, _)| *ts <= now)
            .or_else(|| segments.first())
            .map(|(_, text)| text.to_string())
            .unwrap_or_default()
    };

    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then(|| truncate_chars(&text, SNIPPET_CHARS))
}

fn marked_segments(transcript: &str) -> Vec<(f64, &str)> {
    let mut segments = Vec::new();
    let mut rest = transcript;

    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        let Some(close) = after.find(']') else { break };
        match parse_timestamp(&after[..close]) {
            Ok(ts) => {
                let body = &after[close + 1..];
                let end = body.find('[').unwrap_or(body.len());
                segments.push((ts, body[..end].trim()));
                rest = &body[end..];
            }
            Err(_) => rest = &after[close + 1..],
        }
    }
    segments
}

/// Truncate to at most `max` characters, ending in an ellipsis when cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(1);
    let mut out: String = text.chars().take(keep).collect();
    out.push('…');
    out
}

impl Pipeline {
    pub async fn context_summary(&self, id: &VideoId, request: &ContextRequest) -> PipelineResult<String> {
        let video = self.store.require(id).await?;
        Ok(build_context_summary(&video, request))
    }
}
