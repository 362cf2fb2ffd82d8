//! Prompt contract with the inference service.
//!
//! Every builder here is a pure function of its inputs. Numeric input is
//! formatted defensively: negative or non-finite values print as 0 and
//! inverted ranges are reordered, so a bad override never panics.

pub mod analysis;
pub mod engagement;
pub mod generation_config;
pub mod refinement;

pub use analysis::{build_analysis_prompt, build_analysis_prompt_for};
pub use engagement::build_engagement_prompt;
pub use generation_config::GenerationConfig;
pub use refinement::build_refinement_prompt;

use lectern_models::{format_clock, Video};

use generation_config::non_negative;

/// Video facts embedded in follow-up prompts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoMetadata {
    pub title: String,
    pub duration: f64,
    pub summary: String,
}

impl VideoMetadata {
    pub fn from_video(video: &Video) -> Self {
        Self {
            title: video.title.clone(),
            duration: video.duration,
            summary: video.summary.clone(),
        }
    }

    /// Duration when it is a usable upper bound.
    pub fn known_duration(&self) -> Option<f64> {
        known_duration(self.duration)
    }
}

pub(crate) fn known_duration(duration: f64) -> Option<f64> {
    (duration.is_finite() && duration > 0.0).then_some(duration)
}

/// Seconds with at most one decimal, never negative.
pub(crate) fn secs(v: f64) -> String {
    let v = non_negative(v);
    if v.fract() == 0.0 {
        format!("{:.0}", v)
    } else {
        format!("{:.1}", v)
    }
}

pub(crate) fn duration_line(duration: f64) -> String {
    match known_duration(duration) {
        Some(d) => format!("{} seconds ({})", secs(d), format_clock(d)),
        None => "unknown".to_string(),
    }
}

pub(crate) fn to_pretty_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}
