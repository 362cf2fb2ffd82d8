//! Versioned generation parameters.
//!
//! The same values drive the analysis prompt and the post-hoc checks in the
//! sanitizer, and their fingerprint is stored with every analysis so a
//! tuning change invalidates cached results.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use validator::{Validate, ValidationError};

use lectern_models::CheckpointType;

use crate::error::{PipelineError, PipelineResult};

/// Environment variable naming an optional JSON override file.
pub const GENERATION_CONFIG_PATH_ENV: &str = "GENERATION_CONFIG_PATH";

/// Inclusive count range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_count_range"))]
pub struct CountRange {
    pub min: u32,
    pub max: u32,
}

impl CountRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// `(low, high)` even when the bounds were given inverted.
    pub fn ordered(&self) -> (u32, u32) {
        (self.min.min(self.max), self.min.max(self.max))
    }
}

fn validate_count_range(range: &CountRange) -> Result<(), ValidationError> {
    if range.min > range.max {
        return Err(ValidationError::new("inverted_count_range"));
    }
    Ok(())
}

/// Inclusive range in seconds (or a ratio, for hierarchy bounds).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_float_range"))]
pub struct FloatRange {
    pub min: f64,
    pub max: f64,
}

impl FloatRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Non-negative `(low, high)`; non-finite bounds become 0.
    pub fn ordered(&self) -> (f64, f64) {
        let a = non_negative(self.min);
        let b = non_negative(self.max);
        (a.min(b), a.max(b))
    }
}

fn validate_float_range(range: &FloatRange) -> Result<(), ValidationError> {
    if !range.min.is_finite() || !range.max.is_finite() || range.min < 0.0 {
        return Err(ValidationError::new("invalid_float_range"));
    }
    if range.min > range.max {
        return Err(ValidationError::new("inverted_float_range"));
    }
    Ok(())
}

pub(crate) fn non_negative(v: f64) -> f64 {
    if v.is_finite() {
        v.max(0.0)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CountTargets {
    #[validate(nested)]
    pub concepts: CountRange,
    #[validate(nested)]
    pub checkpoints: CountRange,
    #[validate(nested)]
    pub quiz: CountRange,
}

impl Default for CountTargets {
    fn default() -> Self {
        Self {
            concepts: CountRange::new(8, 15),
            checkpoints: CountRange::new(4, 8),
            quiz: CountRange::new(5, 10),
        }
    }
}

/// Target share of each importance level, in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_importance_weights"))]
pub struct ImportanceWeights {
    pub core: u32,
    pub supporting: u32,
    pub supplementary: u32,
}

impl Default for ImportanceWeights {
    fn default() -> Self {
        Self {
            core: 40,
            supporting: 40,
            supplementary: 20,
        }
    }
}

fn validate_importance_weights(w: &ImportanceWeights) -> Result<(), ValidationError> {
    if w.core + w.supporting + w.supplementary != 100 {
        return Err(ValidationError::new("importance_weights_must_sum_to_100"));
    }
    Ok(())
}

/// Target share of each checkpoint type, in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
#[validate(schema(function = "validate_checkpoint_weights"))]
pub struct CheckpointWeights {
    pub quick_quiz: u32,
    pub reflection: u32,
    pub prediction: u32,
    pub application: u32,
}

impl CheckpointWeights {
    pub fn weight(&self, checkpoint_type: CheckpointType) -> u32 {
        match checkpoint_type {
            CheckpointType::QuickQuiz => self.quick_quiz,
            CheckpointType::Reflection => self.reflection,
            CheckpointType::Prediction => self.prediction,
            CheckpointType::Application => self.application,
        }
    }
}

impl Default for CheckpointWeights {
    fn default() -> Self {
        Self {
            quick_quiz: 40,
            reflection: 25,
            prediction: 15,
            application: 20,
        }
    }
}

fn validate_checkpoint_weights(w: &CheckpointWeights) -> Result<(), ValidationError> {
    if w.quick_quiz + w.reflection + w.prediction + w.application != 100 {
        return Err(ValidationError::new("checkpoint_weights_must_sum_to_100"));
    }
    Ok(())
}

/// Pause before a checkpoint overlay appears.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_pause_delay"))]
pub struct PauseDelay {
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

fn validate_pause_delay(p: &PauseDelay) -> Result<(), ValidationError> {
    let ordered = 0.0 <= p.min && p.min <= p.default && p.default <= p.max;
    if !ordered || !p.max.is_finite() {
        return Err(ValidationError::new("pause_delay_must_satisfy_min_default_max"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct TimingPolicy {
    /// Nothing is placed within this many seconds of the end
    #[validate(range(min = 0.0))]
    pub end_safety_margin_secs: f64,

    /// Minimum gap between consecutive checkpoints
    #[validate(range(min = 0.0))]
    pub checkpoint_min_spacing_secs: f64,

    /// How far before its concept a prediction checkpoint sits
    #[validate(nested)]
    pub prediction_window: FloatRange,

    /// Non-prediction checkpoints wait this long after their concept
    #[validate(range(min = 0.0))]
    pub explanation_window_secs: f64,

    #[validate(nested)]
    pub pause_delay: PauseDelay,
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self {
            end_safety_margin_secs: 10.0,
            checkpoint_min_spacing_secs: 60.0,
            prediction_window: FloatRange::new(5.0, 10.0),
            explanation_window_secs: 15.0,
            pause_delay: PauseDelay {
                min: 0.3,
                max: 2.0,
                default: lectern_models::timeline::DEFAULT_PAUSE_DELAY_SECS,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
#[validate(schema(function = "validate_hierarchy_policy"))]
pub struct HierarchyPolicy {
    /// Share of concepts that are sub concepts (0.0 to 1.0)
    #[validate(nested)]
    pub sub_concept_ratio: FloatRange,

    pub max_sub_per_main: u32,
}

impl Default for HierarchyPolicy {
    fn default() -> Self {
        Self {
            sub_concept_ratio: FloatRange::new(0.2, 0.5),
            max_sub_per_main: 3,
        }
    }
}

fn validate_hierarchy_policy(h: &HierarchyPolicy) -> Result<(), ValidationError> {
    if h.sub_concept_ratio.max > 1.0 {
        return Err(ValidationError::new("sub_concept_ratio_above_one"));
    }
    Ok(())
}

/// The full set of tunable generation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationConfig {
    #[validate(length(min = 1))]
    pub version: String,

    #[validate(nested)]
    pub counts: CountTargets,

    #[validate(nested)]
    pub importance_weights: ImportanceWeights,

    #[validate(nested)]
    pub checkpoint_weights: CheckpointWeights,

    #[validate(nested)]
    pub timing: TimingPolicy,

    #[validate(nested)]
    pub hierarchy: HierarchyPolicy,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            version: "2.1".to_string(),
            counts: CountTargets::default(),
            importance_weights: ImportanceWeights::default(),
            checkpoint_weights: CheckpointWeights::default(),
            timing: TimingPolicy::default(),
            hierarchy: HierarchyPolicy::default(),
        }
    }
}

impl GenerationConfig {
    /// `"{version}+{first 12 hex chars of sha256(canonical json)}"`.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let digest = format!("{:x}", Sha256::digest(&canonical));
        format!("{}+{}", self.version, &digest[..12])
    }

    /// Load from `GENERATION_CONFIG_PATH` when set, defaults otherwise.
    pub fn load() -> PipelineResult<Self> {
        match std::env::var(GENERATION_CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(Path::new(path.trim())),
            _ => Self::default().validated(),
        }
    }

    pub fn from_file(path: &Path) -> PipelineResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            PipelineError::config(format!("cannot read generation config {}: {}", path.display(), e))
        })?;
        Self::from_json(&bytes)
    }

    /// Parse a (possibly partial) JSON override; missing fields keep
    /// their defaults.
    pub fn from_json(bytes: &[u8]) -> PipelineResult<Self> {
        let config: Self = serde_json::from_slice(bytes)
            .map_err(|e| PipelineError::config(format!("invalid generation config JSON: {}", e)))?;
        config.validated()
    }

    fn validated(self) -> PipelineResult<Self> {
        self.validate()
            .map_err(|e| PipelineError::config(format!("invalid generation config: {}", e)))?;
        Ok(self)
    }
}
