//! Shared data models for the Lectern backend.
//!
//! This crate provides Serde-serializable types for:
//! - The `Video` aggregate and its typed field patches
//! - Timeline entities (concepts, checkpoints, quiz questions)
//! - Processing, refinement and engagement status machines
//! - Refinement suggestions and the engagement report
//! - Lenient timestamp coercion for model output

pub mod engagement;
pub mod patch;
pub mod refinement;
pub mod status;
pub mod timeline;
pub mod timestamp;
pub mod video;

// Re-export common types
pub use engagement::EngagementAnalysis;
pub use patch::{VideoField, VideoPatch};
pub use refinement::{
    CheckpointAddition, CheckpointImprovement, ConceptAddition, ConceptImprovement, QuizAddition,
    QuizImprovement, RefinementSuggestionBundle, Suggestion, TimelineGap,
};
pub use status::{EngagementStatus, ProcessingStage, ProcessingStatus, RefinementStatus, TransitionError};
pub use timeline::{
    concept_key, validate_hierarchy, AnalysisResult, Checkpoint, CheckpointType, Concept,
    ConceptType, HierarchyViolation, Importance, QuizQuestion,
};
pub use timestamp::{coerce_seconds, format_clock, parse_timestamp, TimestampError};
pub use video::{Video, VideoId};
