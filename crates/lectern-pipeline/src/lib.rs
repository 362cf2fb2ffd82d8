//! Lecture analysis pipeline.
//!
//! This crate provides:
//! - The prompt contract and generation config with its fingerprint
//! - Sanitization of model output into a bounded timeline
//! - The processing state machine with fingerprint cache short-circuit
//! - Refinement and engagement runs, and suggestion merge-back
//! - Context summaries for conversational agents
//! - A task supervisor for detached runs

pub mod backends;
pub mod config;
pub mod context_summary;
pub mod error;
pub mod json_extract;
pub mod logging;
pub mod merge;
pub mod metrics;
pub mod pipeline;
pub mod processor;
pub mod prompt;
pub mod refinement;
pub mod sanitize;
pub mod supervisor;

pub use backends::{
    ArtifactSink, FirestoreVideoStore, GeminiInference, InMemoryVideoStore, InferenceOutput, InferenceService,
    LocalMedia, MediaHandle, NoopArtifactSink, ObjectStore, R2ObjectStore, SignedReference, VideoStore,
};
pub use config::PipelineConfig;
pub use context_summary::{build_context_summary, ChatMessage, ContextRequest, InteractionEvent};
pub use error::{PipelineError, PipelineResult};
pub use json_extract::{extract_first_json_object, parse_first_json_object};
pub use logging::JobLogger;
pub use merge::merge_suggestion;
pub use pipeline::{Backends, Pipeline};
pub use prompt::{
    build_analysis_prompt, build_analysis_prompt_for, build_engagement_prompt, build_refinement_prompt,
    GenerationConfig, VideoMetadata,
};
pub use sanitize::{audit_timing, sanitize_analysis, MalformedAnalysisError, SanitizePolicy, TimingViolation};
pub use supervisor::{TaskHandle, TaskOutcome, TaskSupervisor};
