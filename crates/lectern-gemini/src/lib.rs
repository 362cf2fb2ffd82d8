//! Gemini REST client for media analysis.
//!
//! Covers the subset of the Generative Language API the pipeline needs:
//! resumable media upload, file state polling and `generateContent` with
//! model fallback.

pub mod client;
pub mod config;
pub mod error;
pub mod types;

pub use client::{GeminiClient, Generation};
pub use config::GeminiConfig;
pub use error::{GeminiError, GeminiResult};
pub use types::{FileState, GeminiFile, GenerateContentRequest, GenerateContentResponse, Part};
