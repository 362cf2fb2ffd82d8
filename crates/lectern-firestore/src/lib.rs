//! Firestore REST API client.
//!
//! This crate provides:
//! - A REST client with service-account auth via `gcp_auth`
//! - Token caching, retry with jitter and request metrics
//! - The video repository with compare-and-swap updates

pub mod client;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod token_cache;
pub mod types;
pub mod video_repo;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use retry::RetryConfig;
pub use token_cache::TokenSource;
pub use types::{Document, Value};
pub use video_repo::VideoRepository;
