//! Storage for the Lectern backend.
//!
//! This crate provides:
//! - Cloudflare R2 downloads, presigned URLs and deletion
//! - An expiring cache for presigned URLs
//! - The file-based audit log of AI artifacts

pub mod audit;
pub mod client;
pub mod error;
pub mod url_cache;

pub use audit::{AnalysisArtifact, AuditLog, AuditRecord, EngagementArtifact, RefinementArtifact};
pub use client::{R2Client, R2Config, MAX_PRESIGN_TTL};
pub use error::{StorageError, StorageResult};
pub use url_cache::{Cached, ExpiringCache};
