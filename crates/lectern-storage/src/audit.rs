//! File-based audit log of AI artifacts.
//!
//! One JSON document per video under a local directory. The log is purely
//! additive: analysis snapshots replace the previous snapshot, refinement
//! and engagement results are appended.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use lectern_models::{AnalysisResult, EngagementAnalysis, RefinementSuggestionBundle};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// Snapshot of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisArtifact {
    pub prompt: String,
    pub raw_response: String,
    pub parsed: AnalysisResult,
    pub fingerprint: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinementArtifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_area: Option<String>,
    pub suggestions: RefinementSuggestionBundle,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementArtifact {
    pub analysis: EngagementAnalysis,
    pub recorded_at: DateTime<Utc>,
}

/// Everything recorded for one video.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuditRecord {
    pub video_id: String,
    pub analysis: Option<AnalysisArtifact>,
    pub refinements: Vec<RefinementArtifact>,
    pub engagements: Vec<EngagementArtifact>,
}

/// Directory-backed audit log.
///
/// Writes are serialized through one lock so read-modify-write cycles on
/// the same file never interleave.
pub struct AuditLog {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File for `video_id`; path separators and dots are replaced.
    pub fn path_for(&self, video_id: &str) -> StorageResult<PathBuf> {
        let safe: String = video_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        if safe.is_empty() {
            return Err(StorageError::Audit("empty video id".to_string()));
        }
        Ok(self.dir.join(format!("{}.json", safe)))
    }

    pub async fn read(&self, video_id: &str) -> StorageResult<Option<AuditRecord>> {
        let path = self.path_for(video_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn record_analysis(&self, video_id: &str, artifact: AnalysisArtifact) -> StorageResult<()> {
        self.modify(video_id, |record| record.analysis = Some(artifact)).await
    }

    pub async fn append_refinement(&self, video_id: &str, artifact: RefinementArtifact) -> StorageResult<()> {
        self.modify(video_id, |record| record.refinements.push(artifact)).await
    }

    pub async fn append_engagement(&self, video_id: &str, artifact: EngagementArtifact) -> StorageResult<()> {
        self.modify(video_id, |record| record.engagements.push(artifact)).await
    }

    async fn modify<F>(&self, video_id: &str, change: F) -> StorageResult<()>
    where
        F: FnOnce(&mut AuditRecord),
    {
        let _guard = self.write_lock.lock().await;

        let path = self.path_for(video_id)?;
        let mut record = self.read(video_id).await?.unwrap_or_else(|| AuditRecord {
            video_id: video_id.to_string(),
            ..Default::default()
        });
        change(&mut record);

        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&record)?).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(video_id = %video_id, path = %path.display(), "Audit record written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis_artifact() -> AnalysisArtifact {
        AnalysisArtifact {
            prompt: "Analyze".into(),
            raw_response: "{}".into(),
            parsed: AnalysisResult::default(),
            fingerprint: "v1+abc".into(),
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_missing_record_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path());
        assert!(log.read("v1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_records_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("audit"));

        log.record_analysis("v1", analysis_artifact()).await.unwrap();
        log.append_refinement(
            "v1",
            RefinementArtifact {
                focus_area: Some("accessibility".into()),
                suggestions: RefinementSuggestionBundle::default(),
                recorded_at: Utc::now(),
            },
        )
        .await
        .unwrap();
        log.append_engagement(
            "v1",
            EngagementArtifact {
                analysis: EngagementAnalysis::default(),
                recorded_at: Utc::now(),
            },
        )
        .await
        .unwrap();
        log.append_engagement(
            "v1",
            EngagementArtifact {
                analysis: EngagementAnalysis::default(),
                recorded_at: Utc::now(),
            },
        )
        .await
        .unwrap();

        let record = log.read("v1").await.unwrap().unwrap();
        assert_eq!(record.video_id, "v1");
        assert_eq!(record.analysis.unwrap().fingerprint, "v1+abc");
        assert_eq!(record.refinements.len(), 1);
        assert_eq!(record.engagements.len(), 2);
    }

    #[test]
    fn test_path_for_sanitizes() {
        let log = AuditLog::new("/tmp/audit");
        let path = log.path_for("../etc/passwd").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/audit/___etc_passwd.json"));
        assert!(log.path_for("").is_err());
    }
}
