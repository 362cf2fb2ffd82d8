use async_trait::async_trait;

use lectern_models::VideoId;
use lectern_storage::{AnalysisArtifact, AuditLog, EngagementArtifact, RefinementArtifact};

use super::ArtifactSink;
use crate::error::PipelineResult;

#[async_trait]
impl ArtifactSink for AuditLog {
    async fn record_analysis(&self, video_id: &VideoId, artifact: AnalysisArtifact) -> PipelineResult<()> {
        Ok(AuditLog::record_analysis(self, video_id.as_str(), artifact).await?)
    }

    async fn append_refinement(&self, video_id: &VideoId, artifact: RefinementArtifact) -> PipelineResult<()> {
        Ok(AuditLog::append_refinement(self, video_id.as_str(), artifact).await?)
    }

    async fn append_engagement(&self, video_id: &VideoId, artifact: EngagementArtifact) -> PipelineResult<()> {
        Ok(AuditLog::append_engagement(self, video_id.as_str(), artifact).await?)
    }
}

/// Sink used when no audit directory is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopArtifactSink;

#[async_trait]
impl ArtifactSink for NoopArtifactSink {
    async fn record_analysis(&self, _video_id: &VideoId, _artifact: AnalysisArtifact) -> PipelineResult<()> {
        Ok(())
    }

    async fn append_refinement(&self, _video_id: &VideoId, _artifact: RefinementArtifact) -> PipelineResult<()> {
        Ok(())
    }

    async fn append_engagement(&self, _video_id: &VideoId, _artifact: EngagementArtifact) -> PipelineResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lectern_models::EngagementAnalysis;

    #[tokio::test]
    async fn test_audit_log_as_sink() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path());
        let sink: &dyn ArtifactSink = &log;
        let id = VideoId::from("vid-9");

        sink.append_engagement(
            &id,
            EngagementArtifact {
                analysis: EngagementAnalysis::default(),
                recorded_at: Utc::now(),
            },
        )
        .await
        .unwrap();

        let record = log.read("vid-9").await.unwrap().unwrap();
        assert_eq!(record.engagements.len(), 1);
    }
}
