use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use lectern_gemini::GeminiClient;

use super::{InferenceOutput, InferenceService, MediaHandle};
use crate::error::PipelineResult;
use crate::metrics::record_inference;

/// [`InferenceService`] backed by the Gemini Files and generateContent APIs.
pub struct GeminiInference {
    client: GeminiClient,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl GeminiInference {
    pub fn new(client: GeminiClient, poll_interval: Duration, poll_attempts: u32) -> Self {
        Self {
            client,
            poll_interval,
            poll_attempts,
        }
    }
}

#[async_trait]
impl InferenceService for GeminiInference {
    async fn upload_media(&self, path: &Path, mime_type: &str) -> PipelineResult<MediaHandle> {
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "lecture".to_string());
        let file = self.client.upload_file(path, mime_type, &display_name).await?;
        Ok(MediaHandle {
            name: file.name,
            uri: file.uri,
            mime_type: if file.mime_type.is_empty() {
                mime_type.to_string()
            } else {
                file.mime_type
            },
        })
    }

    async fn wait_until_processed(&self, media: &MediaHandle) -> PipelineResult<MediaHandle> {
        let file = self
            .client
            .wait_until_active(&media.name, self.poll_interval, self.poll_attempts)
            .await?;
        Ok(MediaHandle {
            uri: if file.uri.is_empty() { media.uri.clone() } else { file.uri },
            ..media.clone()
        })
    }

    async fn generate_from_media(&self, media: &MediaHandle, prompt: &str) -> PipelineResult<InferenceOutput> {
        let start = Instant::now();
        let generation = self
            .client
            .generate_with_file(&media.uri, &media.mime_type, prompt)
            .await?;
        record_inference("media", &generation.model, start.elapsed());
        Ok(InferenceOutput {
            text: generation.text,
            model: generation.model,
        })
    }

    async fn generate_text(&self, prompt: &str) -> PipelineResult<InferenceOutput> {
        let start = Instant::now();
        let generation = self.client.generate_text(prompt).await?;
        record_inference("text", &generation.model, start.elapsed());
        Ok(InferenceOutput {
            text: generation.text,
            model: generation.model,
        })
    }

    async fn delete_media(&self, media: &MediaHandle) -> PipelineResult<()> {
        Ok(self.client.delete_file(&media.name).await?)
    }
}
