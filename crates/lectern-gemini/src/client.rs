//! Gemini REST client.

use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use reqwest::{Client, Response};
use tracing::{debug, info, warn};

use crate::config::GeminiConfig;
use crate::error::{GeminiError, GeminiResult};
use crate::types::{FileState, GeminiFile, GenerateContentRequest, GenerateContentResponse, Part, UploadResponse};

/// Longest wait between retries.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Exponential backoff from 500ms, capped at [`MAX_RETRY_DELAY`].
fn retry_delay(attempt: u32) -> Duration {
    let millis = 500u64.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(millis).min(MAX_RETRY_DELAY)
}

/// Text produced by a generateContent call and the model that answered.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub model: String,
}

/// Gemini API client.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> GeminiResult<Self> {
        if config.models.is_empty() {
            return Err(GeminiError::config("at least one Gemini model is required"));
        }

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("lectern-gemini/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(GeminiError::Network)?;

        Ok(Self { http, config })
    }

    pub fn from_env() -> GeminiResult<Self> {
        Self::new(GeminiConfig::from_env()?)
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    // =========================================================================
    // Files API
    // =========================================================================

    /// Upload a local file with the resumable protocol (start, then
    /// upload+finalize in one request).
    pub async fn upload_file(&self, path: &Path, mime_type: &str, display_name: &str) -> GeminiResult<GeminiFile> {
        let bytes = tokio::fs::read(path).await?;
        let size = bytes.len();
        info!(path = %path.display(), size, mime_type, "Uploading media to Gemini");

        let start = self
            .http
            .post(self.url("upload/v1beta/files"))
            .query(&[("key", self.config.api_key.as_str())])
            .timeout(self.config.request_timeout)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", size.to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&serde_json::json!({ "file": { "display_name": display_name } }))
            .send()
            .await?;
        let start = Self::check_status(start).await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| GeminiError::invalid_response("upload start returned no x-goog-upload-url"))?;

        let started = Instant::now();
        let finalize = self
            .http
            .post(&upload_url)
            .timeout(self.config.upload_timeout)
            .header("Content-Length", size.to_string())
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await?;
        let finalize = Self::check_status(finalize).await?;

        let uploaded: UploadResponse = finalize.json().await?;
        metrics::histogram!("gemini_upload_seconds").record(started.elapsed().as_secs_f64());
        debug!(file = %uploaded.file.name, state = ?uploaded.file.state, "Upload finalized");
        Ok(uploaded.file)
    }

    /// Fetch file metadata by resource name (`files/...`).
    pub async fn get_file(&self, name: &str) -> GeminiResult<GeminiFile> {
        self.with_retry("get_file", || async {
            let response = self
                .http
                .get(self.url(&format!("v1beta/{}", name)))
                .query(&[("key", self.config.api_key.as_str())])
                .timeout(self.config.request_timeout)
                .send()
                .await?;
            Ok(Self::check_status(response).await?.json().await?)
        })
        .await
    }

    /// Poll until the file is ACTIVE, bounded by `max_attempts`.
    pub async fn wait_until_active(
        &self,
        name: &str,
        poll_interval: Duration,
        max_attempts: u32,
    ) -> GeminiResult<GeminiFile> {
        for attempt in 1..=max_attempts.max(1) {
            let file = self.get_file(name).await?;
            match file.state {
                FileState::Active => {
                    debug!(file = %name, attempt, "Gemini file is active");
                    return Ok(file);
                }
                FileState::Failed => {
                    let reason = file
                        .error
                        .map(|e| e.message)
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| "no reason given".to_string());
                    return Err(GeminiError::FileProcessingFailed(format!("{}: {}", name, reason)));
                }
                state => {
                    debug!(file = %name, attempt, ?state, "Gemini file not ready yet");
                }
            }
            if attempt < max_attempts {
                tokio::time::sleep(poll_interval).await;
            }
        }

        Err(GeminiError::Timeout(format!(
            "{} not active after {} polls",
            name, max_attempts
        )))
    }

    pub async fn delete_file(&self, name: &str) -> GeminiResult<()> {
        let response = self
            .http
            .delete(self.url(&format!("v1beta/{}", name)))
            .query(&[("key", self.config.api_key.as_str())])
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    // =========================================================================
    // generateContent
    // =========================================================================

    /// Call generateContent, falling back through the configured models.
    pub async fn generate(&self, request: &GenerateContentRequest) -> GeminiResult<Generation> {
        let mut failures = Vec::new();

        for model in &self.config.models {
            let started = Instant::now();
            match self.generate_with_model(model, request).await {
                Ok(text) => {
                    metrics::histogram!("gemini_generate_seconds", "model" => model.clone())
                        .record(started.elapsed().as_secs_f64());
                    info!(model = %model, chars = text.len(), "Gemini generation succeeded");
                    return Ok(Generation {
                        text,
                        model: model.clone(),
                    });
                }
                Err(e) if e.is_model_specific() => {
                    metrics::counter!("gemini_model_failures_total", "model" => model.clone()).increment(1);
                    warn!(model = %model, "Gemini model failed, trying next: {}", e);
                    failures.push(format!("{}: {}", model, e));
                }
                Err(e) => return Err(e),
            }
        }

        Err(GeminiError::AllModelsFailed(failures.join("; ")))
    }

    /// Prompt about an uploaded file.
    pub async fn generate_with_file(&self, file_uri: &str, mime_type: &str, prompt: &str) -> GeminiResult<Generation> {
        let request = GenerateContentRequest::json_output(vec![
            Part::file(file_uri, mime_type),
            Part::text(prompt),
        ]);
        self.generate(&request).await
    }

    /// Text-only prompt.
    pub async fn generate_text(&self, prompt: &str) -> GeminiResult<Generation> {
        let request = GenerateContentRequest::json_output(vec![Part::text(prompt)]);
        self.generate(&request).await
    }

    async fn generate_with_model(&self, model: &str, request: &GenerateContentRequest) -> GeminiResult<String> {
        let url = self.url(&format!("v1beta/models/{}:generateContent", model));

        let body: GenerateContentResponse = self
            .with_retry("generate_content", || async {
                let response = self
                    .http
                    .post(&url)
                    .query(&[("key", self.config.api_key.as_str())])
                    .timeout(self.config.request_timeout)
                    .json(request)
                    .send()
                    .await?;
                Ok(Self::check_status(response).await?.json().await?)
            })
            .await?;

        if let Some(reason) = body.block_reason() {
            return Err(GeminiError::Blocked(reason.to_string()));
        }
        body.text().ok_or(GeminiError::EmptyResponse)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn check_status(response: Response) -> GeminiResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        Err(GeminiError::api(status.as_u16(), text))
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, op: F) -> GeminiResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = GeminiResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = retry_delay(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        "Gemini request failed, retrying in {:?}: {}",
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_is_bounded() {
        assert_eq!(retry_delay(0), Duration::from_millis(500));
        assert_eq!(retry_delay(2), Duration::from_secs(2));
        assert_eq!(retry_delay(6), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(64), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(u32::MAX), MAX_RETRY_DELAY);
    }

    #[test]
    fn test_rejects_empty_model_list() {
        let mut config = GeminiConfig::new("k");
        config.models.clear();
        assert!(matches!(GeminiClient::new(config), Err(GeminiError::Config(_))));
    }

    #[test]
    fn test_url_joins_base() {
        let mut config = GeminiConfig::new("k");
        config.base_url = "http://localhost:9000/".into();
        let client = GeminiClient::new(config).unwrap();
        assert_eq!(client.url("v1beta/files/x"), "http://localhost:9000/v1beta/files/x");
    }
}
