//! Gemini client configuration.

use std::time::Duration;

use crate::error::{GeminiError, GeminiResult};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Models tried in order until one answers.
pub const DEFAULT_MODELS: &[&str] = &["gemini-2.5-flash", "gemini-2.5-pro", "gemini-2.0-flash"];

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    /// Fallback order for generateContent
    pub models: Vec<String>,
    /// Timeout for generateContent and file metadata calls
    pub request_timeout: Duration,
    /// Timeout for the media upload call
    pub upload_timeout: Duration,
    /// Retries per model for rate limits and 5xx
    pub max_retries: u32,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            request_timeout: Duration::from_secs(300),
            upload_timeout: Duration::from_secs(900),
            max_retries: 2,
        }
    }

    pub fn from_env() -> GeminiResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GeminiError::config("GEMINI_API_KEY not set"))?;

        let mut config = Self::new(api_key);

        if let Ok(url) = std::env::var("GEMINI_BASE_URL") {
            if !url.trim().is_empty() {
                config.base_url = url.trim_end_matches('/').to_string();
            }
        }

        if let Ok(models) = std::env::var("GEMINI_MODELS") {
            let parsed: Vec<String> = models
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
            if !parsed.is_empty() {
                config.models = parsed;
            }
        }

        let secs = |key: &str| std::env::var(key).ok().and_then(|s| s.parse::<u64>().ok());
        if let Some(s) = secs("GEMINI_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(s);
        }
        if let Some(s) = secs("GEMINI_UPLOAD_TIMEOUT_SECS") {
            config.upload_timeout = Duration::from_secs(s);
        }
        if let Some(n) = secs("GEMINI_MAX_RETRIES") {
            config.max_retries = n as u32;
        }

        Ok(config)
    }
}
