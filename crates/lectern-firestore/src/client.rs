//! Firestore REST API client.
//!
//! - Token caching with refresh margin, one forced refresh on expired tokens
//! - HTTP client tuning (pooling, timeouts)
//! - Conditional writes on `currentDocument.updateTime`
//! - Tracing spans and request metrics

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{info_span, Instrument};

use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_request;
use crate::retry::RetryConfig;
use crate::token_cache::{TokenCache, TokenSource};
use crate::types::{Document, ListDocumentsResponse, Value};

const PRODUCTION_ENDPOINT: &str = "https://firestore.googleapis.com";

/// Bearer token the Firestore emulator accepts.
const EMULATOR_TOKEN: &str = "owner";

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// Scheme + host, e.g. `https://firestore.googleapis.com`
    pub endpoint: String,
    /// Set when talking to the local emulator (no service account needed)
    pub emulator: bool,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryConfig,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database_id: "(default)".to_string(),
            endpoint: PRODUCTION_ENDPOINT.to_string(),
            emulator: false,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> FirestoreResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .or_else(|_| std::env::var("FIREBASE_PROJECT_ID"))
            .map_err(|_| {
                FirestoreError::auth_error(
                    "GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set to access Firestore",
                )
            })?;

        if project_id.trim().is_empty() {
            return Err(FirestoreError::auth_error(
                "GCP_PROJECT_ID or FIREBASE_PROJECT_ID cannot be empty",
            ));
        }

        let emulator_host = std::env::var("FIRESTORE_EMULATOR_HOST")
            .ok()
            .filter(|h| !h.is_empty());

        let secs = |key: &str, fallback: u64| {
            std::env::var(key)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(fallback)
        };

        Ok(Self {
            project_id,
            database_id: std::env::var("FIRESTORE_DATABASE_ID")
                .unwrap_or_else(|_| "(default)".to_string()),
            endpoint: emulator_host
                .as_ref()
                .map(|h| format!("http://{}", h))
                .unwrap_or_else(|| PRODUCTION_ENDPOINT.to_string()),
            emulator: emulator_host.is_some(),
            timeout: Duration::from_secs(secs("FIRESTORE_TIMEOUT_SECS", 30)),
            connect_timeout: Duration::from_secs(secs("FIRESTORE_CONNECT_TIMEOUT_SECS", 5)),
            retry: RetryConfig::from_env(),
        })
    }

    fn documents_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/databases/{}/documents",
            self.endpoint.trim_end_matches('/'),
            self.project_id,
            self.database_id
        )
    }
}

/// Firestore REST API client.
#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    config: FirestoreConfig,
    base_url: String,
    tokens: Arc<TokenCache>,
}

impl FirestoreClient {
    /// Create a client, loading service-account credentials unless the
    /// config points at the emulator.
    pub async fn new(config: FirestoreConfig) -> FirestoreResult<Self> {
        let source = if config.emulator {
            TokenSource::Fixed(EMULATOR_TOKEN.to_string())
        } else {
            TokenSource::Provider(Self::service_account()?)
        };
        Self::with_token_source(config, source)
    }

    /// Create a client with an explicit token source.
    pub fn with_token_source(config: FirestoreConfig, source: TokenSource) -> FirestoreResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("lectern-firestore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FirestoreError::Network)?;

        Ok(Self {
            http,
            base_url: config.documents_url(),
            config,
            tokens: Arc::new(TokenCache::new(source)),
        })
    }

    pub async fn from_env() -> FirestoreResult<Self> {
        Self::new(FirestoreConfig::from_env()?).await
    }

    fn service_account() -> FirestoreResult<Arc<dyn TokenProvider>> {
        let account = CustomServiceAccount::from_env().map_err(|e| {
            FirestoreError::auth_error(format!("Failed to load service account: {}", e))
        })?;

        match account {
            Some(sa) => Ok(Arc::new(sa)),
            None => Err(FirestoreError::auth_error(
                "GOOGLE_APPLICATION_CREDENTIALS not set. \
                 Set it to the path of your service account JSON file.",
            )),
        }
    }

    pub fn config(&self) -> &FirestoreConfig {
        &self.config
    }

    fn document_url(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, doc_id)
    }

    fn is_access_token_expired(body: &str) -> bool {
        body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
    }

    /// Send an authorized request; an expired token is refreshed once.
    async fn send<F>(&self, build: F) -> FirestoreResult<Response>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.tokens.get_token().await?;
        let response = build(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if !Self::is_access_token_expired(&body) {
            return Err(FirestoreError::from_http_status(401, body));
        }

        self.tokens.invalidate().await;
        let token = self.tokens.get_token().await?;
        Ok(build(&token).send().await?)
    }

    // =========================================================================
    // Document operations
    // =========================================================================

    /// Get a document; `None` when it does not exist.
    pub async fn get_document(&self, collection: &str, doc_id: &str) -> FirestoreResult<Option<Document>> {
        let url = self.document_url(collection, doc_id);

        self.execute_request("get_document", collection, Some(doc_id), async {
            let response = self.send(|token| self.http.get(&url).bearer_auth(token)).await?;
            match response.status() {
                StatusCode::OK => Ok(Some(response.json().await?)),
                StatusCode::NOT_FOUND => Ok(None),
                status => Err(Self::error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Create a document with a caller-chosen ID.
    pub async fn create_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> FirestoreResult<Document> {
        let url = format!(
            "{}/{}?documentId={}",
            self.base_url,
            collection,
            urlencoding::encode(doc_id)
        );
        let body = Document::new(fields);

        self.execute_request("create_document", collection, Some(doc_id), async {
            let response = self
                .send(|token| self.http.post(&url).bearer_auth(token).json(&body))
                .await?;
            match response.status() {
                StatusCode::OK | StatusCode::CREATED => Ok(response.json().await?),
                StatusCode::CONFLICT => Err(FirestoreError::AlreadyExists(format!(
                    "{}/{}",
                    collection, doc_id
                ))),
                status => Err(Self::error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Overwrite the masked fields of an existing document.
    ///
    /// With `update_time`, the write only succeeds if the stored document
    /// still carries that update time; otherwise `PreconditionFailed`.
    pub async fn update_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_mask: &[&str],
        update_time: Option<&str>,
    ) -> FirestoreResult<Document> {
        let mut params: Vec<String> = update_mask
            .iter()
            .map(|f| format!("updateMask.fieldPaths={}", urlencoding::encode(f)))
            .collect();
        match update_time {
            Some(ts) => params.push(format!("currentDocument.updateTime={}", urlencoding::encode(ts))),
            None => params.push("currentDocument.exists=true".to_string()),
        }
        let url = format!("{}?{}", self.document_url(collection, doc_id), params.join("&"));
        let body = Document::new(fields);
        let operation = if update_time.is_some() {
            "update_document_precondition"
        } else {
            "update_document"
        };

        self.execute_request(operation, collection, Some(doc_id), async {
            let response = self
                .send(|token| self.http.patch(&url).bearer_auth(token).json(&body))
                .await?;
            match response.status() {
                StatusCode::OK => Ok(response.json().await?),
                StatusCode::NOT_FOUND => {
                    Err(FirestoreError::not_found(format!("{}/{}", collection, doc_id)))
                }
                StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT if update_time.is_some() => {
                    let text = response.text().await.unwrap_or_default();
                    Err(FirestoreError::PreconditionFailed(text))
                }
                StatusCode::BAD_REQUEST => {
                    // The emulator reports a missing document as FAILED_PRECONDITION.
                    let text = response.text().await.unwrap_or_default();
                    if update_time.is_none() && text.contains("FAILED_PRECONDITION") {
                        Err(FirestoreError::not_found(format!("{}/{}", collection, doc_id)))
                    } else {
                        Err(FirestoreError::from_http_status(400, format!("{} failed: {}", url, text)))
                    }
                }
                status => Err(Self::error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    /// List one page of documents in a collection.
    pub async fn list_documents(
        &self,
        collection: &str,
        page_size: Option<u32>,
        page_token: Option<&str>,
    ) -> FirestoreResult<ListDocumentsResponse> {
        let mut params = Vec::new();
        if let Some(size) = page_size {
            params.push(format!("pageSize={}", size));
        }
        if let Some(token) = page_token {
            params.push(format!("pageToken={}", urlencoding::encode(token)));
        }
        let mut url = format!("{}/{}", self.base_url, collection);
        if !params.is_empty() {
            url = format!("{}?{}", url, params.join("&"));
        }

        self.execute_request("list_documents", collection, None, async {
            let response = self.send(|token| self.http.get(&url).bearer_auth(token)).await?;
            match response.status() {
                StatusCode::OK => Ok(response.json().await?),
                status => Err(Self::error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Execute with the configured retry policy.
    pub async fn with_retry<T, F, Fut>(&self, operation: &str, op: F) -> FirestoreResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = FirestoreResult<T>>,
    {
        crate::retry::with_retry(&self.config.retry, operation, op).await
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    async fn execute_request<T, F>(
        &self,
        operation: &str,
        collection: &str,
        doc_id: Option<&str>,
        fut: F,
    ) -> FirestoreResult<T>
    where
        F: Future<Output = FirestoreResult<T>>,
    {
        let span = info_span!(
            "firestore_request",
            operation = %operation,
            collection = %collection,
            doc_id = doc_id.unwrap_or("")
        );

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, latency_ms);

        result
    }

    async fn error_from_response(status: StatusCode, url: &str, response: Response) -> FirestoreError {
        let body = response.text().await.unwrap_or_default();
        FirestoreError::from_http_status(status.as_u16(), format!("{} failed: {}", url, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "GCP_PROJECT_ID",
            "FIREBASE_PROJECT_ID",
            "FIRESTORE_EMULATOR_HOST",
            "FIRESTORE_CONNECT_TIMEOUT_SECS",
            "FIRESTORE_DATABASE_ID",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_config_requires_project_id() {
        clear_env();
        assert!(FirestoreConfig::from_env().is_err());

        std::env::set_var("GCP_PROJECT_ID", "  ");
        assert!(FirestoreConfig::from_env().is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        clear_env();
        std::env::set_var("FIREBASE_PROJECT_ID", "lectern-dev");
        let config = FirestoreConfig::from_env().unwrap();
        assert_eq!(config.project_id, "lectern-dev");
        assert_eq!(config.database_id, "(default)");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert!(!config.emulator);
        assert_eq!(
            config.documents_url(),
            "https://firestore.googleapis.com/v1/projects/lectern-dev/databases/(default)/documents"
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_emulator_host() {
        clear_env();
        std::env::set_var("GCP_PROJECT_ID", "demo");
        std::env::set_var("FIRESTORE_EMULATOR_HOST", "localhost:8080");
        std::env::set_var("FIRESTORE_CONNECT_TIMEOUT_SECS", "not-a-number");
        let config = FirestoreConfig::from_env().unwrap();
        assert!(config.emulator);
        assert_eq!(config.endpoint, "http://localhost:8080");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        clear_env();
    }

    #[test]
    fn test_expired_token_detection() {
        assert!(FirestoreClient::is_access_token_expired(r#"{"status":"UNAUTHENTICATED"}"#));
        assert!(FirestoreClient::is_access_token_expired("ACCESS_TOKEN_EXPIRED"));
        assert!(!FirestoreClient::is_access_token_expired("PERMISSION_DENIED"));
    }
}
