//! Access-token cache for Firestore requests.
//!
//! Tokens are refreshed a minute before they lapse. Refresh is single-flight:
//! concurrent callers wait on the write lock and re-check before fetching.
//! If a refresh fails while the old token is still technically valid, the old
//! token is handed out.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use gcp_auth::TokenProvider;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};

const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Used when the provider reports an expiry we cannot convert.
const FALLBACK_TTL: Duration = Duration::from_secs(50 * 60);

/// OAuth scope for the Firestore REST API.
pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

/// Where tokens come from.
#[derive(Clone)]
pub enum TokenSource {
    /// Service-account credentials via `gcp_auth`.
    Provider(Arc<dyn TokenProvider>),
    /// A fixed bearer token (emulator and tests).
    Fixed(String),
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn fresh(&self, now: Instant) -> bool {
        now + REFRESH_MARGIN < self.expires_at
    }

    fn usable(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Convert a provider expiry timestamp into a monotonic deadline.
fn deadline_for(expires_at: DateTime<Utc>, now_utc: DateTime<Utc>, now: Instant) -> Instant {
    if expires_at <= now_utc {
        return now;
    }
    match (expires_at - now_utc).to_std() {
        Ok(ttl) => now + ttl,
        Err(_) => now + FALLBACK_TTL,
    }
}

/// Thread-safe token cache.
pub struct TokenCache {
    source: TokenSource,
    slot: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(source: TokenSource) -> Self {
        Self {
            source,
            slot: RwLock::new(None),
        }
    }

    /// Drop the cached token so the next call refreshes.
    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
    }

    pub async fn get_token(&self) -> FirestoreResult<String> {
        let provider = match &self.source {
            TokenSource::Fixed(token) => return Ok(token.clone()),
            TokenSource::Provider(p) => p,
        };

        if let Some(cached) = self.slot.read().await.as_ref() {
            if cached.fresh(Instant::now()) {
                return Ok(cached.value.clone());
            }
        }

        let mut slot = self.slot.write().await;
        if let Some(cached) = slot.as_ref() {
            if cached.fresh(Instant::now()) {
                return Ok(cached.value.clone());
            }
        }

        match provider.token(&[FIRESTORE_SCOPE]).await {
            Ok(token) => {
                let value = token.as_str().to_string();
                let expires_at = deadline_for(token.expires_at(), Utc::now(), Instant::now());
                *slot = Some(CachedToken {
                    value: value.clone(),
                    expires_at,
                });
                debug!("Refreshed Firestore access token");
                Ok(value)
            }
            Err(e) => match slot.as_ref() {
                Some(cached) if cached.usable(Instant::now()) => {
                    warn!("Token refresh failed, reusing current token: {}", e);
                    Ok(cached.value.clone())
                }
                _ => Err(FirestoreError::auth_error(format!(
                    "Failed to obtain auth token: {}",
                    e
                ))),
            },
        }
    }
}
