//! Expiring cache for time-limited values such as presigned URLs.
//!
//! Entries are served only while `now + safety_margin < expires_at`, so a
//! caller never receives a value that is about to lapse. Inserting purges
//! expired entries; when the cache is still full, the entry closest to
//! expiry is evicted.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

/// A cached value with its provider-reported expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<V> {
    pub value: V,
    pub expires_at: DateTime<Utc>,
}

/// Thread-safe key → (value, expiry) cache with bounded size.
pub struct ExpiringCache<K, V> {
    entries: Mutex<HashMap<K, Cached<V>>>,
    safety_margin: chrono::Duration,
    max_entries: usize,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// `max_entries` of zero is treated as one.
    pub fn new(safety_margin: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            safety_margin: chrono::Duration::from_std(safety_margin)
                .unwrap_or_else(|_| chrono::Duration::zero()),
            max_entries: max_entries.max(1),
        }
    }

    fn servable(&self, entry: &Cached<V>, now: DateTime<Utc>) -> bool {
        now + self.safety_margin < entry.expires_at
    }

    pub async fn get(&self, key: &K) -> Option<Cached<V>> {
        self.get_at(key, Utc::now()).await
    }

    /// Look up `key` as of `now`; a lapsing entry is removed.
    pub async fn get_at(&self, key: &K, now: DateTime<Utc>) -> Option<Cached<V>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if self.servable(entry, now) => Some(entry.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub async fn insert(&self, key: K, value: V, expires_at: DateTime<Utc>) {
        self.insert_at(key, value, expires_at, Utc::now()).await
    }

    pub async fn insert_at(&self, key: K, value: V, expires_at: DateTime<Utc>, now: DateTime<Utc>) {
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| self.servable(entry, now));

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let soonest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(k, _)| k.clone());
            if let Some(victim) = soonest {
                entries.remove(&victim);
            }
        }

        entries.insert(key, Cached { value, expires_at });
    }

    /// Drop `key`; returns whether it was present.
    pub async fn invalidate(&self, key: &K) -> bool {
        self.entries.lock().await.remove(key).is_some()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
