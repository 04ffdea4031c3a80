use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::news::Article;
use crate::storage::traits::{read_json, write_json, KeyValueStore};
use crate::storage::CACHE_KEY;

/// Timestamped snapshot of the last successful article fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    /// Epoch milliseconds at write time
    pub timestamp: i64,
    pub articles: Vec<Article>,
}

impl CacheSnapshot {
    pub fn new(articles: Vec<Article>) -> Self {
        Self {
            timestamp: Utc::now().timestamp_millis(),
            articles,
        }
    }

    /// Milliseconds since the write; `None` if the stored timestamp is
    /// out of range
    fn elapsed_millis(&self) -> Option<i64> {
        Utc::now().timestamp_millis().checked_sub(self.timestamp)
    }

    pub fn age(&self) -> Duration {
        match self.elapsed_millis() {
            Some(elapsed) => Duration::from_millis(elapsed.max(0) as u64),
            None => Duration::MAX,
        }
    }

    /// A snapshot is usable only while strictly younger than `max_age`
    pub fn is_valid(&self, max_age: Duration) -> bool {
        self.elapsed_millis()
            .map_or(false, |elapsed| (elapsed as i128) < max_age.as_millis() as i128)
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub writes: u64,
    pub write_failures: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Configuration for cache behavior
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_age: Duration,
    pub max_articles: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(24 * 60 * 60),
            max_articles: 100,
        }
    }
}

/// Cache-aside store for the article listing.
///
/// Writes are best-effort and reads degrade to an empty list: nothing in
/// here ever reports an error to the caller.
#[derive(Clone)]
pub struct ArticleCache {
    store: Arc<dyn KeyValueStore>,
    stats: Arc<RwLock<CacheStats>>,
    config: CacheConfig,
}

impl ArticleCache {
    pub fn new(store: Arc<dyn KeyValueStore>, config: CacheConfig) -> Self {
        Self {
            store,
            stats: Arc::new(RwLock::new(CacheStats::default())),
            config,
        }
    }

    /// Replace the cached snapshot with (at most `max_articles` of) `articles`
    pub async fn write(&self, articles: &[Article]) {
        let kept = articles.len().min(self.config.max_articles);
        let snapshot = CacheSnapshot::new(articles[..kept].to_vec());

        match write_json(self.store.as_ref(), CACHE_KEY, &snapshot).await {
            Ok(()) => {
                self.stats.write().writes += 1;
                tracing::debug!("Cached {} articles", kept);
            }
            Err(e) => {
                self.stats.write().write_failures += 1;
                tracing::warn!("Failed to cache articles: {}", e);
            }
        }
    }

    /// Cached articles, or an empty list when the snapshot is missing,
    /// unreadable or stale
    pub async fn read(&self) -> Vec<Article> {
        self.snapshot()
            .await
            .map(|snapshot| snapshot.articles)
            .unwrap_or_default()
    }

    /// The stored snapshot if it is still valid
    pub async fn snapshot(&self) -> Option<CacheSnapshot> {
        let snapshot = match read_json::<CacheSnapshot>(self.store.as_ref(), CACHE_KEY).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                self.stats.write().misses += 1;
                return None;
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable article cache: {}", e);
                self.stats.write().misses += 1;
                return None;
            }
        };

        if !snapshot.is_valid(self.config.max_age) {
            tracing::debug!("Article cache is stale ({}s old)", snapshot.age().as_secs());
            let mut stats = self.stats.write();
            stats.expirations += 1;
            stats.misses += 1;
            return None;
        }

        self.stats.write().hits += 1;
        Some(snapshot)
    }

    pub async fn clear(&self) {
        if let Err(e) = self.store.remove(CACHE_KEY).await {
            tracing::warn!("Failed to clear article cache: {}", e);
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}
