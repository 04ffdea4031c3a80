use std::sync::Arc;
use std::time::{Duration, Instant};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::monitoring::{Monitor, MonitorConfig};
use crate::network::ConnectivityProbe;
use crate::news::{Article, ArticleQuery, Interaction, InteractionRow};
use crate::remote::RemoteSource;
use crate::storage::{
    ArticleCache, CacheConfig, KeyValueStore, OfflineAction, OfflineQueue, QueueConfig, SyncReport,
};

/// Result of an article listing
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    /// Straight from the backend
    Fresh(Vec<Article>),
    /// Served from the local snapshot because the backend was unavailable
    Cached(Vec<Article>),
    /// Neither source had anything
    Empty,
}

impl Fetched {
    fn from_cache(articles: Vec<Article>) -> Self {
        if articles.is_empty() {
            Fetched::Empty
        } else {
            Fetched::Cached(articles)
        }
    }

    pub fn articles(&self) -> &[Article] {
        match self {
            Fetched::Fresh(articles) | Fetched::Cached(articles) => articles,
            Fetched::Empty => &[],
        }
    }

    pub fn into_articles(self) -> Vec<Article> {
        match self {
            Fetched::Fresh(articles) | Fetched::Cached(articles) => articles,
            Fetched::Empty => Vec::new(),
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Fetched::Fresh(_))
    }

    pub fn is_degraded(&self) -> bool {
        !self.is_fresh()
    }
}

/// What happened to a tracking call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tracked {
    /// Delivered to the backend
    Sent,
    /// Stored in the offline queue for later replay
    Queued,
    /// Lost; the error has been logged
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Offline,
    Synced(SyncReport),
}

#[derive(Debug, Clone)]
pub struct ServiceStatus {
    pub online: bool,
    pub cached_articles: usize,
    pub cache_age: Option<Duration>,
    pub pending_actions: usize,
    pub last_sync: Option<DateTime<Utc>>,
    pub monitor_backlog: usize,
}

#[derive(Debug, Clone, Default)]
pub struct NewsServiceConfig {
    pub cache: CacheConfig,
    pub queue: QueueConfig,
    pub monitor: MonitorConfig,
}

/// Offline-aware entry point for article reads and tracking.
///
/// Every call checks connectivity first and then either talks to the
/// backend or falls back to local state. No method returns an error: the
/// outcome types say how the call was served.
pub struct NewsService {
    remote: Arc<dyn RemoteSource>,
    probe: Arc<dyn ConnectivityProbe>,
    cache: ArticleCache,
    queue: OfflineQueue,
    monitor: Monitor,
}

impl NewsService {
    pub async fn new(
        remote: Arc<dyn RemoteSource>,
        probe: Arc<dyn ConnectivityProbe>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self::with_config(remote, probe, store, NewsServiceConfig::default()).await
    }

    pub async fn with_config(
        remote: Arc<dyn RemoteSource>,
        probe: Arc<dyn ConnectivityProbe>,
        store: Arc<dyn KeyValueStore>,
        config: NewsServiceConfig,
    ) -> Self {
        let cache = ArticleCache::new(Arc::clone(&store), config.cache);
        let queue = OfflineQueue::load(store, config.queue).await;

        Self {
            remote,
            probe,
            cache,
            queue,
            monitor: Monitor::new(config.monitor),
        }
    }

    /// Published articles, newest first. Filters apply to backend queries
    /// only; cached snapshots are returned unfiltered.
    pub async fn get_articles(&self, query: &ArticleQuery) -> Fetched {
        if !self.probe.is_online().await {
            debug!("Offline, serving articles from cache");
            return Fetched::from_cache(self.cache.read().await);
        }

        let start = Instant::now();
        match self.remote.fetch_articles(query).await {
            Ok(articles) => {
                self.monitor.record_metric(
                    "get_articles.latency_ms",
                    start.elapsed().as_millis() as f64,
                );
                self.cache.write(&articles).await;
                Fetched::Fresh(articles)
            }
            Err(e) => {
                warn!("Failed to fetch articles, falling back to cache: {}", e);
                self.monitor.record_error("get_articles", &e);
                Fetched::from_cache(self.cache.read().await)
            }
        }
    }

    /// Single article by id; `None` when offline, missing, or on error
    pub async fn get_article_by_id(&self, id: &str) -> Option<Article> {
        if !self.probe.is_online().await {
            debug!("Offline, skipping lookup of article {}", id);
            return None;
        }

        match self.remote.fetch_article(id).await {
            Ok(article) => {
                if article.is_none() {
                    debug!("Article {} not found", id);
                }
                article
            }
            Err(e) => {
                warn!("Failed to fetch article {}: {}", id, e);
                self.monitor.record_error("get_article_by_id", &e);
                None
            }
        }
    }

    pub async fn track_view(&self, article_id: &str) -> Tracked {
        if !self.probe.is_online().await {
            return self.enqueue(OfflineAction::view(article_id)).await;
        }

        match self.remote.increment_view_count(article_id).await {
            Ok(()) => Tracked::Sent,
            Err(e) => {
                warn!("Failed to track view of {}: {}", article_id, e);
                self.monitor.record_error("track_view", &e);
                Tracked::Failed
            }
        }
    }

    pub async fn track_interaction(&self, interaction: Interaction) -> Tracked {
        if !self.probe.is_online().await {
            return match OfflineAction::interaction(&interaction) {
                Ok(action) => self.enqueue(action).await,
                Err(e) => {
                    warn!("Failed to queue interaction on {}: {}", interaction.article_id, e);
                    Tracked::Failed
                }
            };
        }

        let row = InteractionRow::from(&interaction);
        match self.remote.insert_interaction(&row).await {
            Ok(()) => Tracked::Sent,
            Err(e) => {
                warn!("Failed to track interaction on {}: {}", interaction.article_id, e);
                self.monitor.record_error("track_interaction", &e);
                Tracked::Failed
            }
        }
    }

    /// Replay queued offline actions if the backend is reachable
    pub async fn sync_offline_actions(&self) -> SyncOutcome {
        if !self.probe.is_online().await {
            let pending = self.queue.len().await;
            debug!("Offline, postponing sync of {} actions", pending);
            return SyncOutcome::Offline;
        }

        let report = self.queue.drain(self.remote.as_ref()).await;
        self.monitor.record_metric("sync.delivered", report.delivered as f64);
        if report.dropped > 0 {
            self.monitor.record_metric("sync.dropped", report.dropped as f64);
        }
        SyncOutcome::Synced(report)
    }

    pub async fn status(&self) -> ServiceStatus {
        let snapshot = self.cache.snapshot().await;

        ServiceStatus {
            online: self.probe.is_online().await,
            cached_articles: snapshot.as_ref().map(|s| s.articles.len()).unwrap_or(0),
            cache_age: snapshot.as_ref().map(|s| s.age()),
            pending_actions: self.queue.len().await,
            last_sync: self.queue.last_sync().await,
            monitor_backlog: self.monitor.len(),
        }
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        info!("Article cache cleared");
    }

    pub fn cache(&self) -> &ArticleCache {
        &self.cache
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    async fn enqueue(&self, action: OfflineAction) -> Tracked {
        let id = action.id.clone();
        match self.queue.enqueue(action).await {
            Ok(()) => Tracked::Queued,
            Err(e) => {
                // Still held in memory; it will be persisted with the next write
                warn!("Offline action {} not persisted: {}", id, e);
                self.monitor.record_error("offline_queue", &e);
                Tracked::Queued
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::network::StaticProbe;
    use crate::news::InteractionType;
    use crate::storage::{write_json, CacheSnapshot, MemoryStore, CACHE_KEY};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// In-memory backend that counts every call
    #[derive(Default)]
    struct FakeRemote {
        articles: Mutex<Vec<Article>>,
        failing: AtomicBool,
        calls: AtomicUsize,
        views: Mutex<Vec<String>>,
        interactions: Mutex<Vec<InteractionRow>>,
        queries: Mutex<Vec<ArticleQuery>>,
    }

    impl FakeRemote {
        fn with_articles(articles: Vec<Article>) -> Self {
            let remote = Self::default();
            *remote.articles.lock() = articles;
            remote
        }

        fn enter(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                Err(Error::HttpError("connection reset".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl RemoteSource for FakeRemote {
        async fn fetch_articles(&self, query: &ArticleQuery) -> Result<Vec<Article>> {
            self.enter()?;
            self.queries.lock().push(query.clone());
            Ok(self.articles.lock().clone())
        }

        async fn fetch_article(&self, id: &str) -> Result<Option<Article>> {
            self.enter()?;
            Ok(self.articles.lock().iter().find(|a| a.id == id).cloned())
        }

        async fn increment_view_count(&self, article_id: &str) -> Result<()> {
            self.enter()?;
            self.views.lock().push(article_id.to_string());
            Ok(())
        }

        async fn insert_interaction(&self, row: &InteractionRow) -> Result<()> {
            self.enter()?;
            self.interactions.lock().push(row.clone());
            Ok(())
        }
    }

    fn sample_articles() -> Vec<Article> {
        let mut first = Article::new("a1", "Exam schedule released");
        first.category_id = Some("exams".to_string());
        let mut second = Article::new("a2", "New campus opens");
        second.category_id = Some("campus".to_string());
        vec![first, second]
    }

    struct Harness {
        service: NewsService,
        remote: Arc<FakeRemote>,
        probe: Arc<StaticProbe>,
        store: MemoryStore,
    }

    async fn harness(online: bool, articles: Vec<Article>) -> Harness {
        let remote = Arc::new(FakeRemote::with_articles(articles));
        let probe = Arc::new(StaticProbe::new(online));
        let store = MemoryStore::new();
        let service = NewsService::new(
            remote.clone(),
            probe.clone(),
            Arc::new(store.clone()),
        )
        .await;

        Harness { service, remote, probe, store }
    }

    #[tokio::test]
    async fn test_online_fetch_writes_through() {
        let h = harness(true, sample_articles()).await;

        let fetched = h.service.get_articles(&ArticleQuery::new()).await;
        assert!(fetched.is_fresh());
        assert_eq!(fetched.articles().len(), 2);

        // Now offline: served from the snapshot just written
        h.probe.set_online(false);
        let cached = h.service.get_articles(&ArticleQuery::new()).await;
        assert_eq!(cached, Fetched::Cached(sample_articles()));
    }

    #[tokio::test]
    async fn test_offline_ignores_filters() {
        let h = harness(false, Vec::new()).await;
        let snapshot = CacheSnapshot::new(sample_articles());
        write_json(&h.store, CACHE_KEY, &snapshot).await.unwrap();

        let query = ArticleQuery::new().with_category("exams");
        let fetched = h.service.get_articles(&query).await;

        assert_eq!(fetched.articles().len(), 2);
        assert!(fetched.is_degraded());
        assert_eq!(h.remote.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_remote_failure_falls_back_to_cache() {
        let h = harness(true, sample_articles()).await;
        h.service.get_articles(&ArticleQuery::new()).await;

        h.remote.failing.store(true, Ordering::SeqCst);
        let fetched = h.service.get_articles(&ArticleQuery::new()).await;

        assert_eq!(fetched, Fetched::Cached(sample_articles()));
        assert_eq!(h.service.monitor().events()[1].name, "get_articles");
    }

    #[tokio::test]
    async fn test_remote_failure_without_cache_is_empty() {
        let h = harness(true, sample_articles()).await;
        h.remote.failing.store(true, Ordering::SeqCst);

        let fetched = h.service.get_articles(&ArticleQuery::new()).await;
        assert_eq!(fetched, Fetched::Empty);
        assert!(fetched.into_articles().is_empty());
    }

    #[tokio::test]
    async fn test_query_forwarded_to_remote() {
        let h = harness(true, sample_articles()).await;
        let query = ArticleQuery::new().with_category("exams").with_search("schedule").with_limit(5);

        h.service.get_articles(&query).await;
        assert_eq!(h.remote.queries.lock()[0], query);
    }

    #[tokio::test]
    async fn test_get_article_by_id() {
        let h = harness(true, sample_articles()).await;

        assert_eq!(h.service.get_article_by_id("a2").await.unwrap().title, "New campus opens");
        assert!(h.service.get_article_by_id("missing-id").await.is_none());

        h.remote.failing.store(true, Ordering::SeqCst);
        assert!(h.service.get_article_by_id("a1").await.is_none());

        h.probe.set_online(false);
        let calls = h.remote.calls.load(Ordering::SeqCst);
        assert!(h.service.get_article_by_id("a1").await.is_none());
        assert_eq!(h.remote.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_track_view_online_and_offline() {
        let h = harness(true, Vec::new()).await;

        assert_eq!(h.service.track_view("a1").await, Tracked::Sent);
        assert_eq!(*h.remote.views.lock(), vec!["a1".to_string()]);

        h.probe.set_online(false);
        let calls = h.remote.calls.load(Ordering::SeqCst);
        assert_eq!(h.service.track_view("a1").await, Tracked::Queued);
        assert_eq!(h.service.track_view("a1").await, Tracked::Queued);

        assert_eq!(h.remote.calls.load(Ordering::SeqCst), calls);
        assert_eq!(h.service.queue().len().await, 2);
    }

    #[tokio::test]
    async fn test_track_view_failure_is_reported() {
        let h = harness(true, Vec::new()).await;
        h.remote.failing.store(true, Ordering::SeqCst);

        assert_eq!(h.service.track_view("a1").await, Tracked::Failed);
        assert!(h.service.queue().is_empty().await);
    }

    #[tokio::test]
    async fn test_track_interaction_online_and_offline() {
        let h = harness(true, Vec::new()).await;
        let interaction = Interaction::new("a1", InteractionType::Share).with_duration(30);

        assert_eq!(h.service.track_interaction(interaction.clone()).await, Tracked::Sent);
        let rows = h.remote.interactions.lock().clone();
        assert_eq!(rows[0].interaction_type, InteractionType::Share);
        assert_eq!(rows[0].duration, Some(30));

        h.probe.set_online(false);
        assert_eq!(h.service.track_interaction(interaction).await, Tracked::Queued);

        let pending = h.service.queue().pending().await;
        assert_eq!(pending[0].data["type"], "share");
        assert_eq!(pending[0].data["duration"], 30);
    }

    #[tokio::test]
    async fn test_sync_offline_actions() {
        let h = harness(false, Vec::new()).await;

        h.service.track_view("a1").await;
        h.service.track_view("a2").await;
        h.service
            .track_interaction(Interaction::new("a1", InteractionType::Bookmark))
            .await;

        assert_eq!(h.service.sync_offline_actions().await, SyncOutcome::Offline);
        assert_eq!(h.service.queue().len().await, 3);

        h.probe.set_online(true);
        let outcome = h.service.sync_offline_actions().await;

        assert_eq!(
            outcome,
            SyncOutcome::Synced(SyncReport { attempted: 3, delivered: 3, retained: 0, dropped: 0 })
        );
        assert_eq!(h.remote.calls.load(Ordering::SeqCst), 3);
        assert!(h.service.queue().is_empty().await);
    }

    #[tokio::test]
    async fn test_status() {
        let h = harness(true, sample_articles()).await;
        h.service.get_articles(&ArticleQuery::new()).await;
        h.probe.set_online(false);
        h.service.track_view("a1").await;

        let status = h.service.status().await;
        assert!(!status.online);
        assert_eq!(status.cached_articles, 2);
        assert!(status.cache_age.is_some());
        assert_eq!(status.pending_actions, 1);
        assert!(status.last_sync.is_none());

        h.service.clear_cache().await;
        assert_eq!(h.service.status().await.cached_articles, 0);
    }
}
