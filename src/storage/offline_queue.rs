use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::news::{Interaction, InteractionRow};
use crate::remote::RemoteSource;
use crate::storage::traits::{read_json, write_json, KeyValueStore};
use crate::storage::{LAST_SYNC_KEY, QUEUE_KEY};

static ACTION_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    View,
    Interaction,
}

impl ActionKind {
    fn as_str(&self) -> &'static str {
        match self {
            ActionKind::View => "view",
            ActionKind::Interaction => "interaction",
        }
    }
}

/// A tracking call captured while offline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineAction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub data: serde_json::Value,
    /// Epoch milliseconds at capture time
    pub timestamp: i64,
    /// Failed delivery attempts so far
    #[serde(default)]
    pub attempts: u32,
}

impl OfflineAction {
    pub fn view(article_id: &str) -> Self {
        Self::new(ActionKind::View, serde_json::json!({ "article_id": article_id }))
    }

    pub fn interaction(interaction: &Interaction) -> Result<Self> {
        Ok(Self::new(ActionKind::Interaction, serde_json::to_value(interaction)?))
    }

    fn new(kind: ActionKind, data: serde_json::Value) -> Self {
        let timestamp = Utc::now().timestamp_millis();
        let seq = ACTION_SEQ.fetch_add(1, Ordering::Relaxed);

        let mut hasher = blake3::Hasher::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update(&timestamp.to_le_bytes());
        hasher.update(&seq.to_le_bytes());
        hasher.update(data.to_string().as_bytes());
        let digest = hasher.finalize().to_hex();

        Self {
            id: format!("{}-{}", timestamp, &digest[..12]),
            kind,
            data,
            timestamp,
            attempts: 0,
        }
    }

    pub fn article_id(&self) -> Option<&str> {
        self.data.get("article_id").and_then(|v| v.as_str())
    }

    /// Replay the action against the backend
    pub async fn dispatch(&self, remote: &dyn RemoteSource) -> Result<()> {
        match self.kind {
            ActionKind::View => {
                let article_id = self.article_id().ok_or_else(|| {
                    Error::Invalid(format!("View action {} has no article_id", self.id))
                })?;
                remote.increment_view_count(article_id).await
            }
            ActionKind::Interaction => {
                let interaction: Interaction = serde_json::from_value(self.data.clone())
                    .map_err(|e| Error::Invalid(format!(
                        "Interaction action {} is malformed: {}", self.id, e
                    )))?;
                remote.insert_interaction(&InteractionRow::from(&interaction)).await
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Attempts after which a temporarily failing action is given up on
    pub max_attempts: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

/// Outcome of one drain pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub attempted: usize,
    pub delivered: usize,
    pub retained: usize,
    pub dropped: usize,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.retained == 0 && self.dropped == 0
    }
}

/// Durable FIFO of offline actions with at-least-once replay.
///
/// Actions stay in the persisted list while they are being dispatched and
/// are removed only once the backend confirms them. Drains are serialised.
#[derive(Clone)]
pub struct OfflineQueue {
    store: Arc<dyn KeyValueStore>,
    actions: Arc<Mutex<Vec<OfflineAction>>>,
    in_flight: Arc<RwLock<HashSet<String>>>,
    drain_lock: Arc<Mutex<()>>,
    config: QueueConfig,
}

impl OfflineQueue {
    /// Restore the queue persisted by a previous session
    pub async fn load(store: Arc<dyn KeyValueStore>, config: QueueConfig) -> Self {
        let actions = match read_json::<Vec<OfflineAction>>(store.as_ref(), QUEUE_KEY).await {
            Ok(Some(actions)) => {
                if !actions.is_empty() {
                    info!("Restored {} pending offline actions", actions.len());
                }
                actions
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Discarding unreadable offline queue: {}", e);
                Vec::new()
            }
        };

        Self {
            store,
            actions: Arc::new(Mutex::new(actions)),
            in_flight: Arc::new(RwLock::new(HashSet::new())),
            drain_lock: Arc::new(Mutex::new(())),
            config,
        }
    }

    /// Append an action and persist the whole queue. The action is kept in
    /// memory even when persisting fails.
    pub async fn enqueue(&self, action: OfflineAction) -> Result<()> {
        let mut actions = self.actions.lock().await;
        debug!("Queueing offline {} action {}", action.kind.as_str(), action.id);
        actions.push(action);
        self.persist(&actions).await
    }

    /// Dispatch every queued action concurrently and keep only the ones that
    /// failed temporarily and still have attempts left.
    pub async fn drain(&self, remote: &dyn RemoteSource) -> SyncReport {
        let _guard = self.drain_lock.lock().await;

        let batch: Vec<OfflineAction> = self.actions.lock().await.clone();
        let mut report = SyncReport {
            attempted: batch.len(),
            ..Default::default()
        };

        if !batch.is_empty() {
            info!("Syncing {} offline actions", batch.len());
            self.in_flight.write().extend(batch.iter().map(|a| a.id.clone()));

            let results = futures::future::join_all(
                batch.iter().map(|action| action.dispatch(remote))
            ).await;

            let mut delivered = HashSet::new();
            let mut retry = HashSet::new();
            let mut dropped = HashSet::new();

            for (action, result) in batch.iter().zip(results) {
                match result {
                    Ok(()) => {
                        delivered.insert(action.id.as_str());
                    }
                    Err(e) if e.is_temporary() && action.attempts + 1 < self.config.max_attempts => {
                        warn!("Offline action {} failed (attempt {}), keeping it: {}",
                              action.id, action.attempts + 1, e);
                        retry.insert(action.id.as_str());
                    }
                    Err(e) => {
                        warn!("Dropping offline action {} after {} attempts: {}",
                              action.id, action.attempts + 1, e);
                        dropped.insert(action.id.as_str());
                    }
                }
            }

            report.delivered = delivered.len();
            report.retained = retry.len();
            report.dropped = dropped.len();

            let mut actions = self.actions.lock().await;
            actions.retain(|a| !delivered.contains(a.id.as_str()) && !dropped.contains(a.id.as_str()));
            for action in actions.iter_mut() {
                if retry.contains(action.id.as_str()) {
                    action.attempts += 1;
                }
            }

            if let Err(e) = self.persist(&actions).await {
                warn!("Failed to persist offline queue after sync: {}", e);
            }
            drop(actions);

            self.in_flight.write().retain(|id| !batch.iter().any(|a| &a.id == id));
        }

        self.record_sync().await;
        info!("Offline sync finished: {} delivered, {} retained, {} dropped",
              report.delivered, report.retained, report.dropped);
        report
    }

    pub async fn len(&self) -> usize {
        self.actions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.actions.lock().await.is_empty()
    }

    /// Copy of the queued actions in capture order
    pub async fn pending(&self) -> Vec<OfflineAction> {
        self.actions.lock().await.clone()
    }

    /// Number of actions currently being dispatched
    pub fn in_flight(&self) -> usize {
        self.in_flight.read().len()
    }

    /// Time of the last completed drain
    pub async fn last_sync(&self) -> Option<DateTime<Utc>> {
        let raw = match self.store.get(LAST_SYNC_KEY).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Failed to read last sync time: {}", e);
                return None;
            }
        };

        let millis: i64 = raw.trim().parse().ok()?;
        Utc.timestamp_millis_opt(millis).single()
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn persist(&self, actions: &[OfflineAction]) -> Result<()> {
        write_json(self.store.as_ref(), QUEUE_KEY, actions).await
    }

    async fn record_sync(&self) {
        let now = Utc::now().timestamp_millis().to_string();
        if let Err(e) = self.store.set(LAST_SYNC_KEY, now).await {
            warn!("Failed to record last sync time: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::news::{Article, ArticleQuery, InteractionType};
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;

    /// Records dispatches and fails the configured article ids
    #[derive(Default)]
    struct RecordingRemote {
        views: SyncMutex<Vec<String>>,
        interactions: SyncMutex<Vec<InteractionRow>>,
        flaky: SyncMutex<HashSet<String>>,
        rejected: SyncMutex<HashSet<String>>,
    }

    impl RecordingRemote {
        fn check(&self, article_id: &str) -> Result<()> {
            if self.flaky.lock().contains(article_id) {
                return Err(Error::HttpError("503 Service Unavailable".to_string()));
            }
            if self.rejected.lock().contains(article_id) {
                return Err(Error::Rejected("400 Bad Request".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteSource for RecordingRemote {
        async fn fetch_articles(&self, _query: &ArticleQuery) -> Result<Vec<Article>> {
            Ok(Vec::new())
        }

        async fn fetch_article(&self, _id: &str) -> Result<Option<Article>> {
            Ok(None)
        }

        async fn increment_view_count(&self, article_id: &str) -> Result<()> {
            self.check(article_id)?;
            self.views.lock().push(article_id.to_string());
            Ok(())
        }

        async fn insert_interaction(&self, row: &InteractionRow) -> Result<()> {
            self.check(&row.article_id)?;
            self.interactions.lock().push(row.clone());
            Ok(())
        }
    }

    /// Holds every view dispatch until released
    #[derive(Default)]
    struct GatedRemote {
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
        views: SyncMutex<Vec<String>>,
    }

    #[async_trait]
    impl RemoteSource for GatedRemote {
        async fn fetch_articles(&self, _query: &ArticleQuery) -> Result<Vec<Article>> {
            Ok(Vec::new())
        }

        async fn fetch_article(&self, _id: &str) -> Result<Option<Article>> {
            Ok(None)
        }

        async fn increment_view_count(&self, article_id: &str) -> Result<()> {
            self.entered.notify_one();
            self.release.notified().await;
            self.views.lock().push(article_id.to_string());
            Ok(())
        }

        async fn insert_interaction(&self, _row: &InteractionRow) -> Result<()> {
            Ok(())
        }
    }

    async fn empty_queue() -> (OfflineQueue, MemoryStore) {
        let store = MemoryStore::new();
        let queue = OfflineQueue::load(Arc::new(store.clone()), QueueConfig::default()).await;
        (queue, store)
    }

    #[test]
    fn test_action_shapes() {
        let view = OfflineAction::view("a1");
        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["type"], "view");
        assert_eq!(value["data"]["article_id"], "a1");
        assert_eq!(view.attempts, 0);

        let interaction = Interaction::new("a2", InteractionType::Share).with_duration(5);
        let action = OfflineAction::interaction(&interaction).unwrap();
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["type"], "interaction");
        assert_eq!(value["data"]["type"], "share");
        assert_eq!(value["data"]["duration"], 5);
    }

    #[test]
    fn test_action_ids_are_unique() {
        let first = OfflineAction::view("a1");
        let second = OfflineAction::view("a1");
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_enqueue_persists_in_order() {
        let (queue, store) = empty_queue().await;

        queue.enqueue(OfflineAction::view("a1")).await.unwrap();
        queue.enqueue(OfflineAction::view("a1")).await.unwrap();
        queue.enqueue(OfflineAction::view("a2")).await.unwrap();

        let persisted: Vec<OfflineAction> = read_json(&store, QUEUE_KEY).await.unwrap().unwrap();
        let ids: Vec<_> = persisted.iter().filter_map(|a| a.article_id()).collect();
        assert_eq!(ids, vec!["a1", "a1", "a2"]);
        assert_eq!(queue.len().await, 3);
    }

    #[tokio::test]
    async fn test_load_restores_previous_session() {
        let (queue, store) = empty_queue().await;
        queue.enqueue(OfflineAction::view("a1")).await.unwrap();

        let restored = OfflineQueue::load(Arc::new(store), QueueConfig::default()).await;
        assert_eq!(restored.len().await, 1);
        assert_eq!(restored.pending().await[0].article_id(), Some("a1"));
    }

    #[tokio::test]
    async fn test_load_ignores_malformed_queue() {
        let store = MemoryStore::new();
        store.set(QUEUE_KEY, "{\"broken\":".to_string()).await.unwrap();

        let queue = OfflineQueue::load(Arc::new(store), QueueConfig::default()).await;
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_drain_delivers_each_action_once() {
        let (queue, store) = empty_queue().await;
        let remote = RecordingRemote::default();

        queue.enqueue(OfflineAction::view("a1")).await.unwrap();
        queue.enqueue(OfflineAction::view("a1")).await.unwrap();
        let interaction = Interaction::new("a2", InteractionType::Bookmark);
        queue.enqueue(OfflineAction::interaction(&interaction).unwrap()).await.unwrap();

        let report = queue.drain(&remote).await;

        assert_eq!(report, SyncReport { attempted: 3, delivered: 3, retained: 0, dropped: 0 });
        assert_eq!(remote.views.lock().len(), 2);
        assert_eq!(remote.interactions.lock()[0].interaction_type, InteractionType::Bookmark);
        assert!(queue.is_empty().await);
        assert_eq!(queue.in_flight(), 0);

        let persisted: Vec<OfflineAction> = read_json(&store, QUEUE_KEY).await.unwrap().unwrap();
        assert!(persisted.is_empty());
        assert!(queue.last_sync().await.is_some());
    }

    #[tokio::test]
    async fn test_drain_retains_temporary_failures() {
        let (queue, _store) = empty_queue().await;
        let remote = RecordingRemote::default();
        remote.flaky.lock().insert("a2".to_string());

        queue.enqueue(OfflineAction::view("a1")).await.unwrap();
        queue.enqueue(OfflineAction::view("a2")).await.unwrap();

        let report = queue.drain(&remote).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.retained, 1);
        assert!(!report.is_clean());

        let pending = queue.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].article_id(), Some("a2"));
        assert_eq!(pending[0].attempts, 1);

        // Backend recovers
        remote.flaky.lock().clear();
        let report = queue.drain(&remote).await;
        assert_eq!(report.delivered, 1);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_drain_gives_up_after_max_attempts() {
        let store = MemoryStore::new();
        let queue = OfflineQueue::load(Arc::new(store), QueueConfig { max_attempts: 2 }).await;
        let remote = RecordingRemote::default();
        remote.flaky.lock().insert("a1".to_string());

        queue.enqueue(OfflineAction::view("a1")).await.unwrap();

        let first = queue.drain(&remote).await;
        assert_eq!(first.retained, 1);

        let second = queue.drain(&remote).await;
        assert_eq!(second.dropped, 1);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_drain_drops_rejected_actions() {
        let (queue, _store) = empty_queue().await;
        let remote = RecordingRemote::default();
        remote.rejected.lock().insert("a1".to_string());

        queue.enqueue(OfflineAction::view("a1")).await.unwrap();

        let report = queue.drain(&remote).await;
        assert_eq!(report.dropped, 1);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_drain_drops_malformed_actions() {
        let (queue, _store) = empty_queue().await;
        let remote = RecordingRemote::default();

        let mut action = OfflineAction::view("a1");
        action.data = serde_json::json!({ "unexpected": true });
        queue.enqueue(action).await.unwrap();

        let report = queue.drain(&remote).await;
        assert_eq!(report.dropped, 1);
        assert!(remote.views.lock().is_empty());
    }

    #[tokio::test]
    async fn test_empty_drain_records_sync() {
        let (queue, _store) = empty_queue().await;
        let remote = RecordingRemote::default();

        assert!(queue.last_sync().await.is_none());
        let report = queue.drain(&remote).await;
        assert_eq!(report, SyncReport::default());
        assert!(queue.last_sync().await.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_drains_do_not_double_dispatch() {
        let (queue, _store) = empty_queue().await;
        let remote = RecordingRemote::default();

        for i in 0..10 {
            queue.enqueue(OfflineAction::view(&format!("a{}", i))).await.unwrap();
        }

        let (first, second) = tokio::join!(queue.drain(&remote), queue.drain(&remote));

        assert_eq!(first.delivered + second.delivered, 10);
        assert_eq!(remote.views.lock().len(), 10);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_enqueue_during_drain_survives() {
        let (queue, store) = empty_queue().await;
        let remote = GatedRemote::default();

        queue.enqueue(OfflineAction::view("a1")).await.unwrap();

        let (report, late_id) = tokio::join!(queue.drain(&remote), async {
            remote.entered.notified().await;
            assert_eq!(queue.in_flight(), 1);

            let late = OfflineAction::view("a2");
            let id = late.id.clone();
            queue.enqueue(late).await.unwrap();

            remote.release.notify_one();
            id
        });

        assert_eq!(report, SyncReport { attempted: 1, delivered: 1, retained: 0, dropped: 0 });
        assert_eq!(*remote.views.lock(), vec!["a1".to_string()]);

        let pending = queue.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, late_id);
        assert_eq!(pending[0].attempts, 0);

        let persisted: Vec<OfflineAction> = read_json(&store, QUEUE_KEY).await.unwrap().unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].id, late_id);
        assert_eq!(persisted[0].attempts, 0);
        assert_eq!(queue.in_flight(), 0);
    }
}
