pub mod cache;
pub mod file_store;
pub mod offline_queue;
pub mod traits;

pub use cache::{ArticleCache, CacheConfig, CacheSnapshot, CacheStats};
pub use file_store::FileStore;
pub use offline_queue::{ActionKind, OfflineAction, OfflineQueue, QueueConfig, SyncReport};
pub use traits::{read_json, write_json, KeyValueStore, MemoryStore};

/// Snapshot of the last successful article fetch
pub const CACHE_KEY: &str = "@news_cache_articles";

/// Pending offline actions
pub const QUEUE_KEY: &str = "@news_offline_queue";

/// Stringified epoch millis of the last completed sync
pub const LAST_SYNC_KEY: &str = "@news_last_sync";
