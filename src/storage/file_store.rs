use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::storage::traits::KeyValueStore;

static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Disk-backed key-value store: one JSON file per key inside a data directory
#[derive(Debug, Clone)]
pub struct FileStore {
    data_dir: PathBuf,
}

impl FileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();

        // Ensure data directory exists
        if !data_dir.exists() {
            fs::create_dir_all(&data_dir)
                .map_err(|e| Error::Storage(format!(
                    "Failed to create data directory '{}': {}",
                    data_dir.display(), e
                )))?;
        }

        Ok(Self { data_dir })
    }

    /// File backing `key`. Keys such as `@news_cache_articles` are reduced to
    /// filesystem-safe names.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .trim_start_matches('@')
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();

        self.data_dir.join(format!("{}.json", name))
    }

    /// Per-write temporary file next to `path`, so overlapping writes to one
    /// key never share a temp file
    fn temp_path_for(path: &Path) -> PathBuf {
        let seq = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        path.with_extension(format!("{}-{}.tmp", std::process::id(), seq))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Remove temporary files left behind by interrupted writes
    pub fn cleanup(&self) -> Result<usize> {
        let mut removed = 0;

        if let Ok(entries) = fs::read_dir(&self.data_dir) {
            for entry in entries.flatten() {
                if let Some(name) = entry.file_name().to_str() {
                    if name.ends_with(".tmp") && fs::remove_file(entry.path()).is_ok() {
                        removed += 1;
                    }
                }
            }
        }

        Ok(removed)
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No stored value for {} at {}", key, path.display());
                Ok(None)
            }
            Err(e) => Err(Error::Storage(format!(
                "Failed to read '{}': {}", path.display(), e
            ))),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let path = self.path_for(key);

        // Write to temporary file first, then rename (atomic operation)
        let temp_file = Self::temp_path_for(&path);
        if let Err(e) = tokio::fs::write(&temp_file, value).await {
            let _ = tokio::fs::remove_file(&temp_file).await;
            return Err(Error::Storage(format!(
                "Failed to write '{}': {}", temp_file.display(), e
            )));
        }

        if let Err(e) = tokio::fs::rename(&temp_file, &path).await {
            let _ = tokio::fs::remove_file(&temp_file).await;
            return Err(Error::Storage(format!(
                "Failed to rename '{}' to '{}': {}",
                temp_file.display(), path.display(), e
            )));
        }

        tracing::trace!("Stored {} at {}", key, path.display());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!(
                "Failed to remove '{}': {}", path.display(), e
            ))),
        }
    }
}
