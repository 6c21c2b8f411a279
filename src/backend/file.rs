//! Durable store backed by a single JSON snapshot file.

use super::{DurableStore, StoredRecord};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Snapshot layout version written into every file.
const SNAPSHOT_VERSION: u32 = 1;

/// Environment variable overriding [`FileStoreConfig::path`].
pub const ENV_SNAPSHOT_PATH: &str = "COALESCE_SNAPSHOT_PATH";

/// Configuration for [`FileStore`].
#[derive(Clone, Debug)]
pub struct FileStoreConfig {
    pub path: PathBuf,
    /// Pretty-print the snapshot, useful when inspecting it by hand.
    pub pretty: bool,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        FileStoreConfig {
            path: PathBuf::from("coalesce-cache.json"),
            pretty: false,
        }
    }
}

impl FileStoreConfig {
    /// Default configuration with the path taken from `COALESCE_SNAPSHOT_PATH`
    /// when it is set.
    pub fn from_env() -> Self {
        let mut config = FileStoreConfig::default();
        if let Ok(path) = std::env::var(ENV_SNAPSHOT_PATH) {
            config.path = PathBuf::from(path);
        }
        config
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    records: Vec<StoredRecord>,
}

/// Every operation rewrites the whole snapshot.
///
/// Writes go to a sibling temporary file that is then renamed over the
/// snapshot, so a crash never leaves a half-written file behind. A missing
/// file reads as empty.
///
/// # Example
///
/// ```no_run
/// # use coalesce_kit::backend::{DurableStore, FileStore, FileStoreConfig};
/// # use coalesce_kit::error::Result;
/// # async fn example() -> Result<()> {
/// let store = FileStore::new(FileStoreConfig {
///     path: "/var/cache/storefront/blog.json".into(),
///     ..Default::default()
/// });
/// let records = store.load().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FileStore {
    config: FileStoreConfig,
    // serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(config: FileStoreConfig) -> Self {
        info!("✓ File store initialized at {}", config.path.display());
        FileStore {
            config,
            lock: Mutex::new(()),
        }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self::new(FileStoreConfig {
            path: path.into(),
            ..Default::default()
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    async fn read(&self) -> Result<BTreeMap<String, StoredRecord>> {
        let bytes = match tokio::fs::read(&self.config.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(Error::BackendError(format!(
                    "Failed to read snapshot {}: {}",
                    self.config.path.display(),
                    e
                )))
            }
        };

        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                found: snapshot.version,
            });
        }

        Ok(snapshot
            .records
            .into_iter()
            .map(|record| (record.key.clone(), record))
            .collect())
    }

    async fn write(&self, records: BTreeMap<String, StoredRecord>) -> Result<()> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            records: records.into_values().collect(),
        };
        let bytes = if self.config.pretty {
            serde_json::to_vec_pretty(&snapshot)
        } else {
            serde_json::to_vec(&snapshot)
        }
        .map_err(|e| Error::SerializationError(e.to_string()))?;

        if let Some(parent) = self.config.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = temp_path(&self.config.path);
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.config.path).await?;
        debug!(
            "✓ File snapshot written: {} records, {} bytes",
            snapshot.records.len(),
            bytes.len()
        );
        Ok(())
    }

    async fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, StoredRecord>) + Send,
    {
        let _guard = self.lock.lock().await;
        // an unreadable snapshot must not block every later write
        let mut records = match self.read().await {
            Ok(records) => records,
            Err(e) => {
                warn!(
                    "✗ Discarding unreadable snapshot {}: {}",
                    self.config.path.display(),
                    e
                );
                BTreeMap::new()
            }
        };
        change(&mut records);
        self.write(records).await
    }
}

/// Sibling temporary file: the full file name plus `.tmp`.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

impl DurableStore for FileStore {
    async fn load(&self) -> Result<Vec<StoredRecord>> {
        let _guard = self.lock.lock().await;
        let records: Vec<StoredRecord> = self.read().await?.into_values().collect();
        debug!(
            "✓ File LOAD {} -> {} records",
            self.config.path.display(),
            records.len()
        );
        Ok(records)
    }

    async fn save(&self, record: StoredRecord) -> Result<()> {
        debug!("✓ File SAVE {}", record.key);
        self.update(move |records| {
            records.insert(record.key.clone(), record);
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        debug!("✓ File REMOVE {}", key);
        self.update(|records| {
            records.remove(key);
        })
        .await
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<()> {
        debug!("✓ File REMOVE prefix {:?}", prefix);
        self.update(|records| records.retain(|key, _| !key.starts_with(prefix)))
            .await
    }
}
