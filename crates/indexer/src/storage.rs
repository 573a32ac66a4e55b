//! Key-value storage boundary.
//!
//! The engine never talks to a database directly: metadata and snapshot records go
//! through [`KvStore`], and every multi-key change is a [`WriteBatch`] applied
//! atomically.

use crate::{IndexerError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tokio::sync::Mutex as TokioMutex;

const FS_STORE_FILE_NAME: &str = "store.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
    /// Delete `key` only if its current value is exactly `expected`.
    DeleteIfEquals { key: String, expected: Vec<u8> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) -> &mut Self {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value,
        });
        self
    }

    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        self.ops.push(BatchOp::Delete { key: key.into() });
        self
    }

    pub fn delete_if_equals(&mut self, key: impl Into<String>, expected: Vec<u8>) -> &mut Self {
        self.ops.push(BatchOp::DeleteIfEquals {
            key: key.into(),
            expected,
        });
        self
    }

    #[must_use]
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// All entries whose key starts with `prefix`, in key order.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;

    /// Apply every operation of `batch` or none of them.
    async fn write(&self, batch: WriteBatch) -> Result<()>;
}

fn apply_ops(map: &mut BTreeMap<String, Vec<u8>>, ops: Vec<BatchOp>) {
    for op in ops {
        match op {
            BatchOp::Put { key, value } => {
                map.insert(key, value);
            }
            BatchOp::Delete { key } => {
                map.remove(&key);
            }
            BatchOp::DeleteIfEquals { key, expected } => {
                if map.get(&key) == Some(&expected) {
                    map.remove(&key);
                }
            }
        }
    }
}

fn scan(map: &BTreeMap<String, Vec<u8>>, prefix: &str) -> Vec<(String, Vec<u8>)> {
    map.range(prefix.to_string()..)
        .take_while(|(key, _)| key.starts_with(prefix))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn poisoned<E>(_: E) -> IndexerError {
    IndexerError::Storage("store lock poisoned".to_string())
}

/// Process-local store. Can be switched read-only to exercise failing persists.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
    read_only: AtomicBool,
}

impl MemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.data.read().map(|data| data.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().map_err(poisoned)?.get(key).cloned())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let data = self.data.read().map_err(poisoned)?;
        Ok(scan(&data, prefix))
    }

    async fn write(&self, batch: WriteBatch) -> Result<()> {
        if self.read_only.load(Ordering::Acquire) {
            return Err(IndexerError::Storage("store is read-only".to_string()));
        }
        let mut data = self.data.write().map_err(poisoned)?;
        apply_ops(&mut data, batch.ops);
        Ok(())
    }
}

/// Single-file store for the CLI and small hosts.
///
/// The whole map lives in memory; each batch rewrites the data file through a temp
/// file and a rename, so a crash leaves either the old or the new state on disk.
pub struct FsKvStore {
    path: PathBuf,
    data: TokioMutex<BTreeMap<String, Vec<u8>>>,
}

impl FsKvStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(FS_STORE_FILE_NAME);

        let data = if path.exists() {
            let bytes = tokio::fs::read(&path).await?;
            serde_json::from_slice(&bytes).map_err(|e| {
                IndexerError::Storage(format!("failed to parse {}: {e}", path.display()))
            })?
        } else {
            BTreeMap::new()
        };
        log::debug!("Opened store {} ({} keys)", path.display(), data.len());

        Ok(Self {
            path,
            data: TokioMutex::new(data),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl KvStore for FsKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.lock().await.get(key).cloned())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(scan(&*self.data.lock().await, prefix))
    }

    async fn write(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut data = self.data.lock().await;
        let mut next = data.clone();
        apply_ops(&mut next, batch.ops);

        let bytes = serde_json::to_vec(&next)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        *data = next;
        Ok(())
    }
}
