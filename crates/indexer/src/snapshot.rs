//! Durable index snapshots.
//!
//! Each index is stored under `index-snapshot/{identifier}` as one record:
//!
//! ```text
//! ┌──────────────────┬──────────────────────────────┬───────────────────┐
//! │ u32 LE: n        │ header (n bytes, JSON)       │ payload (rest)    │
//! │                  │ {"kind": {...}, "version": 1}│ kind-specific     │
//! └──────────────────┴──────────────────────────────┴───────────────────┘
//! ```
//!
//! The header is enough to learn an index's kind, so the whole store can be surveyed
//! without deserializing a single payload.

use crate::index::Index;
use crate::registry::IndexRegistry;
use crate::storage::{KvStore, WriteBatch};
use crate::{IndexerError, Result};
use docindex_protocol::IndexKind;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;
pub const SNAPSHOT_PREFIX: &str = "index-snapshot/";

const LENGTH_BYTES: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub kind: IndexKind,
    pub version: u32,
}

/// Header with the kind left undecoded, so unknown kinds can be reported by name.
#[derive(Deserialize)]
struct RawHeader {
    kind: Value,
    version: u32,
}

fn record_key(identifier: &str) -> String {
    format!("{SNAPSHOT_PREFIX}{identifier}")
}

pub fn encode_record(kind: &IndexKind, payload: &[u8]) -> Result<Vec<u8>> {
    let header = serde_json::to_vec(&SnapshotHeader {
        kind: kind.clone(),
        version: SNAPSHOT_FORMAT_VERSION,
    })?;
    let length = u32::try_from(header.len())
        .map_err(|_| IndexerError::Other("snapshot header too large".to_string()))?;

    let mut record = Vec::with_capacity(LENGTH_BYTES + header.len() + payload.len());
    record.extend_from_slice(&length.to_le_bytes());
    record.extend_from_slice(&header);
    record.extend_from_slice(payload);
    Ok(record)
}

/// Split a record into its validated header and the payload slice.
pub fn decode_record<'a>(identifier: &str, record: &'a [u8]) -> Result<(SnapshotHeader, &'a [u8])> {
    let corrupt = |reason: &str| IndexerError::CorruptRecord {
        identifier: identifier.to_string(),
        reason: reason.to_string(),
    };

    if record.len() < LENGTH_BYTES {
        return Err(corrupt("record shorter than its length prefix"));
    }
    let (prefix, rest) = record.split_at(LENGTH_BYTES);
    let mut length = [0u8; LENGTH_BYTES];
    length.copy_from_slice(prefix);
    let length = u32::from_le_bytes(length) as usize;
    if rest.len() < length {
        return Err(corrupt("header length exceeds record"));
    }
    let (header, payload) = rest.split_at(length);

    let raw: RawHeader = serde_json::from_slice(header)
        .map_err(|e| corrupt(&format!("unreadable header: {e}")))?;
    if raw.version != SNAPSHOT_FORMAT_VERSION {
        return Err(IndexerError::UnsupportedFormatVersion {
            found: raw.version,
            expected: SNAPSHOT_FORMAT_VERSION,
        });
    }
    let kind: IndexKind = serde_json::from_value(raw.kind.clone()).map_err(|_| {
        let name = raw
            .kind
            .get("kind")
            .and_then(Value::as_str)
            .map_or_else(|| raw.kind.to_string(), str::to_string);
        IndexerError::UnknownIndexKind(name)
    })?;

    Ok((
        SnapshotHeader {
            kind,
            version: raw.version,
        },
        payload,
    ))
}

pub struct IndexSnapshotStore {
    kv: Arc<dyn KvStore>,
    registry: Arc<IndexRegistry>,
}

impl IndexSnapshotStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>, registry: Arc<IndexRegistry>) -> Self {
        Self { kv, registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<IndexRegistry> {
        &self.registry
    }

    pub async fn save(&self, index: &dyn Index) -> Result<()> {
        let payload = index.serialize()?;
        let record = encode_record(index.kind(), &payload)?;
        debug!(
            "Saving {} index {} ({} bytes)",
            index.kind(),
            index.identifier(),
            record.len()
        );
        let mut batch = WriteBatch::new();
        batch.put(record_key(index.identifier()), record);
        self.kv.write(batch).await
    }

    /// Load and construct the index stored under `identifier`. The result is unopened.
    pub async fn load(&self, identifier: &str) -> Result<Box<dyn Index>> {
        let record = self
            .kv
            .get(&record_key(identifier))
            .await?
            .ok_or_else(|| IndexerError::RecordNotFound(identifier.to_string()))?;
        let (header, payload) = decode_record(identifier, &record)?;
        if !self.registry.supports(header.kind.discriminant()) {
            return Err(IndexerError::UnknownIndexKind(header.kind.to_string()));
        }
        self.registry.load(&header.kind, identifier, payload)
    }

    pub async fn remove(&self, identifier: &str) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(record_key(identifier));
        self.kv.write(batch).await
    }

    /// Survey every record by header, keeping at most one identifier per kind.
    ///
    /// Records that cannot be understood are skipped and left in place. When several
    /// records share a kind the first in key order wins; the rest are deleted in a
    /// single batch.
    pub async fn load_index_kinds_from_disk(&self) -> Result<BTreeMap<String, IndexKind>> {
        let mut kinds = BTreeMap::new();
        let mut seen: BTreeSet<IndexKind> = BTreeSet::new();
        let mut duplicates = WriteBatch::new();

        for (key, record) in self.kv.scan_prefix(SNAPSHOT_PREFIX).await? {
            let identifier = &key[SNAPSHOT_PREFIX.len()..];
            let header = match decode_record(identifier, &record) {
                Ok((header, _)) => header,
                Err(err) => {
                    warn!("Skipping snapshot record {identifier}: {err}");
                    continue;
                }
            };
            if !self.registry.supports(header.kind.discriminant()) {
                warn!(
                    "Skipping snapshot record {identifier}: no constructor for {}",
                    header.kind
                );
                continue;
            }
            if !seen.insert(header.kind.clone()) {
                warn!(
                    "Removing duplicate {} snapshot record {identifier}",
                    header.kind
                );
                duplicates.delete(key.clone());
                continue;
            }
            kinds.insert(identifier.to_string(), header.kind);
        }

        if !duplicates.is_empty() {
            info!("Removed {} duplicate snapshot records", duplicates.len());
            self.kv.write(duplicates).await?;
        }
        Ok(kinds)
    }
}
