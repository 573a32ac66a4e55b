//! Dirty/clean tracking.
//!
//! Two pointer → [`Heads`] maps live under separate key prefixes: *dirty* is the
//! version each object was last seen at, *clean* the version it was last indexed at.
//! A pointer sits in both while a newer version waits to be indexed.

use crate::storage::{KvStore, WriteBatch};
use crate::{IndexerError, Result};
use docindex_protocol::{Heads, ObjectPointer};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

pub const DIRTY_PREFIX: &str = "index-metadata/dirty/";
pub const CLEAN_PREFIX: &str = "index-metadata/clean/";

/// Width of one hash in the legacy concatenated encoding.
const LEGACY_HASH_WIDTH: usize = 64;

/// Separator of the pre-space `{document}|{object}` key format.
const LEGACY_KEY_SEPARATOR: char = '|';

static LEGACY_HEADS_WARNED: AtomicBool = AtomicBool::new(false);

pub type HeadsMap = BTreeMap<ObjectPointer, Heads>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataEvent {
    /// New dirty marks were committed.
    Dirty,
    /// `count` pointers were marked clean.
    Clean { count: usize },
}

fn dirty_key(pointer: &ObjectPointer) -> String {
    format!("{DIRTY_PREFIX}{pointer}")
}

fn clean_key(pointer: &ObjectPointer) -> String {
    format!("{CLEAN_PREFIX}{pointer}")
}

#[must_use]
pub fn encode_heads(heads: &Heads) -> Vec<u8> {
    // A Vec<String> always serializes.
    serde_json::to_vec(heads.hashes()).unwrap_or_default()
}

/// Decode stored Heads. Values that are not a JSON array are treated as the legacy
/// form: hex hashes glued together, split back into fixed-width pieces.
#[must_use]
pub fn decode_heads(raw: &[u8]) -> Heads {
    if let Ok(hashes) = serde_json::from_slice::<Vec<String>>(raw) {
        return Heads::new(hashes);
    }

    if !LEGACY_HEADS_WARNED.swap(true, Ordering::Relaxed) {
        warn!("Found heads stored in a legacy encoding; decoding by fixed-width split");
    }
    let text: String = String::from_utf8_lossy(raw)
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    let chars: Vec<char> = text.chars().collect();
    Heads::new(
        chars
            .chunks(LEGACY_HASH_WIDTH)
            .map(|chunk| chunk.iter().collect::<String>()),
    )
}

pub struct IndexMetadataStore {
    kv: Arc<dyn KvStore>,
    events: broadcast::Sender<MetadataEvent>,
}

impl IndexMetadataStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self { kv, events }
    }

    #[must_use]
    pub fn kv(&self) -> &Arc<dyn KvStore> {
        &self.kv
    }

    /// Receive dirty/clean notifications until the receiver is dropped.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MetadataEvent> {
        self.events.subscribe()
    }

    pub async fn get_dirty_documents(&self) -> Result<HeadsMap> {
        self.read_set(DIRTY_PREFIX).await
    }

    pub async fn get_all_indexed_documents(&self) -> Result<HeadsMap> {
        self.read_set(CLEAN_PREFIX).await
    }

    async fn read_set(&self, prefix: &str) -> Result<HeadsMap> {
        let mut out = HeadsMap::new();
        for (key, value) in self.kv.scan_prefix(prefix).await? {
            let raw = &key[prefix.len()..];
            let Some(pointer) = ObjectPointer::parse(raw) else {
                if raw.contains(LEGACY_KEY_SEPARATOR) {
                    debug!("Skipping legacy metadata key {key}");
                } else {
                    warn!("Skipping metadata key {key}: not an object pointer");
                }
                continue;
            };
            out.insert(pointer, decode_heads(&value));
        }
        Ok(out)
    }

    /// Record the Heads each object was saved at. Must share the batch of the document
    /// save so a committed document is never left unmarked.
    ///
    /// Pointers that do not parse could never be read back as dirty; the whole call is
    /// rejected and `batch` is left untouched.
    pub fn mark_dirty<'a, I>(&self, entries: I, batch: &mut WriteBatch) -> Result<()>
    where
        I: IntoIterator<Item = (&'a ObjectPointer, &'a Heads)>,
    {
        let entries: Vec<_> = entries.into_iter().collect();
        if let Some((pointer, _)) = entries
            .iter()
            .find(|(pointer, _)| ObjectPointer::parse(pointer.as_str()).is_none())
        {
            return Err(IndexerError::InvalidPointer(pointer.to_string()));
        }

        for (pointer, heads) in entries {
            batch.put(dirty_key(pointer), encode_heads(heads));
            if let Some(legacy) = pointer.legacy_key() {
                batch.delete(format!("{DIRTY_PREFIX}{legacy}"));
            }
        }
        Ok(())
    }

    pub fn notify_marked_dirty(&self) {
        let _ = self.events.send(MetadataEvent::Dirty);
    }

    /// Record pointers as indexed at `entries`' Heads.
    ///
    /// The dirty mark is removed only when it still holds exactly the indexed Heads; the
    /// conditional delete runs inside the batch write, so a newer mark stored between
    /// this read and the commit survives as well.
    pub async fn mark_clean(&self, entries: &HeadsMap, batch: &mut WriteBatch) -> Result<()> {
        for (pointer, heads) in entries {
            batch.put(clean_key(pointer), encode_heads(heads));

            let key = dirty_key(pointer);
            if let Some(stored) = self.kv.get(&key).await? {
                if decode_heads(&stored) == *heads {
                    batch.delete_if_equals(key, stored);
                }
            }
        }
        Ok(())
    }

    pub fn notify_marked_clean(&self, count: usize) {
        let _ = self.events.send(MetadataEvent::Clean { count });
    }

    pub fn drop_from_clean<'a, I>(&self, pointers: I, batch: &mut WriteBatch)
    where
        I: IntoIterator<Item = &'a ObjectPointer>,
    {
        for pointer in pointers {
            batch.delete(clean_key(pointer));
        }
    }

    pub async fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.kv.write(batch).await
    }

    #[must_use]
    pub fn commit_hook(&self) -> CommitHook<'_> {
        CommitHook { metadata: self }
    }
}

/// Glue for hosts saving documents: mark touched objects dirty inside the save batch,
/// wake the scheduler once the batch is committed.
pub struct CommitHook<'a> {
    metadata: &'a IndexMetadataStore,
}

impl CommitHook<'_> {
    pub fn before_save(&self, batch: &mut WriteBatch, touched: &HeadsMap) -> Result<()> {
        self.metadata.mark_dirty(touched, batch)
    }

    pub fn after_save(&self) {
        self.metadata.notify_marked_dirty();
    }
}
