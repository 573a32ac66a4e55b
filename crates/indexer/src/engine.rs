//! Orchestration of the live index set.
//!
//! ```text
//! dirty set ──> DocumentLoader ──> chunk ──> every persistent index
//!                                    │
//!                          accumulate (pointer, heads)
//!                                    │  batch_size reached / budget spent / exhausted
//!                                    ▼
//!                   save snapshots ──> mark_clean(accumulated)
//! ```
//!
//! Snapshots are always written before metadata is marked clean, so a crash can only
//! cause work to be repeated, never skipped.

use crate::index::Index;
use crate::loader::DocumentLoader;
use crate::metadata::{HeadsMap, IndexMetadataStore};
use crate::snapshot::IndexSnapshotStore;
use crate::storage::WriteBatch;
use crate::{IndexerError, Result};
use docindex_protocol::{FindResult, IndexKind, IndexQuery, IndexedObject, ObjectSnapshot};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex as TokioMutex, RwLock};

pub const DEFAULT_LOAD_CHUNK_SIZE: usize = 32;

pub type SharedIndex = Arc<RwLock<Box<dyn Index>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexingOutcome {
    /// The dirty set was drained.
    pub completed: bool,
    /// At least one index changed.
    pub updated: bool,
}

#[derive(Debug, Clone)]
pub struct IndexingUpdate {
    pub completed: bool,
    pub updated: bool,
    pub processed: usize,
    pub duration: Duration,
}

/// Whether `kind` takes `object` at all. Objects routed away from an index are removed
/// from it, so an object that loses a field also leaves that field's index.
#[must_use]
pub fn routes_to(kind: &IndexKind, object: &IndexedObject) -> bool {
    match kind {
        IndexKind::FieldMatch { field } => object.has_field(field),
        IndexKind::SchemaMatch | IndexKind::FullText | IndexKind::Vector | IndexKind::Graph => {
            true
        }
    }
}

pub struct IndexingEngine {
    metadata: Arc<IndexMetadataStore>,
    snapshots: Arc<IndexSnapshotStore>,
    loader: Arc<dyn DocumentLoader>,
    load_chunk_size: usize,
    persistent: RwLock<BTreeMap<IndexKind, SharedIndex>>,
    pending: TokioMutex<Vec<SharedIndex>>,
    run_lock: TokioMutex<()>,
    save_lock: TokioMutex<()>,
    disposed: AtomicBool,
    updates: broadcast::Sender<IndexingUpdate>,
}

/// Pointers processed since the last flush, with the Heads they were indexed at.
#[derive(Default)]
struct Accumulator {
    entries: HeadsMap,
}

impl IndexingEngine {
    #[must_use]
    pub fn new(
        metadata: Arc<IndexMetadataStore>,
        snapshots: Arc<IndexSnapshotStore>,
        loader: Arc<dyn DocumentLoader>,
    ) -> Self {
        let (updates, _) = broadcast::channel(32);
        Self {
            metadata,
            snapshots,
            loader,
            load_chunk_size: DEFAULT_LOAD_CHUNK_SIZE,
            persistent: RwLock::new(BTreeMap::new()),
            pending: TokioMutex::new(Vec::new()),
            run_lock: TokioMutex::new(()),
            save_lock: TokioMutex::new(()),
            disposed: AtomicBool::new(false),
            updates,
        }
    }

    #[must_use]
    pub fn with_load_chunk_size(mut self, chunk_size: usize) -> Self {
        self.load_chunk_size = chunk_size.max(1);
        self
    }

    #[must_use]
    pub fn metadata(&self) -> &Arc<IndexMetadataStore> {
        &self.metadata
    }

    #[must_use]
    pub fn snapshots(&self) -> &Arc<IndexSnapshotStore> {
        &self.snapshots
    }

    #[must_use]
    pub fn subscribe_updates(&self) -> broadcast::Receiver<IndexingUpdate> {
        self.updates.subscribe()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            Err(IndexerError::Disposed)
        } else {
            Ok(())
        }
    }

    pub async fn persistent_kinds(&self) -> Vec<IndexKind> {
        self.persistent.read().await.keys().cloned().collect()
    }

    pub async fn pending_kinds(&self) -> Vec<IndexKind> {
        let pending = self.pending.lock().await;
        let mut kinds = Vec::with_capacity(pending.len());
        for index in pending.iter() {
            kinds.push(index.read().await.kind().clone());
        }
        kinds
    }

    /// Register an index that already reflects all indexed history.
    pub async fn add_persistent_index(&self, mut index: Box<dyn Index>) -> Result<()> {
        self.ensure_live()?;
        open_index(index.as_mut()).await?;
        let kind = index.kind().clone();
        let identifier = index.identifier().to_string();
        info!("Added {kind} index {identifier}");

        let previous = self
            .persistent
            .write()
            .await
            .insert(kind, Arc::new(RwLock::new(index)));
        if let Some(previous) = previous {
            self.retire(previous, &identifier).await?;
        }
        Ok(())
    }

    pub async fn load_index_from_disk(&self, identifier: &str) -> Result<()> {
        let index = self.snapshots.load(identifier).await?;
        self.add_persistent_index(index).await
    }

    /// Register an index that has to backfill history before it is queried.
    pub async fn add_new_index(&self, mut index: Box<dyn Index>) -> Result<()> {
        self.ensure_live()?;
        open_index(index.as_mut()).await?;
        info!(
            "Added new {} index {}; pending promotion",
            index.kind(),
            index.identifier()
        );
        self.pending.lock().await.push(Arc::new(RwLock::new(index)));
        Ok(())
    }

    /// Close a superseded index and delete its record, unless the replacement was
    /// loaded from that same record.
    async fn retire(&self, index: SharedIndex, replacement: &str) -> Result<()> {
        let mut index = index.write().await;
        let identifier = index.identifier().to_string();
        if let Err(err) = index.close().await {
            warn!("Failed to close superseded index {identifier}: {err}");
        }
        if identifier == replacement {
            return Ok(());
        }
        self.snapshots.remove(&identifier).await
    }

    /// Bring the live set in line with `kinds`: load configured kinds from disk, queue
    /// the missing ones for promotion, drop records of kinds no longer configured.
    pub async fn reconcile(&self, kinds: &[IndexKind]) -> Result<()> {
        let wanted: BTreeSet<&IndexKind> = kinds.iter().collect();
        let on_disk = self.snapshots.load_index_kinds_from_disk().await?;

        let mut loaded: BTreeSet<IndexKind> = BTreeSet::new();
        for (identifier, kind) in on_disk {
            if !wanted.contains(&kind) {
                info!("Dropping {kind} index {identifier}: no longer configured");
                self.snapshots.remove(&identifier).await?;
                continue;
            }
            // Only a damaged payload is rebuilt. Store failures and open failures say
            // nothing about the record, which must survive for the next attempt.
            match self.snapshots.load(&identifier).await {
                Ok(index) => {
                    self.add_persistent_index(index).await?;
                    loaded.insert(kind);
                }
                Err(err) if err.is_damaged_record() => {
                    warn!("Failed to load {kind} index {identifier}, rebuilding: {err}");
                    self.snapshots.remove(&identifier).await?;
                }
                Err(err) => return Err(err),
            }
        }

        let live = self.persistent_kinds().await;
        let pending = self.pending_kinds().await;
        for kind in wanted {
            if loaded.contains(kind) || live.contains(kind) || pending.contains(kind) {
                continue;
            }
            let index = self.snapshots.registry().create(kind)?;
            self.add_new_index(index).await?;
        }
        Ok(())
    }

    /// Backfill every pending index from the clean set, then make them persistent.
    ///
    /// Returns the number of promoted indexes. An interrupted promotion leaves nothing
    /// persisted and simply runs again in full.
    pub async fn promote_new_indexes(&self) -> Result<usize> {
        let _run = self.run_lock.lock().await;
        self.ensure_live()?;

        let pending: Vec<SharedIndex> = self.pending.lock().await.clone();
        if pending.is_empty() {
            return Ok(0);
        }

        let history = self.metadata.get_all_indexed_documents().await?;
        info!(
            "Promoting {} new indexes over {} indexed documents",
            pending.len(),
            history.len()
        );

        let mut stream = self
            .loader
            .load_documents(&history, self.load_chunk_size)
            .await?;
        loop {
            self.ensure_live()?;
            let Some(chunk) = stream.next_batch().await? else {
                break;
            };
            for snapshot in &chunk {
                if snapshot.object.deleted {
                    continue;
                }
                for index in &pending {
                    let mut index = index.write().await;
                    if routes_to(index.kind(), &snapshot.object) {
                        index.update(&snapshot.pointer, &snapshot.object).await?;
                    }
                }
            }
        }

        // Indexes added while the history streamed saw none of it; they stay pending
        // for the next promotion.
        let promoted: Vec<SharedIndex> = {
            let mut queue = self.pending.lock().await;
            let (promoted, later): (Vec<_>, Vec<_>) = queue
                .drain(..)
                .partition(|index| pending.iter().any(|seen| Arc::ptr_eq(seen, index)));
            *queue = later;
            promoted
        };
        let mut superseded = Vec::new();
        {
            let mut persistent = self.persistent.write().await;
            for index in &promoted {
                let (kind, identifier) = {
                    let index = index.read().await;
                    (index.kind().clone(), index.identifier().to_string())
                };
                if let Some(previous) = persistent.insert(kind, index.clone()) {
                    superseded.push((previous, identifier));
                }
            }
        }

        self.save_indexes().await?;
        for (previous, replacement) in superseded {
            self.retire(previous, &replacement).await?;
        }
        info!("Promoted {} indexes", promoted.len());
        Ok(promoted.len())
    }

    /// Index dirty documents until the set is drained or `time_budget` is spent.
    ///
    /// Time and cancellation are checked between chunks only. Processed pointers are
    /// flushed every `batch_size` documents and before returning.
    pub async fn index_updated_objects(
        &self,
        time_budget: Duration,
        batch_size: usize,
    ) -> Result<IndexingOutcome> {
        let _run = self.run_lock.lock().await;
        self.ensure_live()?;
        let started = Instant::now();
        let batch_size = batch_size.max(1);

        let dirty = self.metadata.get_dirty_documents().await?;
        if dirty.is_empty() {
            return Ok(IndexingOutcome {
                completed: true,
                updated: false,
            });
        }
        debug!("Reindexing {} dirty documents", dirty.len());

        let indexes: Vec<SharedIndex> = self.persistent.read().await.values().cloned().collect();
        let mut stream = self
            .loader
            .load_documents(&dirty, self.load_chunk_size)
            .await?;

        let mut accumulated = Accumulator::default();
        let mut visited: BTreeSet<_> = BTreeSet::new();
        let mut updated = false;
        let mut processed = 0usize;

        loop {
            self.ensure_live()?;
            let Some(chunk) = stream.next_batch().await? else {
                break;
            };
            for snapshot in chunk {
                updated |= apply_snapshot(&indexes, &snapshot).await?;
                visited.insert(snapshot.pointer.clone());
                accumulated.entries.insert(snapshot.pointer, snapshot.heads);
                processed += 1;
                if accumulated.entries.len() >= batch_size {
                    self.flush(&mut accumulated).await?;
                }
            }

            if started.elapsed() >= time_budget {
                self.flush(&mut accumulated).await?;
                let outcome = IndexingOutcome {
                    completed: false,
                    updated,
                };
                self.publish(outcome, processed, started.elapsed());
                return Ok(outcome);
            }
        }

        // Pointers the loader no longer knows: the object is gone.
        for (pointer, heads) in dirty {
            if visited.contains(&pointer) {
                continue;
            }
            for index in &indexes {
                updated |= index.write().await.remove(&pointer).await?;
            }
            accumulated.entries.insert(pointer, heads);
            processed += 1;
            if accumulated.entries.len() >= batch_size {
                self.flush(&mut accumulated).await?;
            }
        }

        self.flush(&mut accumulated).await?;
        let outcome = IndexingOutcome {
            completed: true,
            updated,
        };
        self.publish(outcome, processed, started.elapsed());
        Ok(outcome)
    }

    fn publish(&self, outcome: IndexingOutcome, processed: usize, duration: Duration) {
        debug!(
            "Indexing run: processed={processed} completed={} updated={} in {:?}",
            outcome.completed, outcome.updated, duration
        );
        let _ = self.updates.send(IndexingUpdate {
            completed: outcome.completed,
            updated: outcome.updated,
            processed,
            duration,
        });
    }

    /// Persist every index, then mark the accumulated pointers clean.
    async fn flush(&self, accumulated: &mut Accumulator) -> Result<()> {
        if accumulated.entries.is_empty() {
            return Ok(());
        }
        self.ensure_live()?;
        self.save_indexes().await?;

        let mut batch = WriteBatch::new();
        self.metadata
            .mark_clean(&accumulated.entries, &mut batch)
            .await?;
        self.metadata.commit(batch).await?;

        let count = accumulated.entries.len();
        accumulated.entries.clear();
        self.metadata.notify_marked_clean(count);
        debug!("Flushed {count} documents");
        Ok(())
    }

    /// Write a snapshot of every persistent index. A failure leaves the live indexes
    /// untouched so a later save can retry.
    pub async fn save_indexes(&self) -> Result<()> {
        let _save = self.save_lock.lock().await;
        let indexes: Vec<SharedIndex> = self.persistent.read().await.values().cloned().collect();
        for index in indexes {
            let index = index.read().await;
            self.snapshots.save(&**index).await?;
        }
        Ok(())
    }

    /// Query the persistent index of `kind`. Pending indexes are never queried.
    pub async fn find(&self, kind: &IndexKind, query: &IndexQuery) -> Result<Vec<FindResult>> {
        let index = self
            .persistent
            .read()
            .await
            .get(kind)
            .cloned()
            .ok_or_else(|| IndexerError::IndexNotFound(kind.to_string()))?;
        let index = index.read().await;
        index.find(query).await
    }

    /// Stop indexing and close every index. In-flight runs stop at their next chunk or
    /// flush boundary. Every index is closed even if some fail; the first failure is
    /// returned.
    pub async fn close(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let _run = self.run_lock.lock().await;

        let mut indexes: Vec<SharedIndex> = self.persistent.read().await.values().cloned().collect();
        indexes.extend(self.pending.lock().await.drain(..));

        let mut first_error = None;
        for index in indexes {
            let mut index = index.write().await;
            if let Err(err) = index.close().await {
                warn!("Failed to close index {}: {err}", index.identifier());
                first_error.get_or_insert(err);
            }
        }
        info!("Indexing engine closed");
        first_error.map_or(Ok(()), Err)
    }
}

/// Open `index`, releasing whatever it acquired if opening fails part way.
async fn open_index(index: &mut dyn Index) -> Result<()> {
    if let Err(err) = index.open().await {
        if let Err(close_err) = index.close().await {
            warn!(
                "Failed to close index {} after open error: {close_err}",
                index.identifier()
            );
        }
        return Err(err);
    }
    Ok(())
}

/// Route one snapshot through every index; returns whether any index changed.
async fn apply_snapshot(indexes: &[SharedIndex], snapshot: &ObjectSnapshot) -> Result<bool> {
    let mut changed = false;
    for index in indexes {
        let mut index = index.write().await;
        let index_changed = if snapshot.object.deleted || !routes_to(index.kind(), &snapshot.object)
        {
            index.remove(&snapshot.pointer).await?
        } else {
            index.update(&snapshot.pointer, &snapshot.object).await?
        };
        changed |= index_changed;
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_match_routes_on_presence() {
        let with = IndexedObject::new("a").with_field("status", json!("open"));
        let without = IndexedObject::new("b");
        let kind = IndexKind::field_match("status");
        assert!(routes_to(&kind, &with));
        assert!(!routes_to(&kind, &without));
        assert!(routes_to(&IndexKind::FullText, &without));
    }
}
