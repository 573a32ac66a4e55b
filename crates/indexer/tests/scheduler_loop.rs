//! Tests for the background scheduler

use docindex_indexer::{
    EngineConfig, HeadsMap, IndexMetadataStore, IndexRegistry, IndexScheduler,
    IndexSnapshotStore, IndexingEngine, KvStore, MemoryDocumentLoader, MemoryKvStore,
    SchedulerConfig, SequentialIdGenerator, WriteBatch,
};
use docindex_protocol::{Heads, IndexKind, IndexQuery, IndexedObject, ObjectPointer};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn p(id: &str) -> ObjectPointer {
    ObjectPointer::new("space", "doc", id)
}

fn config() -> EngineConfig {
    EngineConfig {
        kinds: vec![IndexKind::SchemaMatch],
        batch_size: 2,
        time_budget_ms: 50,
        scheduler: SchedulerConfig { debounce_ms: 5 },
        ..EngineConfig::default()
    }
}

async fn engine(kv: Arc<dyn KvStore>, loader: MemoryDocumentLoader) -> Arc<IndexingEngine> {
    let registry = Arc::new(IndexRegistry::builtin(
        Arc::new(SequentialIdGenerator::new("idx-")),
        None,
    ));
    let metadata = Arc::new(IndexMetadataStore::new(kv.clone()));
    let snapshots = Arc::new(IndexSnapshotStore::new(kv, registry));
    let engine = IndexingEngine::new(metadata, snapshots, Arc::new(loader));
    engine.reconcile(&config().kinds).await.unwrap();
    Arc::new(engine)
}

async fn save(engine: &IndexingEngine, loader: &MemoryDocumentLoader, id: &str) {
    let heads = Heads::new(["h1"]);
    loader.put(p(id), IndexedObject::new(id).with_typename("Task"), heads.clone());

    let touched: HeadsMap = [(p(id), heads)].into_iter().collect();
    let hook = engine.metadata().commit_hook();
    let mut batch = WriteBatch::new();
    hook.before_save(&mut batch, &touched).unwrap();
    engine.metadata().commit(batch).await.unwrap();
    hook.after_save();
}

async fn wait_until_drained(engine: &IndexingEngine) {
    timeout(Duration::from_secs(5), async {
        loop {
            if engine
                .metadata()
                .get_dirty_documents()
                .await
                .unwrap()
                .is_empty()
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("scheduler did not drain the dirty set");
}

#[tokio::test]
async fn test_dirty_event_wakes_scheduler() {
    let loader = MemoryDocumentLoader::new();
    let engine = engine(Arc::new(MemoryKvStore::new()), loader.clone()).await;
    let scheduler = IndexScheduler::start(engine.clone(), &config());

    for i in 0..5 {
        save(&engine, &loader, &format!("t{i}")).await;
    }
    wait_until_drained(&engine).await;

    let hits = engine
        .find(&IndexKind::SchemaMatch, &IndexQuery::typenames(["Task"]))
        .await
        .unwrap();
    assert_eq!(hits.len(), 5);
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_startup_pass_promotes_and_catches_up() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
    let loader = MemoryDocumentLoader::new();
    let engine = engine(kv, loader.clone()).await;

    // Dirty marks written before the scheduler exists.
    save(&engine, &loader, "early").await;
    assert_eq!(engine.pending_kinds().await, vec![IndexKind::SchemaMatch]);

    let scheduler = IndexScheduler::start(engine.clone(), &config());
    wait_until_drained(&engine).await;
    assert!(engine.pending_kinds().await.is_empty());
    assert_eq!(
        engine
            .find(&IndexKind::SchemaMatch, &IndexQuery::default())
            .await
            .unwrap()
            .len(),
        1
    );
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_manual_trigger_and_shutdown() {
    let loader = MemoryDocumentLoader::new();
    let engine = engine(Arc::new(MemoryKvStore::new()), loader.clone()).await;
    let scheduler = IndexScheduler::start(engine.clone(), &config());

    loader.put(p("quiet"), IndexedObject::new("quiet"), Heads::new(["h1"]));
    let touched: HeadsMap = [(p("quiet"), Heads::new(["h1"]))].into_iter().collect();
    let mut batch = WriteBatch::new();
    engine.metadata().mark_dirty(&touched, &mut batch).unwrap();
    engine.metadata().commit(batch).await.unwrap();
    // No notification: only the trigger can start this pass.
    scheduler.trigger().await.unwrap();
    wait_until_drained(&engine).await;

    scheduler.shutdown().await;
    assert!(scheduler.trigger().await.is_err());
}

#[tokio::test]
async fn test_failed_pass_is_retried_without_new_events() {
    let kv = Arc::new(MemoryKvStore::new());
    let loader = MemoryDocumentLoader::new();
    let engine = engine(kv.clone(), loader.clone()).await;

    loader.put(p("stuck"), IndexedObject::new("stuck"), Heads::new(["h1"]));
    let touched: HeadsMap = [(p("stuck"), Heads::new(["h1"]))].into_iter().collect();
    let mut batch = WriteBatch::new();
    engine.metadata().mark_dirty(&touched, &mut batch).unwrap();
    engine.metadata().commit(batch).await.unwrap();

    kv.set_read_only(true);
    let scheduler = IndexScheduler::start(engine.clone(), &config());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.metadata().get_dirty_documents().await.unwrap().len(), 1);

    // No dirty event and no trigger from here on.
    kv.set_read_only(false);
    wait_until_drained(&engine).await;
    assert!(engine.pending_kinds().await.is_empty());
    scheduler.shutdown().await;
}
