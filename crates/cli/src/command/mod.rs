pub mod domain;

use crate::store::{DocumentFile, DocumentInput, DocumentRecord, Workspace};
use anyhow::{anyhow, Context, Result};
use docindex_indexer::{IndexingEngine, IndexingUpdate};
use docindex_protocol::{FindResult, IndexKind, IndexQuery, ObjectPointer};
use domain::{CommandResponse, Hint, HintKind, QueryFlags, ResponseMeta, StalePolicy};
use serde_json::json;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Settings shared by the commands that drive the engine.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub kinds: Vec<IndexKind>,
    pub batch_size: Option<usize>,
    pub time_budget_ms: Option<u64>,
    /// Drop stored indexes whose kind is no longer configured.
    pub prune: bool,
}

impl RunOverrides {
    fn apply(&self, workspace: &mut Workspace) {
        let config = workspace.config_mut();
        if !self.kinds.is_empty() {
            for kind in &self.kinds {
                if !config.wants(kind) {
                    config.kinds.push(kind.clone());
                }
            }
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size.max(1);
        }
        if let Some(budget) = self.time_budget_ms {
            config.time_budget_ms = budget;
        }
    }
}

fn base_meta(workspace: &Workspace, started: Instant) -> ResponseMeta {
    ResponseMeta {
        config_path: workspace
            .config_path()
            .map(|path| path.display().to_string()),
        duration_ms: Some(elapsed_ms(started)),
        ..ResponseMeta::default()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Close the engine whatever `result` holds, keeping the first error.
async fn finish<T>(engine: IndexingEngine, result: Result<T>) -> Result<T> {
    let closed = engine.close().await.context("Failed to close indexes");
    let value = result?;
    closed?;
    Ok(value)
}

pub async fn put(store: &Path, file: &Path) -> Result<CommandResponse> {
    let started = Instant::now();
    let workspace = Workspace::open(store).await?;
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let parsed: DocumentFile = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse documents in {}", file.display()))?;

    let metadata = workspace.metadata();
    let summary = workspace
        .save_documents(&metadata, parsed.into_inputs())
        .await?;
    let dirty = metadata.get_dirty_documents().await?.len();

    let mut hints = Vec::new();
    if dirty > 0 {
        hints.push(Hint::new(
            HintKind::Action,
            format!("{dirty} objects wait for indexing; run `docindex reindex`."),
        ));
    }
    let mut meta = base_meta(&workspace, started);
    meta.dirty_remaining = Some(dirty);
    Ok(CommandResponse::ok(json!(summary), hints, meta))
}

pub async fn delete(store: &Path, pointers: &[String]) -> Result<CommandResponse> {
    let started = Instant::now();
    let workspace = Workspace::open(store).await?;

    let mut inputs = Vec::new();
    let mut missing = Vec::new();
    for raw in pointers {
        let pointer = ObjectPointer::parse(raw)
            .ok_or_else(|| anyhow!("Invalid pointer '{raw}', expected space:document:object"))?;
        match workspace.get_document(&pointer).await? {
            Some(DocumentRecord { object, .. }) if !object.deleted => inputs.push(DocumentInput {
                pointer,
                object: object.deleted(),
            }),
            Some(_) => {}
            None => missing.push(raw.clone()),
        }
    }

    let metadata = workspace.metadata();
    let summary = workspace.save_documents(&metadata, inputs).await?;
    let hints = if missing.is_empty() {
        Vec::new()
    } else {
        vec![Hint::new(
            HintKind::Warn,
            format!("Unknown pointers ignored: {}", missing.join(", ")),
        )]
    };
    Ok(CommandResponse::ok(
        json!({ "deleted": summary.written }),
        hints,
        base_meta(&workspace, started),
    ))
}

struct CatchUp {
    passes: usize,
    processed: usize,
    promoted: usize,
    updated: bool,
    completed: bool,
}

/// Promote pending indexes, then run budgeted passes until the dirty set drains or
/// `deadline` passes.
async fn catch_up(
    engine: &IndexingEngine,
    workspace: &Workspace,
    deadline: Option<Duration>,
) -> Result<CatchUp> {
    let started = Instant::now();
    let mut updates = engine.subscribe_updates();
    let promoted = engine
        .promote_new_indexes()
        .await
        .context("Failed to promote new indexes")?;

    let config = workspace.config();
    let mut report = CatchUp {
        passes: 0,
        processed: 0,
        promoted,
        updated: promoted > 0,
        completed: false,
    };
    loop {
        let outcome = engine
            .index_updated_objects(config.time_budget(), config.batch_size)
            .await
            .context("Reindex pass failed")?;
        report.passes += 1;
        report.updated |= outcome.updated;
        report.processed += drain_processed(&mut updates);
        if outcome.completed {
            report.completed = true;
            break;
        }
        if deadline.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
    }
    log::info!(
        "Reindex: {} passes, {} objects, completed={}",
        report.passes,
        report.processed,
        report.completed
    );
    Ok(report)
}

fn drain_processed(updates: &mut broadcast::Receiver<IndexingUpdate>) -> usize {
    let mut processed = 0;
    while let Ok(update) = updates.try_recv() {
        processed += update.processed;
    }
    processed
}

pub async fn reindex(store: &Path, overrides: &RunOverrides) -> Result<CommandResponse> {
    let started = Instant::now();
    let mut workspace = Workspace::open(store).await?;
    overrides.apply(&mut workspace);

    let engine = workspace.engine(overrides.prune).await?;
    let result = catch_up(&engine, &workspace, None).await;
    let report = finish(engine, result).await?;

    let mut meta = base_meta(&workspace, started);
    meta.index_updated = Some(report.updated);
    meta.dirty_remaining = Some(0);
    Ok(CommandResponse::ok(
        json!({
            "passes": report.passes,
            "processed": report.processed,
            "promoted": report.promoted,
            "kinds": workspace.config().kinds,
        }),
        Vec::new(),
        meta,
    ))
}

pub struct QueryRequest {
    pub kind: IndexKind,
    pub flags: QueryFlags,
    pub stale_policy: StalePolicy,
    pub max_reindex_ms: u64,
    pub limit: Option<usize>,
}

pub async fn query(store: &Path, request: QueryRequest) -> Result<CommandResponse> {
    let started = Instant::now();
    let query: IndexQuery = request.flags.build()?;
    let mut workspace = Workspace::open(store).await?;
    RunOverrides {
        kinds: vec![request.kind.clone()],
        ..RunOverrides::default()
    }
    .apply(&mut workspace);

    let engine = workspace.engine(false).await?;
    let result = run_query(&engine, &workspace, &request, &query).await;
    let (hits, updated, dirty) = finish(engine, result).await?;

    let mut hints = Vec::new();
    if dirty > 0 {
        hints.push(Hint::new(
            HintKind::Warn,
            format!("{dirty} objects are not indexed yet; results may be stale."),
        ));
    }
    let mut meta = base_meta(&workspace, started);
    meta.index_updated = Some(updated);
    meta.dirty_remaining = Some(dirty);
    Ok(CommandResponse::ok(
        json!({ "kind": request.kind, "results": hits }),
        hints,
        meta,
    ))
}

async fn run_query(
    engine: &IndexingEngine,
    workspace: &Workspace,
    request: &QueryRequest,
    query: &IndexQuery,
) -> Result<(Vec<FindResult>, bool, usize)> {
    let mut updated = false;
    let pending = engine.metadata().get_dirty_documents().await?.len();
    let stale = pending > 0 || !engine.pending_kinds().await.is_empty();

    match request.stale_policy {
        StalePolicy::Auto if stale => {
            let report = catch_up(
                engine,
                workspace,
                Some(Duration::from_millis(request.max_reindex_ms)),
            )
            .await?;
            updated = report.updated;
        }
        StalePolicy::Fail if stale => {
            return Err(anyhow!(
                "Index is stale ({pending} dirty objects); run `docindex reindex` first"
            ));
        }
        _ => {}
    }

    let mut hits = engine
        .find(&request.kind, query)
        .await
        .with_context(|| format!("Query against {} failed", request.kind))?;
    if let Some(limit) = request.limit {
        hits.truncate(limit);
    }
    let dirty = engine.metadata().get_dirty_documents().await?.len();
    Ok((hits, updated, dirty))
}

pub async fn status(store: &Path) -> Result<CommandResponse> {
    let started = Instant::now();
    let workspace = Workspace::open(store).await?;
    let metadata = workspace.metadata();
    let dirty = metadata.get_dirty_documents().await?.len();
    let clean = metadata.get_all_indexed_documents().await?.len();
    let documents = workspace.document_count().await?;

    let engine = workspace.engine(false).await?;
    let live = engine.persistent_kinds().await;
    let pending = engine.pending_kinds().await;
    finish(engine, Ok(())).await?;

    let mut hints = Vec::new();
    if dirty > 0 || !pending.is_empty() {
        hints.push(Hint::new(
            HintKind::Action,
            "Run `docindex reindex` to bring every index up to date.",
        ));
    }
    if workspace.config_path().is_none() {
        hints.push(Hint::new(
            HintKind::Info,
            "No docindex.toml in the store; using default index kinds.",
        ));
    }
    let mut meta = base_meta(&workspace, started);
    meta.dirty_remaining = Some(dirty);
    Ok(CommandResponse::ok(
        json!({
            "store": workspace.root().display().to_string(),
            "documents": documents,
            "dirty": dirty,
            "clean": clean,
            "indexes": live,
            "pending": pending,
        }),
        hints,
        meta,
    ))
}

pub fn schema() -> Result<CommandResponse> {
    let schema = schemars::schema_for!(IndexQuery);
    Ok(CommandResponse::ok(
        serde_json::to_value(schema).context("Failed to render query schema")?,
        Vec::new(),
        ResponseMeta::default(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use docindex_protocol::{reference, IndexedObject};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn pointer(id: &str) -> String {
        ObjectPointer::new("space", "doc", id).to_string()
    }

    async fn seeded_store() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let john = ObjectPointer::new("space", "doc", "john");
        let docs = json!([
            {
                "pointer": pointer("john"),
                "object": IndexedObject::new("john")
                    .with_typename("Person")
                    .with_field("name", json!("John Harbor")),
            },
            {
                "pointer": pointer("task1"),
                "object": IndexedObject::new("task1")
                    .with_typename("Task")
                    .with_field("title", json!("Count the harbor seals"))
                    .with_field("assignedTo", reference(&john)),
            },
        ]);
        let file = dir.path().join("docs.json");
        tokio::fs::write(&file, serde_json::to_vec(&docs).unwrap())
            .await
            .unwrap();
        let response = put(&dir.path().join("store"), &file).await.unwrap();
        assert_eq!(response.data["written"], json!(2));
        dir
    }

    fn hits(response: &CommandResponse) -> Vec<String> {
        response.data["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|hit| hit["pointer"].as_str().unwrap().to_string())
            .collect()
    }

    fn request(kind: IndexKind, flags: QueryFlags) -> QueryRequest {
        QueryRequest {
            kind,
            flags,
            stale_policy: StalePolicy::Warn,
            max_reindex_ms: 1000,
            limit: None,
        }
    }

    #[tokio::test]
    async fn put_reindex_and_query() {
        let dir = seeded_store().await;
        let store = dir.path().join("store");

        let before = status(&store).await.unwrap();
        assert_eq!(before.data["dirty"], json!(2));
        assert_eq!(before.data["documents"], json!(2));

        let report = reindex(&store, &RunOverrides::default()).await.unwrap();
        assert_eq!(report.meta.index_updated, Some(true));

        let after = status(&store).await.unwrap();
        assert_eq!(after.data["dirty"], json!(0));
        assert_eq!(after.data["clean"], json!(2));

        let text = query(
            &store,
            request(
                IndexKind::FullText,
                QueryFlags {
                    text: Some("seals".to_string()),
                    ..QueryFlags::default()
                },
            ),
        )
        .await
        .unwrap();
        assert_eq!(hits(&text), vec![pointer("task1")]);

        let inbound = query(
            &store,
            request(
                IndexKind::Graph,
                QueryFlags {
                    inbound: vec![pointer("john")],
                    ..QueryFlags::default()
                },
            ),
        )
        .await
        .unwrap();
        assert_eq!(hits(&inbound), vec![pointer("task1")]);
    }

    #[tokio::test]
    async fn deleted_objects_leave_the_indexes() {
        let dir = seeded_store().await;
        let store = dir.path().join("store");
        reindex(&store, &RunOverrides::default()).await.unwrap();

        let response = delete(&store, &[pointer("task1"), pointer("ghost")])
            .await
            .unwrap();
        assert_eq!(response.data["deleted"], json!(1));
        assert_eq!(response.hints.len(), 1);

        let mut auto = request(IndexKind::SchemaMatch, QueryFlags::default());
        auto.stale_policy = StalePolicy::Auto;
        let all = query(&store, auto).await.unwrap();
        assert_eq!(hits(&all), vec![pointer("john")]);
        assert_eq!(all.meta.dirty_remaining, Some(0));
    }

    #[tokio::test]
    async fn stale_policy_fail_refuses_to_answer() {
        let dir = seeded_store().await;
        let mut strict = request(IndexKind::SchemaMatch, QueryFlags::default());
        strict.stale_policy = StalePolicy::Fail;
        let err = query(&dir.path().join("store"), strict).await.unwrap_err();
        assert!(err.to_string().contains("stale"));
    }

    #[tokio::test]
    async fn extra_kinds_survive_until_pruned() {
        let dir = seeded_store().await;
        let store = dir.path().join("store");
        let with_status = RunOverrides {
            kinds: vec![IndexKind::field_match("title")],
            ..RunOverrides::default()
        };
        reindex(&store, &with_status).await.unwrap();

        let kinds = |response: &CommandResponse| -> Vec<Value> {
            response.data["indexes"].as_array().unwrap().clone()
        };
        let kept = status(&store).await.unwrap();
        assert!(kinds(&kept).contains(&json!({"kind": "field-match", "field": "title"})));

        reindex(
            &store,
            &RunOverrides {
                prune: true,
                ..RunOverrides::default()
            },
        )
        .await
        .unwrap();
        let pruned = status(&store).await.unwrap();
        assert!(!kinds(&pruned).contains(&json!({"kind": "field-match", "field": "title"})));
    }

    #[test]
    fn schema_describes_the_query() {
        let response = schema().unwrap();
        assert!(response.data["properties"].get("typenames").is_some());
    }
}
