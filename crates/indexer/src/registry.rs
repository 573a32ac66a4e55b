//! Discriminant → constructor table for index kinds.

use crate::ids::{IdGenerator, RandomIdGenerator};
use crate::index::{
    FieldMatchIndex, FullTextIndex, GraphIndex, Index, SchemaMatchIndex, VectorConfig,
    VectorIndex,
};
use crate::{IndexerError, Result};
use docindex_protocol::IndexKind;
use docindex_search::DEFAULT_CHUNK_SIZE;
use docindex_vector_store::Embedder;
use log::warn;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds an unopened index of a kind under a fresh identifier.
type CreateFn = Arc<dyn Fn(&IndexKind, String) -> Result<Box<dyn Index>> + Send + Sync>;

/// Rebuilds an index from its persisted payload under its stored identifier.
type LoadFn = Arc<dyn Fn(&IndexKind, String, &[u8]) -> Result<Box<dyn Index>> + Send + Sync>;

/// Hands every vector index its own embedder handle, so closing one index never
/// releases the model under another.
pub type EmbedderFactory = Arc<dyn Fn(&VectorConfig) -> Arc<dyn Embedder> + Send + Sync>;

#[derive(Clone)]
struct Constructors {
    create: CreateFn,
    load: LoadFn,
}

pub struct IndexRegistry {
    constructors: BTreeMap<&'static str, Constructors>,
    ids: Arc<dyn IdGenerator>,
}

impl IndexRegistry {
    #[must_use]
    pub fn empty(ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            constructors: BTreeMap::new(),
            ids,
        }
    }

    /// Registry with every built-in kind. `vector` is only available when an embedder
    /// factory is supplied.
    #[must_use]
    pub fn builtin(
        ids: Arc<dyn IdGenerator>,
        vector: Option<(EmbedderFactory, VectorConfig)>,
    ) -> Self {
        let mut registry = Self::empty(ids);

        registry.register(
            IndexKind::SCHEMA_MATCH,
            |_, id| Ok(Box::new(SchemaMatchIndex::new(id)) as Box<dyn Index>),
            |_, id, payload| Ok(Box::new(SchemaMatchIndex::load(id, payload)?) as Box<dyn Index>),
        );

        registry.register(
            IndexKind::FIELD_MATCH,
            |kind, id| match kind {
                IndexKind::FieldMatch { field } => {
                    Ok(Box::new(FieldMatchIndex::new(id, field.clone())) as Box<dyn Index>)
                }
                other => Err(IndexerError::UnknownIndexKind(other.to_string())),
            },
            |kind, id, payload| {
                let index = FieldMatchIndex::load(id, payload)?;
                if index.kind() != kind {
                    return Err(IndexerError::InvariantViolation(format!(
                        "payload holds {} but header says {kind}",
                        index.kind()
                    )));
                }
                Ok(Box::new(index) as Box<dyn Index>)
            },
        );

        registry.register(
            IndexKind::FULL_TEXT,
            |_, id| Ok(Box::new(FullTextIndex::new(id, DEFAULT_CHUNK_SIZE)) as Box<dyn Index>),
            |_, id, payload| Ok(Box::new(FullTextIndex::load(id, payload)?) as Box<dyn Index>),
        );

        registry.register(
            IndexKind::GRAPH,
            |_, id| Ok(Box::new(GraphIndex::new(id)) as Box<dyn Index>),
            |_, id, payload| Ok(Box::new(GraphIndex::load(id, payload)?) as Box<dyn Index>),
        );

        if let Some((embedders, config)) = vector {
            let create_embedders = embedders.clone();
            let configured = config.clone();
            registry.register(
                IndexKind::VECTOR,
                move |_, id| {
                    let embedder = create_embedders(&config);
                    Ok(Box::new(VectorIndex::new(id, config.clone(), embedder)) as Box<dyn Index>)
                },
                move |_, id, payload| {
                    // A loaded index keeps the config it was built with; vectors from
                    // another model or dimension are not comparable.
                    let index = VectorIndex::load(id, payload, |config| embedders(config))?;
                    let drift = config_drift(index.config(), &configured);
                    if !drift.is_empty() {
                        warn!(
                            "Vector index {} keeps its stored config; configured {} differs. \
                             Drop the index to rebuild it with the new settings",
                            index.identifier(),
                            drift.join(", ")
                        );
                    }
                    Ok(Box::new(index) as Box<dyn Index>)
                },
            );
        }

        registry
    }

    pub fn register<C, L>(&mut self, discriminant: &'static str, create: C, load: L)
    where
        C: Fn(&IndexKind, String) -> Result<Box<dyn Index>> + Send + Sync + 'static,
        L: Fn(&IndexKind, String, &[u8]) -> Result<Box<dyn Index>> + Send + Sync + 'static,
    {
        let constructors = Constructors {
            create: Arc::new(create),
            load: Arc::new(load),
        };
        self.constructors.insert(discriminant, constructors);
    }

    #[must_use]
    pub fn supports(&self, discriminant: &str) -> bool {
        self.constructors.contains_key(discriminant)
    }

    fn constructors(&self, kind: &IndexKind) -> Result<&Constructors> {
        self.constructors
            .get(kind.discriminant())
            .ok_or_else(|| IndexerError::UnknownIndexKind(kind.to_string()))
    }

    /// Fresh index of `kind` with a newly generated identifier.
    pub fn create(&self, kind: &IndexKind) -> Result<Box<dyn Index>> {
        let constructors = self.constructors(kind)?;
        (constructors.create)(kind, self.ids.next_id())
    }

    pub fn load(&self, kind: &IndexKind, identifier: &str, payload: &[u8]) -> Result<Box<dyn Index>> {
        let constructors = self.constructors(kind)?;
        (constructors.load)(kind, identifier.to_string(), payload)
    }
}

/// Names of the settings where a stored vector config differs from the configured one.
fn config_drift(stored: &VectorConfig, configured: &VectorConfig) -> Vec<&'static str> {
    let mut drift = Vec::new();
    if stored.dimension != configured.dimension {
        drift.push("dimension");
    }
    if stored.combination != configured.combination {
        drift.push("combination");
    }
    if stored.min_similarity != configured.min_similarity {
        drift.push("min_similarity");
    }
    if stored.chunk_size != configured.chunk_size {
        drift.push("chunk_size");
    }
    drift
}

impl Default for IndexRegistry {
    fn default() -> Self {
        Self::builtin(Arc::new(RandomIdGenerator), None)
    }
}
