use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    ConfigError(#[from] toml::de::Error),

    #[error("Search error: {0}")]
    SearchError(#[from] docindex_search::SearchError),

    #[error("Vector store error: {0}")]
    VectorStoreError(#[from] docindex_vector_store::VectorStoreError),

    #[error("Graph error: {0}")]
    GraphError(#[from] docindex_graph::GraphError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupt snapshot record '{identifier}': {reason}")]
    CorruptRecord { identifier: String, reason: String },

    #[error("Unsupported snapshot format version {found} (expected {expected})")]
    UnsupportedFormatVersion { found: u32, expected: u32 },

    #[error("Unknown index kind '{0}'")]
    UnknownIndexKind(String),

    #[error("Snapshot record '{0}' not found")]
    RecordNotFound(String),

    #[error("No index registered for kind {0}")]
    IndexNotFound(String),

    #[error("Invalid object pointer '{0}': expected space:document:object")]
    InvalidPointer(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Indexing engine is closed")]
    Disposed,

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Whether a failed snapshot load means the stored payload itself is unusable, as
    /// opposed to the store or the engine failing while reading it.
    #[must_use]
    pub fn is_damaged_record(&self) -> bool {
        matches!(
            self,
            Self::CorruptRecord { .. }
                | Self::UnsupportedFormatVersion { .. }
                | Self::JsonError(_)
                | Self::SearchError(_)
                | Self::VectorStoreError(_)
                | Self::GraphError(_)
                | Self::InvariantViolation(_)
        )
    }
}
