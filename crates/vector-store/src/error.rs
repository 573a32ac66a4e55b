use thiserror::Error;

pub type Result<T> = std::result::Result<T, VectorStoreError>;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedder '{0}' is not open")]
    NotOpen(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
