use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Invalid adjacency data: {0}")]
    InvalidAdjacency(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
