use crate::embedder::Embedder;
use crate::error::{Result, VectorStoreError};
use crate::store::normalize;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// How per-chunk embeddings collapse into one document vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkCombination {
    /// Element-wise mean of chunk vectors.
    #[default]
    Mean,
    /// Element-wise max of chunk vectors.
    Max,
    /// No chunking: all text is embedded as a single input.
    Disabled,
}

/// Combine chunk vectors according to `policy` and normalize the result.
///
/// `Disabled` expects exactly the single vector produced for the joined text.
pub fn combine(vectors: &[Vec<f32>], dimension: usize, policy: ChunkCombination) -> Result<Vec<f32>> {
    if vectors.is_empty() {
        return Err(VectorStoreError::EmbeddingError(
            "no vectors to combine".to_string(),
        ));
    }
    for vector in vectors {
        if vector.len() != dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }
    }

    let flat: Vec<f32> = vectors.iter().flatten().copied().collect();
    let matrix = Array2::from_shape_vec((vectors.len(), dimension), flat)
        .map_err(|e| VectorStoreError::EmbeddingError(e.to_string()))?;

    let mut combined: Vec<f32> = match policy {
        ChunkCombination::Mean | ChunkCombination::Disabled => matrix
            .mean_axis(Axis(0))
            .map(|row| row.to_vec())
            .unwrap_or_else(|| vec![0.0; dimension]),
        ChunkCombination::Max => matrix
            .fold_axis(Axis(0), f32::NEG_INFINITY, |acc, v| acc.max(*v))
            .to_vec(),
    };
    normalize(&mut combined);
    Ok(combined)
}

/// Embed document chunks into one vector of the embedder's dimension.
pub async fn embed_chunks(
    embedder: &dyn Embedder,
    chunks: &[String],
    policy: ChunkCombination,
) -> Result<Vec<f32>> {
    let inputs = match policy {
        ChunkCombination::Disabled => vec![chunks.concat()],
        ChunkCombination::Mean | ChunkCombination::Max => chunks.to_vec(),
    };
    let vectors = embedder.embed_batch(&inputs).await?;
    if vectors.len() != inputs.len() {
        return Err(VectorStoreError::EmbeddingError(format!(
            "embedder returned {} vectors for {} inputs",
            vectors.len(),
            inputs.len()
        )));
    }
    combine(&vectors, embedder.dimension(), policy)
}
