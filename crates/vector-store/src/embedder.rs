use crate::error::{Result, VectorStoreError};
use crate::store::normalize;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

/// Pluggable embedding model.
///
/// `open` acquires whatever backs the model and `close` releases it; `close` must be
/// safe to call after a failed or partial `open`.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// One vector per input text, each of [`Embedder::dimension`] floats.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Deterministic feature-hashing embedder.
///
/// Every token is hashed into one of `dimension` signed buckets and the result is
/// L2-normalized, so texts sharing vocabulary land close together. Needs no model
/// files, which makes it the default for hosts without an embedding runtime.
pub struct HashingEmbedder {
    model_id: String,
    dimension: usize,
    open: AtomicBool,
}

impl HashingEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            model_id: format!("hashing-{dimension}"),
            dimension,
            open: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&bytes[..8]);
            let slot = (u64::from_le_bytes(bucket) % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }
        normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn open(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(VectorStoreError::EmbeddingError(
                "dimension must be positive".to_string(),
            ));
        }
        self.open.store(true, Ordering::Release);
        log::debug!("Opened embedder {}", self.model_id);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.open.swap(false, Ordering::AcqRel) {
            log::debug!("Closed embedder {}", self.model_id);
        }
        Ok(())
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if !self.is_open() {
            return Err(VectorStoreError::NotOpen(self.model_id.clone()));
        }
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::cosine_similarity;

    #[tokio::test]
    async fn embeddings_are_normalized_and_deterministic() {
        let embedder = HashingEmbedder::new(64);
        embedder.open().await.unwrap();
        let texts = vec!["elephant seals".to_string(), "elephant seals".to_string()];
        let vectors = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].len(), 64);
        assert_eq!(vectors[0], vectors[1]);
        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn shared_vocabulary_is_closer() {
        let embedder = HashingEmbedder::new(256);
        embedder.open().await.unwrap();
        let texts = vec![
            "elephant seals migrate".to_string(),
            "seals migrate north".to_string(),
            "warsaw weather forecast".to_string(),
        ];
        let v = embedder.embed_batch(&texts).await.unwrap();
        assert!(cosine_similarity(&v[0], &v[1]) > cosine_similarity(&v[0], &v[2]));
    }

    #[tokio::test]
    async fn closed_embedder_refuses_work() {
        let embedder = HashingEmbedder::new(8);
        let err = embedder.embed_batch(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::NotOpen(_)));

        embedder.open().await.unwrap();
        embedder.close().await.unwrap();
        assert!(!embedder.is_open());
    }
}
