use crate::error::{Result, VectorStoreError};
use docindex_protocol::ObjectPointer;
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scale `vector` to unit length in place; zero vectors are left untouched.
pub fn normalize(vector: &mut [f32]) {
    let norm = ArrayView1::from(&*vector).dot(&ArrayView1::from(&*vector)).sqrt();
    if norm > f32::EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let a = ArrayView1::from(a);
    let b = ArrayView1::from(b);
    let denom = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if denom <= f32::EPSILON {
        0.0
    } else {
        a.dot(&b) / denom
    }
}

/// Flat (exhaustive) vector store keyed by object pointer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStore {
    dimension: usize,
    vectors: BTreeMap<ObjectPointer, Vec<f32>>,
}

impl VectorStore {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    #[must_use]
    pub fn contains(&self, pointer: &ObjectPointer) -> bool {
        self.vectors.contains_key(pointer)
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        if actual == self.dimension {
            Ok(())
        } else {
            Err(VectorStoreError::DimensionMismatch {
                expected: self.dimension,
                actual,
            })
        }
    }

    /// Store `vector` for `pointer`; returns whether the stored value changed.
    pub fn upsert(&mut self, pointer: ObjectPointer, vector: Vec<f32>) -> Result<bool> {
        self.check_dimension(vector.len())?;
        if self.vectors.get(&pointer) == Some(&vector) {
            return Ok(false);
        }
        self.vectors.insert(pointer, vector);
        Ok(true)
    }

    pub fn remove(&mut self, pointer: &ObjectPointer) -> bool {
        self.vectors.remove(pointer).is_some()
    }

    /// Cosine search returning hits at or above `min_similarity`, best first.
    pub fn search(
        &self,
        query: &[f32],
        min_similarity: f32,
        limit: usize,
    ) -> Result<Vec<(ObjectPointer, f32)>> {
        self.check_dimension(query.len())?;

        let mut hits: Vec<(ObjectPointer, f32)> = self
            .vectors
            .iter()
            .map(|(pointer, vector)| (pointer.clone(), cosine_similarity(query, vector)))
            .filter(|(_, score)| score.is_finite() && *score >= min_similarity)
            .collect();

        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        hits.truncate(limit);
        Ok(hits)
    }

    /// Reject stores whose vectors disagree with the declared dimension.
    pub fn validate(&self) -> Result<()> {
        for vector in self.vectors.values() {
            self.check_dimension(vector.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn p(id: &str) -> ObjectPointer {
        ObjectPointer::new("s", "d", id)
    }

    #[test]
    fn upsert_reports_changes() {
        let mut store = VectorStore::new(2);
        assert!(store.upsert(p("a"), vec![1.0, 0.0]).unwrap());
        assert!(!store.upsert(p("a"), vec![1.0, 0.0]).unwrap());
        assert!(store.upsert(p("a"), vec![0.0, 1.0]).unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let mut store = VectorStore::new(3);
        let err = store.upsert(p("a"), vec![1.0]).unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::DimensionMismatch {
                expected: 3,
                actual: 1
            }
        ));
        assert!(store.search(&[1.0, 0.0], 0.0, 10).is_err());
    }

    #[test]
    fn search_filters_by_similarity() {
        let mut store = VectorStore::new(2);
        store.upsert(p("east"), vec![1.0, 0.0]).unwrap();
        store.upsert(p("north"), vec![0.0, 1.0]).unwrap();
        store.upsert(p("northeast"), vec![0.7071, 0.7071]).unwrap();

        let hits = store.search(&[1.0, 0.0], 0.5, 10).unwrap();
        let ids: Vec<_> = hits.iter().map(|(pointer, _)| pointer.clone()).collect();
        assert_eq!(ids, vec![p("east"), p("northeast")]);
    }

    #[test]
    fn normalize_handles_zero() {
        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);

        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);
    }
}
