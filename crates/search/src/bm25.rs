//! BM25 keyword ranking behind the pluggable [`TextSearch`] capability.

use crate::error::{Result, SearchError};
use std::collections::{HashMap, HashSet};

/// Term frequency saturation.
const K1: f32 = 1.2;
/// Length normalization.
const B: f32 = 0.75;

/// Full-text search capability used by the full-text index.
///
/// Implementations own their ranking; scores are only comparable within one engine.
pub trait TextSearch: Send + Sync {
    /// Replace the indexed content of `id` with `chunks`.
    fn insert(&mut self, id: &str, chunks: &[String]);

    /// Drop `id`; returns whether it was present.
    fn remove(&mut self, id: &str) -> bool;

    /// Rank documents against a free-text query, best first.
    fn search(&self, query: &str, limit: usize) -> Result<Vec<(String, f32)>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default)]
struct DocumentStats {
    term_freqs: HashMap<String, u32>,
    length: usize,
}

/// In-memory BM25 index with posting lists.
#[derive(Debug, Clone, Default)]
pub struct Bm25Index {
    documents: HashMap<String, DocumentStats>,
    postings: HashMap<String, HashSet<String>>,
    total_length: usize,
}

impl Bm25Index {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowercased alphanumeric terms; single characters are noise.
    #[must_use]
    pub fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|s| s.chars().count() > 1)
            .map(String::from)
            .collect()
    }

    fn average_length(&self) -> f32 {
        if self.documents.is_empty() {
            0.0
        } else {
            self.total_length as f32 / self.documents.len() as f32
        }
    }

    fn idf(&self, term: &str) -> f32 {
        let doc_freq = self.postings.get(term).map_or(0, HashSet::len) as f32;
        if doc_freq == 0.0 {
            return 0.0;
        }
        let n = self.documents.len() as f32;
        ((n - doc_freq + 0.5) / (doc_freq + 0.5) + 1.0).ln()
    }

    fn score(&self, doc: &DocumentStats, terms: &[String], avg_length: f32) -> f32 {
        let length = doc.length as f32;
        terms
            .iter()
            .map(|term| {
                let tf = doc.term_freqs.get(term).copied().unwrap_or(0) as f32;
                if tf == 0.0 {
                    return 0.0;
                }
                let norm = if avg_length > 0.0 {
                    length / avg_length
                } else {
                    1.0
                };
                self.idf(term) * (tf * (K1 + 1.0)) / (tf + K1 * (1.0 - B + B * norm))
            })
            .sum()
    }
}

impl TextSearch for Bm25Index {
    fn insert(&mut self, id: &str, chunks: &[String]) {
        self.remove(id);

        let mut stats = DocumentStats::default();
        for chunk in chunks {
            for token in Self::tokenize(chunk) {
                stats.length += 1;
                *stats.term_freqs.entry(token).or_insert(0) += 1;
            }
        }
        for term in stats.term_freqs.keys() {
            self.postings
                .entry(term.clone())
                .or_default()
                .insert(id.to_string());
        }
        self.total_length += stats.length;
        self.documents.insert(id.to_string(), stats);
    }

    fn remove(&mut self, id: &str) -> bool {
        let Some(stats) = self.documents.remove(id) else {
            return false;
        };
        for term in stats.term_freqs.keys() {
            if let Some(ids) = self.postings.get_mut(term) {
                ids.remove(id);
                if ids.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
        self.total_length -= stats.length;
        true
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<(String, f32)>> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let mut terms = Self::tokenize(query);
        terms.sort();
        terms.dedup();

        let candidates: HashSet<&String> = terms
            .iter()
            .filter_map(|term| self.postings.get(term))
            .flatten()
            .collect();

        let avg_length = self.average_length();
        let mut scored: Vec<(String, f32)> = candidates
            .into_iter()
            .filter_map(|id| {
                let doc = self.documents.get(id)?;
                let score = self.score(doc, &terms, avg_length);
                (score > 0.0).then(|| (id.clone(), score))
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(limit);
        log::debug!("BM25: query='{query}' -> {} hits", scored.len());
        Ok(scored)
    }

    fn len(&self) -> usize {
        self.documents.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(text: &str) -> Vec<String> {
        vec![text.to_string()]
    }

    #[test]
    fn ranks_matching_documents_first() {
        let mut index = Bm25Index::new();
        index.insert("a", &chunks("elephant seals migrate across the ocean"));
        index.insert("b", &chunks("warsaw weather will it rain"));
        index.insert("c", &chunks("seals seals seals"));

        let results = index.search("seals", 10).unwrap();
        let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert!(results[0].1 > results[1].1);
    }

    #[test]
    fn reinsert_replaces_content() {
        let mut index = Bm25Index::new();
        index.insert("a", &chunks("apples"));
        index.insert("a", &chunks("oranges"));
        assert_eq!(index.len(), 1);
        assert!(index.search("apples", 10).unwrap().is_empty());
        assert_eq!(index.search("oranges", 10).unwrap().len(), 1);
    }

    #[test]
    fn remove_drops_postings() {
        let mut index = Bm25Index::new();
        index.insert("a", &chunks("apples"));
        assert!(index.remove("a"));
        assert!(!index.remove("a"));
        assert!(index.is_empty());
        assert!(index.search("apples", 10).unwrap().is_empty());
    }

    #[test]
    fn blank_query_is_an_error() {
        let index = Bm25Index::new();
        assert!(matches!(index.search("  ", 10), Err(SearchError::EmptyQuery)));
    }
}
