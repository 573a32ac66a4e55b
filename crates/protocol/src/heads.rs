use serde::{Deserialize, Serialize};
use std::fmt;

/// Version vector of a document: the set of content hashes it was observed at.
///
/// Hashes are kept sorted and deduplicated so that two equal frontiers always compare
/// (and encode) equal regardless of the order they were collected in.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Heads(Vec<String>);

impl Heads {
    pub fn new<I, S>(hashes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut hashes: Vec<String> = hashes.into_iter().map(Into::into).collect();
        hashes.sort();
        hashes.dedup();
        Self(hashes)
    }

    #[must_use]
    pub fn hashes(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<String>> for Heads {
    fn from(hashes: Vec<String>) -> Self {
        Self::new(hashes)
    }
}

impl From<Heads> for Vec<String> {
    fn from(heads: Heads) -> Self {
        heads.0
    }
}

impl fmt::Display for Heads {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_and_duplicates_do_not_matter() {
        let a = Heads::new(["b", "a", "b"]);
        let b = Heads::new(["a", "b"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn deserialization_normalizes() {
        let heads: Heads = serde_json::from_str(r#"["z","a","z"]"#).unwrap();
        assert_eq!(heads.hashes(), ["a".to_string(), "z".to_string()]);
        assert_eq!(serde_json::to_string(&heads).unwrap(), r#"["a","z"]"#);
    }
}
