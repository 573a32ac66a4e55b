use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

const SEPARATOR: char = ':';
const LEGACY_SEPARATOR: char = '|';

/// Stable identity of an object inside a versioned document.
///
/// Encoded as `"{space}:{document}:{object}"`. The value is opaque to every index; only
/// the metadata tracker looks inside it to derive the legacy key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ObjectPointer(String);

impl ObjectPointer {
    #[must_use]
    pub fn new(space: &str, document: &str, object: &str) -> Self {
        Self(format!("{space}{SEPARATOR}{document}{SEPARATOR}{object}"))
    }

    /// Wrap an already encoded pointer without validating it.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Parse an encoded pointer, rejecting strings that do not have all three parts.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.splitn(3, SEPARATOR);
        let space = parts.next()?;
        let document = parts.next()?;
        let object = parts.next()?;
        if space.is_empty() || document.is_empty() || object.is_empty() {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn space_id(&self) -> Option<&str> {
        self.parts().map(|(space, _, _)| space)
    }

    #[must_use]
    pub fn document_id(&self) -> Option<&str> {
        self.parts().map(|(_, document, _)| document)
    }

    #[must_use]
    pub fn object_id(&self) -> Option<&str> {
        self.parts().map(|(_, _, object)| object)
    }

    /// Key used by stores written before the space id became part of the pointer.
    #[must_use]
    pub fn legacy_key(&self) -> Option<String> {
        self.parts()
            .map(|(_, document, object)| format!("{document}{LEGACY_SEPARATOR}{object}"))
    }

    fn parts(&self) -> Option<(&str, &str, &str)> {
        let mut parts = self.0.splitn(3, SEPARATOR);
        Some((parts.next()?, parts.next()?, parts.next()?))
    }
}

impl fmt::Display for ObjectPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectPointer {
    fn from(raw: &str) -> Self {
        Self::from_raw(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_three_parts() {
        let pointer = ObjectPointer::new("space", "doc", "obj");
        assert_eq!(pointer.as_str(), "space:doc:obj");
        assert_eq!(pointer.space_id(), Some("space"));
        assert_eq!(pointer.document_id(), Some("doc"));
        assert_eq!(pointer.object_id(), Some("obj"));
    }

    #[test]
    fn parse_rejects_partial_pointers() {
        assert!(ObjectPointer::parse("space:doc").is_none());
        assert!(ObjectPointer::parse("space::obj").is_none());
        assert_eq!(
            ObjectPointer::parse("s:d:o"),
            Some(ObjectPointer::new("s", "d", "o"))
        );
    }

    #[test]
    fn legacy_key_drops_space() {
        let pointer = ObjectPointer::new("space", "doc", "obj");
        assert_eq!(pointer.legacy_key().as_deref(), Some("doc|obj"));
        assert_eq!(ObjectPointer::from_raw("garbage").legacy_key(), None);
    }
}
