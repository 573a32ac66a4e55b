use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration identity of one index.
///
/// Two kinds are equal iff their discriminant and parameters match; this equality is
/// what joins persisted snapshot records to the indexes configured at runtime.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum IndexKind {
    SchemaMatch,
    FullText,
    Vector,
    Graph,
    FieldMatch { field: String },
}

impl IndexKind {
    pub const SCHEMA_MATCH: &'static str = "schema-match";
    pub const FULL_TEXT: &'static str = "full-text";
    pub const VECTOR: &'static str = "vector";
    pub const GRAPH: &'static str = "graph";
    pub const FIELD_MATCH: &'static str = "field-match";

    pub fn field_match(field: impl Into<String>) -> Self {
        Self::FieldMatch {
            field: field.into(),
        }
    }

    #[must_use]
    pub const fn discriminant(&self) -> &'static str {
        match self {
            Self::SchemaMatch => Self::SCHEMA_MATCH,
            Self::FullText => Self::FULL_TEXT,
            Self::Vector => Self::VECTOR,
            Self::Graph => Self::GRAPH,
            Self::FieldMatch { .. } => Self::FIELD_MATCH,
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldMatch { field } => write!(f, "{}({field})", self.discriminant()),
            other => f.write_str(other.discriminant()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn serializes_with_kind_tag() {
        assert_eq!(
            serde_json::to_value(IndexKind::FullText).unwrap(),
            json!({ "kind": "full-text" })
        );
        assert_eq!(
            serde_json::to_value(IndexKind::field_match("status")).unwrap(),
            json!({ "kind": "field-match", "field": "status" })
        );
    }

    #[test]
    fn equality_includes_parameters() {
        assert_eq!(IndexKind::field_match("a"), IndexKind::field_match("a"));
        assert_ne!(IndexKind::field_match("a"), IndexKind::field_match("b"));
        assert_eq!(IndexKind::field_match("a").discriminant(), "field-match");
        assert_eq!(IndexKind::field_match("a").to_string(), "field-match(a)");
    }
}
