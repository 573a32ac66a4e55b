use crate::ObjectPointer;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum GraphQueryKind {
    InboundReference,
    RelationSource,
    RelationTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GraphQuery {
    pub kind: GraphQueryKind,
    pub anchors: Vec<ObjectPointer>,
    /// Restrict inbound references to one property path.
    #[serde(default)]
    pub property: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TextQueryKind {
    Vector,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TextQuery {
    pub query: String,
    pub kind: TextQueryKind,
}

/// Query consumed by `find`.
///
/// Only one of `typenames`, `graph`, `text` (or `field_value` for field indexes) is
/// meaningful per call; each index rejects the parts it does not support.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IndexQuery {
    #[serde(default)]
    pub typenames: Vec<String>,
    #[serde(default)]
    pub inverted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<GraphQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_value: Option<serde_json::Value>,
}

impl IndexQuery {
    pub fn typenames<I, S>(typenames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            typenames: typenames.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn inverted(mut self) -> Self {
        self.inverted = true;
        self
    }

    pub fn text(query: impl Into<String>) -> Self {
        Self {
            text: Some(TextQuery {
                query: query.into(),
                kind: TextQueryKind::Text,
            }),
            ..Self::default()
        }
    }

    pub fn vector(query: impl Into<String>) -> Self {
        Self {
            text: Some(TextQuery {
                query: query.into(),
                kind: TextQueryKind::Vector,
            }),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn graph(kind: GraphQueryKind, anchors: Vec<ObjectPointer>, property: Option<&str>) -> Self {
        Self {
            graph: Some(GraphQuery {
                kind,
                anchors,
                property: property.map(str::to_string),
            }),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn field_value(value: serde_json::Value) -> Self {
        Self {
            field_value: Some(value),
            ..Self::default()
        }
    }

    /// True when the query carries only a type filter (possibly empty).
    #[must_use]
    pub fn is_type_query(&self) -> bool {
        self.graph.is_none() && self.text.is_none() && self.field_value.is_none()
    }
}

/// One hit returned by `find`. Higher rank sorts first for ranked kinds; membership
/// kinds report rank 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FindResult {
    pub pointer: ObjectPointer,
    pub rank: f32,
}

impl FindResult {
    #[must_use]
    pub fn new(pointer: ObjectPointer, rank: f32) -> Self {
        Self { pointer, rank }
    }

    #[must_use]
    pub fn unranked(pointer: ObjectPointer) -> Self {
        Self { pointer, rank: 0.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_wire_shape() {
        let query: IndexQuery = serde_json::from_value(json!({
            "typenames": [],
            "graph": { "kind": "inbound-reference", "anchors": ["s:d:john"], "property": "assignedTo" }
        }))
        .unwrap();
        let graph = query.graph.unwrap();
        assert_eq!(graph.kind, GraphQueryKind::InboundReference);
        assert_eq!(graph.anchors, vec![ObjectPointer::new("s", "d", "john")]);
        assert_eq!(graph.property.as_deref(), Some("assignedTo"));
    }

    #[test]
    fn type_query_detection() {
        assert!(IndexQuery::typenames(["A"]).is_type_query());
        assert!(!IndexQuery::text("hello").is_type_query());
    }
}
