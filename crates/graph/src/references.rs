use docindex_protocol::{as_reference, IndexedObject, ObjectPointer};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// A structural reference found in object data: `(property path, target)`.
///
/// Paths join object keys with `.`; array positions are not part of the path, so every
/// element of `assignees: [..]` is reported under `assignees`.
pub type Reference = (String, ObjectPointer);

#[must_use]
pub fn collect_references(data: &Map<String, Value>) -> BTreeSet<Reference> {
    let mut out = BTreeSet::new();
    for (key, value) in data {
        walk(key, value, &mut out);
    }
    out
}

fn walk(path: &str, value: &Value, out: &mut BTreeSet<Reference>) {
    if let Some(target) = as_reference(value) {
        out.insert((path.to_string(), target));
        return;
    }
    match value {
        Value::Array(items) => {
            for item in items {
                walk(path, item, out);
            }
        }
        Value::Object(map) => {
            for (key, nested) in map {
                walk(&format!("{path}.{key}"), nested, out);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
    }
}

/// Every adjacency contribution of one object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectEdges {
    pub references: BTreeSet<Reference>,
    /// `(source, target)` endpoints when the object is a relation.
    pub relation: Option<(ObjectPointer, ObjectPointer)>,
}

impl ObjectEdges {
    #[must_use]
    pub fn of(object: &IndexedObject) -> Self {
        Self {
            references: collect_references(&object.data),
            relation: object
                .relation
                .as_ref()
                .map(|r| (r.source.clone(), r.target.clone())),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.references.is_empty() && self.relation.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn p(id: &str) -> ObjectPointer {
        ObjectPointer::new("s", "d", id)
    }

    #[test]
    fn finds_nested_and_array_references() {
        let data = json!({
            "assignedTo": { "/": "s:d:john" },
            "meta": { "reviewer": { "/": "s:d:ann" } },
            "watchers": [{ "/": "s:d:bob" }, { "/": "s:d:john" }],
            "title": "Fix the roof",
        });
        let refs = collect_references(data.as_object().unwrap());
        let expected: BTreeSet<Reference> = [
            ("assignedTo".to_string(), p("john")),
            ("meta.reviewer".to_string(), p("ann")),
            ("watchers".to_string(), p("bob")),
            ("watchers".to_string(), p("john")),
        ]
        .into_iter()
        .collect();
        assert_eq!(refs, expected);
    }

    #[test]
    fn relation_endpoints_are_captured() {
        let object = IndexedObject::new("r1").with_relation(p("a"), p("b"));
        let edges = ObjectEdges::of(&object);
        assert_eq!(edges.relation, Some((p("a"), p("b"))));
        assert!(edges.references.is_empty());
        assert!(!edges.is_empty());
    }
}
