use docindex_protocol::as_reference;
use serde_json::{Map, Value};

/// Collect every string leaf of an object's data, depth first in key order.
///
/// Reference-typed values are skipped: they carry identity, not text. Blank strings
/// are dropped so an object without prose yields no blocks at all.
#[must_use]
pub fn extract_text_blocks(data: &Map<String, Value>) -> Vec<String> {
    let mut blocks = Vec::new();
    for value in data.values() {
        collect(value, &mut blocks);
    }
    blocks
}

fn collect(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(text) => {
            if !text.trim().is_empty() {
                out.push(text.clone());
            }
        }
        Value::Array(items) => {
            for item in items {
                collect(item, out);
            }
        }
        Value::Object(map) => {
            if as_reference(value).is_some() {
                return;
            }
            for nested in map.values() {
                collect(nested, out);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn data(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn collects_nested_strings_in_key_order() {
        let blocks = extract_text_blocks(&data(json!({
            "title": "Quarterly report",
            "body": { "intro": "Revenue grew.", "count": 3 },
            "tags": ["finance", "", "q3"],
        })));
        assert_eq!(
            blocks,
            vec!["Revenue grew.", "finance", "q3", "Quarterly report"]
        );
    }

    #[test]
    fn skips_references() {
        let blocks = extract_text_blocks(&data(json!({
            "assignedTo": { "/": "space:doc:john" },
            "name": "Fix the roof",
        })));
        assert_eq!(blocks, vec!["Fix the roof"]);
    }

    #[test]
    fn object_without_text_yields_nothing() {
        assert!(extract_text_blocks(&data(json!({ "n": 1, "flag": true }))).is_empty());
    }
}
