//! Tests for ReferenceGraph operations

use docindex_graph::{ObjectEdges, ReferenceGraph};
use docindex_protocol::{reference, IndexedObject, ObjectPointer};
use serde_json::json;

fn p(id: &str) -> ObjectPointer {
    ObjectPointer::new("space", "doc", id)
}

fn edges(object: IndexedObject) -> ObjectEdges {
    ObjectEdges::of(&object)
}

#[test]
fn test_inbound_union_over_properties() {
    let mut graph = ReferenceGraph::new();

    graph.set_edges(
        &p("task1"),
        edges(IndexedObject::new("task1").with_field("assignedTo", reference(&p("john")))),
    );
    graph.set_edges(
        &p("task2"),
        edges(IndexedObject::new("task2").with_field("reviewer", reference(&p("john")))),
    );

    let all = graph.inbound(&p("john"), None);
    assert_eq!(all.len(), 2);

    let assigned = graph.inbound(&p("john"), Some("assignedTo"));
    assert_eq!(assigned.into_iter().collect::<Vec<_>>(), vec![p("task1")]);
}

#[test]
fn test_remove_clears_every_map() {
    let mut graph = ReferenceGraph::new();

    let object = IndexedObject::new("rel")
        .with_relation(p("john"), p("acme"))
        .with_field("notes", json!([{ "/": "space:doc:ann" }]));
    graph.set_edges(&p("rel"), edges(object));

    assert_eq!(graph.len(), 1);
    assert!(graph.remove(&p("rel")));
    assert!(!graph.remove(&p("rel")));

    let maps = graph.maps();
    assert!(maps.inbound_references.is_empty());
    assert!(maps.relation_sources.is_empty());
    assert!(maps.relation_targets.is_empty());
}

#[test]
fn test_serialized_shape_is_a_plain_map_dump() {
    let mut graph = ReferenceGraph::new();
    graph.set_edges(
        &p("task1"),
        edges(IndexedObject::new("task1").with_field("assignedTo", reference(&p("john")))),
    );

    let value: serde_json::Value = serde_json::from_slice(&graph.to_json().unwrap()).unwrap();
    assert_eq!(
        value,
        json!({
            "inboundReferences": { "space:doc:john": { "assignedTo": ["space:doc:task1"] } },
            "relationSources": {},
            "relationTargets": {},
        })
    );
}
