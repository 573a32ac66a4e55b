use super::{unsupported_query, Index};
use crate::{IndexerError, Result};
use async_trait::async_trait;
use docindex_graph::{ObjectEdges, PointerSet, ReferenceGraph};
use docindex_protocol::{
    FindResult, GraphQueryKind, IndexKind, IndexQuery, IndexedObject, ObjectPointer,
};

/// Reference and relation adjacency between objects.
pub struct GraphIndex {
    identifier: String,
    kind: IndexKind,
    graph: ReferenceGraph,
}

impl GraphIndex {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            kind: IndexKind::Graph,
            graph: ReferenceGraph::new(),
        }
    }

    pub fn load(identifier: impl Into<String>, payload: &[u8]) -> Result<Self> {
        Ok(Self {
            identifier: identifier.into(),
            kind: IndexKind::Graph,
            graph: ReferenceGraph::from_json(payload)?,
        })
    }

    #[must_use]
    pub fn graph(&self) -> &ReferenceGraph {
        &self.graph
    }
}

#[async_trait]
impl Index for GraphIndex {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn kind(&self) -> &IndexKind {
        &self.kind
    }

    async fn update(&mut self, pointer: &ObjectPointer, object: &IndexedObject) -> Result<bool> {
        Ok(self.graph.set_edges(pointer, ObjectEdges::of(object)))
    }

    async fn remove(&mut self, pointer: &ObjectPointer) -> Result<bool> {
        Ok(self.graph.remove(pointer))
    }

    async fn find(&self, query: &IndexQuery) -> Result<Vec<FindResult>> {
        let Some(graph_query) = &query.graph else {
            return Err(unsupported_query(&self.kind, "queries without a graph part"));
        };
        if query.text.is_some() {
            return Err(unsupported_query(&self.kind, "text queries"));
        }

        let property = graph_query.property.as_deref();
        if property.is_some() && graph_query.kind != GraphQueryKind::InboundReference {
            return Err(IndexerError::InvariantViolation(
                "property filter only applies to inbound-reference queries".to_string(),
            ));
        }

        let mut hits = PointerSet::new();
        for anchor in &graph_query.anchors {
            let found = match graph_query.kind {
                GraphQueryKind::InboundReference => self.graph.inbound(anchor, property),
                GraphQueryKind::RelationSource => self.graph.relations_from(anchor),
                GraphQueryKind::RelationTarget => self.graph.relations_to(anchor),
            };
            hits.extend(found);
        }
        Ok(hits.into_iter().map(FindResult::unranked).collect())
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        Ok(self.graph.to_json()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docindex_protocol::reference;
    use pretty_assertions::assert_eq;

    fn p(id: &str) -> ObjectPointer {
        ObjectPointer::new("s", "d", id)
    }

    fn pointers(results: Vec<FindResult>) -> Vec<ObjectPointer> {
        results.into_iter().map(|r| r.pointer).collect()
    }

    async fn populated() -> GraphIndex {
        let mut index = GraphIndex::new("graph");
        let task = IndexedObject::new("task1")
            .with_typename("Task")
            .with_field("assignedTo", reference(&p("john")));
        assert!(index.update(&p("task1"), &task).await.unwrap());
        assert!(!index.update(&p("task1"), &task).await.unwrap());

        let review = IndexedObject::new("task2").with_field("reviewer", reference(&p("john")));
        index.update(&p("task2"), &review).await.unwrap();

        let relation = IndexedObject::new("rel").with_relation(p("john"), p("ann"));
        index.update(&p("rel"), &relation).await.unwrap();
        index
    }

    #[tokio::test]
    async fn inbound_reference_by_property() {
        let index = populated().await;
        let query = IndexQuery::graph(
            GraphQueryKind::InboundReference,
            vec![p("john")],
            Some("assignedTo"),
        );
        assert_eq!(pointers(index.find(&query).await.unwrap()), vec![p("task1")]);

        let any = IndexQuery::graph(GraphQueryKind::InboundReference, vec![p("john")], None);
        assert_eq!(
            pointers(index.find(&any).await.unwrap()),
            vec![p("task1"), p("task2")]
        );
    }

    #[tokio::test]
    async fn relation_endpoints() {
        let index = populated().await;
        let from = IndexQuery::graph(GraphQueryKind::RelationSource, vec![p("john")], None);
        let to = IndexQuery::graph(GraphQueryKind::RelationTarget, vec![p("ann")], None);
        assert_eq!(pointers(index.find(&from).await.unwrap()), vec![p("rel")]);
        assert_eq!(pointers(index.find(&to).await.unwrap()), vec![p("rel")]);

        let filtered = IndexQuery::graph(
            GraphQueryKind::RelationSource,
            vec![p("john")],
            Some("assignedTo"),
        );
        assert!(matches!(
            index.find(&filtered).await,
            Err(IndexerError::InvariantViolation(_))
        ));
    }

    #[tokio::test]
    async fn removal_and_round_trip() {
        let mut index = populated().await;
        let restored = GraphIndex::load("graph", &index.serialize().unwrap()).unwrap();
        assert_eq!(restored.graph().maps(), index.graph().maps());

        assert!(index.remove(&p("task1")).await.unwrap());
        let query = IndexQuery::graph(
            GraphQueryKind::InboundReference,
            vec![p("john")],
            Some("assignedTo"),
        );
        assert!(index.find(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reference_under_empty_key_round_trips() {
        let mut index = GraphIndex::new("graph");
        let note = IndexedObject::new("note").with_field("", reference(&p("john")));
        assert!(index.update(&p("note"), &note).await.unwrap());

        let restored = GraphIndex::load("graph", &index.serialize().unwrap()).unwrap();
        let query = IndexQuery::graph(GraphQueryKind::InboundReference, vec![p("john")], Some(""));
        assert_eq!(pointers(restored.find(&query).await.unwrap()), vec![p("note")]);
    }

    #[tokio::test]
    async fn type_query_is_rejected() {
        let index = populated().await;
        assert!(matches!(
            index.find(&IndexQuery::typenames(["Task"])).await,
            Err(IndexerError::InvariantViolation(_))
        ));
    }
}
