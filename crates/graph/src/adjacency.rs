use crate::error::{GraphError, Result};
use crate::references::ObjectEdges;
use docindex_protocol::ObjectPointer;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub type PointerSet = BTreeSet<ObjectPointer>;

/// The persisted shape of the graph: three adjacency maps, nothing derived.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjacencyMaps {
    /// target -> property path -> sources referencing the target through that path.
    pub inbound_references: BTreeMap<ObjectPointer, BTreeMap<String, PointerSet>>,
    /// source endpoint -> relations starting there.
    pub relation_sources: BTreeMap<ObjectPointer, PointerSet>,
    /// target endpoint -> relations ending there.
    pub relation_targets: BTreeMap<ObjectPointer, PointerSet>,
}

/// Reference/relation adjacency with a reverse map for O(edges) replacement.
#[derive(Debug, Clone, Default)]
pub struct ReferenceGraph {
    maps: AdjacencyMaps,
    outgoing: BTreeMap<ObjectPointer, ObjectEdges>,
}

impl ReferenceGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn maps(&self) -> &AdjacencyMaps {
        &self.maps
    }

    #[must_use]
    pub fn contains(&self, pointer: &ObjectPointer) -> bool {
        self.outgoing.contains_key(pointer)
    }

    /// Number of objects contributing at least one edge.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outgoing.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outgoing.is_empty()
    }

    /// Replace the edges contributed by `pointer`; returns whether anything changed.
    pub fn set_edges(&mut self, pointer: &ObjectPointer, edges: ObjectEdges) -> bool {
        let current = self.outgoing.get(pointer);
        if current == Some(&edges) || (current.is_none() && edges.is_empty()) {
            return false;
        }
        self.remove(pointer);
        if edges.is_empty() {
            return true;
        }
        self.link(pointer, &edges);
        self.outgoing.insert(pointer.clone(), edges);
        true
    }

    /// Drop every edge contributed by `pointer`; returns whether it had any.
    pub fn remove(&mut self, pointer: &ObjectPointer) -> bool {
        let Some(edges) = self.outgoing.remove(pointer) else {
            return false;
        };
        for (path, target) in &edges.references {
            if let Some(by_path) = self.maps.inbound_references.get_mut(target) {
                if let Some(sources) = by_path.get_mut(path) {
                    sources.remove(pointer);
                    if sources.is_empty() {
                        by_path.remove(path);
                    }
                }
                if by_path.is_empty() {
                    self.maps.inbound_references.remove(target);
                }
            }
        }
        if let Some((source, target)) = &edges.relation {
            unlink(&mut self.maps.relation_sources, source, pointer);
            unlink(&mut self.maps.relation_targets, target, pointer);
        }
        true
    }

    fn link(&mut self, pointer: &ObjectPointer, edges: &ObjectEdges) {
        for (path, target) in &edges.references {
            self.maps
                .inbound_references
                .entry(target.clone())
                .or_default()
                .entry(path.clone())
                .or_default()
                .insert(pointer.clone());
        }
        if let Some((source, target)) = &edges.relation {
            self.maps
                .relation_sources
                .entry(source.clone())
                .or_default()
                .insert(pointer.clone());
            self.maps
                .relation_targets
                .entry(target.clone())
                .or_default()
                .insert(pointer.clone());
        }
    }

    /// Objects referencing `anchor`, optionally only through `property`.
    #[must_use]
    pub fn inbound(&self, anchor: &ObjectPointer, property: Option<&str>) -> PointerSet {
        let Some(by_path) = self.maps.inbound_references.get(anchor) else {
            return PointerSet::new();
        };
        match property {
            Some(path) => by_path.get(path).cloned().unwrap_or_default(),
            None => by_path.values().flatten().cloned().collect(),
        }
    }

    /// Relations whose source endpoint is `anchor`.
    #[must_use]
    pub fn relations_from(&self, anchor: &ObjectPointer) -> PointerSet {
        self.maps
            .relation_sources
            .get(anchor)
            .cloned()
            .unwrap_or_default()
    }

    /// Relations whose target endpoint is `anchor`.
    #[must_use]
    pub fn relations_to(&self, anchor: &ObjectPointer) -> PointerSet {
        self.maps
            .relation_targets
            .get(anchor)
            .cloned()
            .unwrap_or_default()
    }

    /// Rebuild the graph from persisted maps, validating their consistency.
    pub fn from_maps(maps: AdjacencyMaps) -> Result<Self> {
        let mut outgoing: BTreeMap<ObjectPointer, ObjectEdges> = BTreeMap::new();

        for (target, by_path) in &maps.inbound_references {
            if by_path.is_empty() {
                return Err(GraphError::InvalidAdjacency(format!(
                    "empty inbound entry for {target}"
                )));
            }
            // An empty path is legal: it is the reference stored under the key "".
            for (path, sources) in by_path {
                if sources.is_empty() {
                    return Err(GraphError::InvalidAdjacency(format!(
                        "empty property bucket for {target}"
                    )));
                }
                for source in sources {
                    outgoing
                        .entry(source.clone())
                        .or_default()
                        .references
                        .insert((path.clone(), target.clone()));
                }
            }
        }

        let mut sources_of: BTreeMap<ObjectPointer, ObjectPointer> = BTreeMap::new();
        for (endpoint, relations) in &maps.relation_sources {
            if relations.is_empty() {
                return Err(GraphError::InvalidAdjacency(format!(
                    "empty relation-source entry for {endpoint}"
                )));
            }
            for relation in relations {
                if sources_of.insert(relation.clone(), endpoint.clone()).is_some() {
                    return Err(GraphError::InvalidAdjacency(format!(
                        "relation {relation} has more than one source"
                    )));
                }
            }
        }

        let mut targets_of: BTreeMap<ObjectPointer, ObjectPointer> = BTreeMap::new();
        for (endpoint, relations) in &maps.relation_targets {
            if relations.is_empty() {
                return Err(GraphError::InvalidAdjacency(format!(
                    "empty relation-target entry for {endpoint}"
                )));
            }
            for relation in relations {
                if targets_of.insert(relation.clone(), endpoint.clone()).is_some() {
                    return Err(GraphError::InvalidAdjacency(format!(
                        "relation {relation} has more than one target"
                    )));
                }
            }
        }

        if sources_of.len() != targets_of.len() {
            return Err(GraphError::InvalidAdjacency(
                "relation sources and targets disagree".to_string(),
            ));
        }
        for (relation, source) in sources_of {
            let target = targets_of.remove(&relation).ok_or_else(|| {
                GraphError::InvalidAdjacency(format!("relation {relation} has no target"))
            })?;
            outgoing.entry(relation).or_default().relation = Some((source, target));
        }

        Ok(Self { maps, outgoing })
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.maps)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let maps: AdjacencyMaps = serde_json::from_slice(bytes)?;
        let graph = Self::from_maps(maps)?;
        log::debug!("Loaded reference graph with {} sources", graph.outgoing.len());
        Ok(graph)
    }
}

fn unlink(
    map: &mut BTreeMap<ObjectPointer, PointerSet>,
    endpoint: &ObjectPointer,
    relation: &ObjectPointer,
) {
    if let Some(relations) = map.get_mut(endpoint) {
        relations.remove(relation);
        if relations.is_empty() {
            map.remove(endpoint);
        }
    }
}
