//! In-memory graph aggregate.
//!
//! Nodes live in an arena (`Vec<GraphNode>`); relationships reference
//! their endpoints by stable arena index rather than by pointer or
//! `Rc`/`Weak`, so cyclic references between nodes never become a
//! lifetime problem.

use std::collections::BTreeMap;
use std::collections::HashMap;

use tracing::warn;
use uuid::Uuid;

use relgraph_common::Property;

pub type NodeId = usize;

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: NodeId,
    pub node_type: String,
    pub key: String,
    pub field: String,
    pub properties: BTreeMap<String, Property>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
    Both,
}

#[derive(Debug, Clone)]
pub struct GraphRelationship {
    pub rel_type: String,
    pub direction: Direction,
    pub source_node: NodeId,
    pub target_node: NodeId,
    pub properties: BTreeMap<String, Property>,
}

/// Identity key a node is deduplicated on: `(type, key, field)`.
type NodeIdentity = (String, String, String);

#[derive(Debug, Default)]
pub struct GraphAggregate {
    nodes: Vec<GraphNode>,
    relationships: Vec<GraphRelationship>,
    index: HashMap<NodeIdentity, NodeId>,
}

impl GraphAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites a node. Dedup key is `(type, properties["id"],
    /// "id")`; on a duplicate the existing node's *entire* property map is
    /// replaced by `properties` (whole-map last-writer-wins — see
    /// DESIGN.md's Open Question resolution), not merged key by key.
    pub fn add_node(&mut self, node_type: &str, properties: BTreeMap<String, Property>) -> NodeId {
        let key = properties
            .get("id")
            .map(|v| v.as_key_string())
            .unwrap_or_default();
        let identity = (node_type.to_string(), key.clone(), "id".to_string());

        if let Some(&existing_id) = self.index.get(&identity) {
            self.nodes[existing_id].properties = properties;
            return existing_id;
        }

        let id = self.nodes.len();
        self.nodes.push(GraphNode {
            id,
            node_type: node_type.to_string(),
            key,
            field: "id".to_string(),
            properties,
        });
        self.index.insert(identity, id);
        id
    }

    /// Looks up a node by `(type, key)`, comparing keys as strings after
    /// normalization.
    fn find_node(&self, node_type: &str, key: &str, field: &str) -> Option<NodeId> {
        self.index
            .get(&(node_type.to_string(), key.to_string(), field.to_string()))
            .copied()
    }

    /// Resolves a relationship by `(type, key, field)` endpoints; drops
    /// the relationship with a warning if either endpoint cannot be
    /// resolved.
    #[allow(clippy::too_many_arguments)]
    pub fn add_relationship(
        &mut self,
        rel_type: &str,
        direction: Direction,
        source_type: &str,
        source_key: &str,
        source_field: &str,
        target_type: &str,
        target_key: &str,
        target_field: &str,
        properties: BTreeMap<String, Property>,
    ) {
        let source = self.find_node(source_type, source_key, source_field);
        let target = self.find_node(target_type, target_key, target_field);

        match (source, target) {
            (Some(source_node), Some(target_node)) => {
                self.relationships.push(GraphRelationship {
                    rel_type: rel_type.to_string(),
                    direction,
                    source_node,
                    target_node,
                    properties,
                });
            }
            _ => {
                warn!(
                    rel_type,
                    source_type,
                    source_key,
                    target_type,
                    target_key,
                    "dropping relationship: endpoint could not be resolved"
                );
            }
        }
    }

    /// Resolves endpoints by scanning for a `properties["id"]` matching
    /// either parameter (stringified), used when a relationship rule has
    /// no source rows of its own (pairing existing nodes).
    pub fn add_direct_relationship(
        &mut self,
        rel_type: &str,
        direction: Direction,
        source_id_value: &str,
        target_id_value: &str,
        properties: BTreeMap<String, Property>,
    ) {
        let find_by_id = |agg: &Self, value: &str| -> Option<NodeId> {
            agg.nodes
                .iter()
                .find(|n| n.properties.get("id").map(|v| v.as_key_string()).as_deref() == Some(value))
                .map(|n| n.id)
        };

        let source = find_by_id(self, source_id_value);
        let target = find_by_id(self, target_id_value);

        match (source, target) {
            (Some(source_node), Some(target_node)) => {
                self.relationships.push(GraphRelationship {
                    rel_type: rel_type.to_string(),
                    direction,
                    source_node,
                    target_node,
                    properties,
                });
            }
            _ => {
                warn!(rel_type, "dropping direct relationship: endpoint id not found");
            }
        }
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn relationships(&self) -> &[GraphRelationship] {
        &self.relationships
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }
}

/// Generates a synthesized unique id token, via `uuid` v4, for a node
/// missing one.
pub fn synthesize_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(id: &str) -> BTreeMap<String, Property> {
        let mut m = BTreeMap::new();
        m.insert("id".to_string(), Property::Str(id.to_string()));
        m
    }

    #[test]
    fn add_node_dedupes_and_overwrites_whole_map() {
        let mut agg = GraphAggregate::new();
        let id1 = agg.add_node("Actor", props("1"));

        let mut second = props("1");
        second.insert("name".to_string(), Property::Str("Penelope".to_string()));
        let id2 = agg.add_node("Actor", second);

        assert_eq!(id1, id2);
        assert_eq!(agg.node_count(), 1);
        assert_eq!(
            agg.nodes()[0].properties.get("name"),
            Some(&Property::Str("Penelope".to_string()))
        );
    }

    #[test]
    fn add_relationship_resolves_both_endpoints() {
        let mut agg = GraphAggregate::new();
        agg.add_node("Actor", props("1"));
        agg.add_node("Film", props("2"));

        agg.add_relationship(
            "ACTED_IN",
            Direction::Out,
            "Actor",
            "1",
            "id",
            "Film",
            "2",
            "id",
            BTreeMap::new(),
        );

        assert_eq!(agg.relationship_count(), 1);
    }

    #[test]
    fn unresolvable_relationship_endpoint_is_dropped() {
        let mut agg = GraphAggregate::new();
        agg.add_node("Actor", props("1"));

        agg.add_relationship(
            "ACTED_IN",
            Direction::Out,
            "Actor",
            "1",
            "id",
            "Film",
            "missing",
            "id",
            BTreeMap::new(),
        );

        assert_eq!(agg.relationship_count(), 0);
    }

    #[test]
    fn add_direct_relationship_scans_for_id_match() {
        let mut agg = GraphAggregate::new();
        agg.add_node("Actor", props("1"));
        agg.add_node("Film", props("2"));

        agg.add_direct_relationship("ACTED_IN", Direction::Out, "1", "2", BTreeMap::new());
        assert_eq!(agg.relationship_count(), 1);
    }
}
