//! Graph-performance mapper: projects a [`PerformanceSnapshot`] onto the
//! graph's nodes and edges so the realtime layer can push per-node/per-edge
//! load data without recomputing it per subscriber.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use relgraph_graph::GraphAggregate;

use crate::analyzer::{detect_hotspots, HotspotWeights};
use crate::snapshot::PerformanceSnapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePerformance {
    pub node_type: String,
    pub node_key: String,
    pub avg_latency_ms: f64,
    pub hotspot_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgePerformance {
    pub rel_type: String,
    pub load_factor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceGraphData {
    pub nodes: Vec<NodePerformance>,
    pub edges: Vec<EdgePerformance>,
    pub collected_at: chrono::DateTime<chrono::Utc>,
}

/// Normalizes a graph node type or table name for matching against
/// statement digest text, which is lowercase SQL.
fn normalize(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Maps a snapshot onto a graph aggregate: each node's table (its type,
/// lowercased) is matched against statement digests that mention that
/// table name, and each relationship type is matched against join
/// digests whose text mentions both endpoint tables.
pub fn map_performance_to_graph(
    snapshot: &PerformanceSnapshot,
    aggregate: &GraphAggregate,
) -> PerformanceGraphData {
    let hotspots = detect_hotspots(snapshot, HotspotWeights::default());
    let hotspot_by_text: BTreeMap<&str, f64> =
        hotspots.iter().map(|h| (h.subject.as_str(), h.score)).collect();

    let mut latency_by_table: BTreeMap<String, (f64, u64)> = BTreeMap::new();
    for digest in &snapshot.statement_digests {
        let text = normalize(&digest.digest_text);
        for node in aggregate.nodes() {
            let table = normalize(&node.node_type);
            if text.contains(&table) {
                let entry = latency_by_table.entry(node.node_type.clone()).or_insert((0.0, 0));
                entry.0 += digest.avg_latency_ms * digest.count_star as f64;
                entry.1 += digest.count_star;
            }
        }
    }

    let nodes = aggregate
        .nodes()
        .iter()
        .map(|node| {
            let avg_latency_ms = latency_by_table
                .get(&node.node_type)
                .map(|(sum, count)| if *count > 0 { sum / *count as f64 } else { 0.0 })
                .unwrap_or(0.0);
            let hotspot_score = snapshot
                .statement_digests
                .iter()
                .filter(|d| normalize(&d.digest_text).contains(&normalize(&node.node_type)))
                .filter_map(|d| hotspot_by_text.get(d.digest_text.as_str()))
                .cloned()
                .fold(0.0_f64, f64::max);
            NodePerformance {
                node_type: node.node_type.clone(),
                node_key: node.key.clone(),
                avg_latency_ms,
                hotspot_score,
            }
        })
        .collect();

    let edges = aggregate
        .relationships()
        .iter()
        .map(|rel| {
            let source_table = normalize(&aggregate.nodes()[rel.source_node].node_type);
            let target_table = normalize(&aggregate.nodes()[rel.target_node].node_type);
            let load_factor = snapshot
                .statement_digests
                .iter()
                .filter(|d| matches!(d.relationship_kind, crate::snapshot::RelationshipKind::Join))
                .filter(|d| {
                    let text = normalize(&d.digest_text);
                    text.contains(&source_table) && text.contains(&target_table)
                })
                .map(|d| d.count_star as f64)
                .sum::<f64>();
            EdgePerformance { rel_type: rel.rel_type.clone(), load_factor }
        })
        .collect();

    PerformanceGraphData { nodes, edges, collected_at: snapshot.collected_at }
}

/// Holds exactly one slot for the most recently mapped result behind a
/// single `parking_lot::RwLock`, not a history buffer.
#[derive(Default)]
pub struct GraphPerformanceMapper {
    current: RwLock<Option<PerformanceGraphData>>,
}

impl GraphPerformanceMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, snapshot: &PerformanceSnapshot, aggregate: &GraphAggregate) -> PerformanceGraphData {
        let mapped = map_performance_to_graph(snapshot, aggregate);
        let mut slot = self.current.write();
        *slot = Some(mapped.clone());
        mapped
    }

    pub fn current(&self) -> Option<PerformanceGraphData> {
        self.current.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgraph_common::Property;
    use relgraph_graph::{Direction, GraphAggregate};
    use std::collections::BTreeMap;

    fn sample_snapshot() -> PerformanceSnapshot {
        PerformanceSnapshot {
            statement_digests: vec![crate::snapshot::StatementDigestSummary {
                digest_text: "select * from actor join movie_cast".to_string(),
                count_star: 500,
                avg_latency_ms: 200.0,
                sum_latency_ms: 100_000.0,
                index_used: false,
                relationship_kind: crate::snapshot::RelationshipKind::Join,
            }],
            ..PerformanceSnapshot::empty(chrono::Utc::now())
        }
    }

    #[test]
    fn maps_latency_onto_matching_node_type() {
        let mut aggregate = GraphAggregate::new();
        let mut props = BTreeMap::new();
        props.insert("id".to_string(), Property::Str("1".to_string()));
        aggregate.add_node("Actor", props);

        let mapped = map_performance_to_graph(&sample_snapshot(), &aggregate);
        assert_eq!(mapped.nodes.len(), 1);
        assert!(mapped.nodes[0].avg_latency_ms > 0.0);
    }

    #[test]
    fn edge_load_factor_only_counts_matching_join_signature() {
        let mut aggregate = GraphAggregate::new();
        let mut actor_props = BTreeMap::new();
        actor_props.insert("id".to_string(), Property::Str("1".to_string()));
        aggregate.add_node("Actor", actor_props);
        let mut cast_props = BTreeMap::new();
        cast_props.insert("id".to_string(), Property::Str("2".to_string()));
        aggregate.add_node("MovieCast", cast_props);
        let mut other_props = BTreeMap::new();
        other_props.insert("id".to_string(), Property::Str("3".to_string()));
        aggregate.add_node("Studio", other_props);

        aggregate.add_relationship(
            "APPEARS_IN",
            Direction::Outgoing,
            "Actor",
            "1",
            "id",
            "MovieCast",
            "2",
            "id",
            BTreeMap::new(),
        );
        aggregate.add_relationship(
            "OWNS",
            Direction::Outgoing,
            "Actor",
            "1",
            "id",
            "Studio",
            "3",
            "id",
            BTreeMap::new(),
        );

        let mapped = map_performance_to_graph(&sample_snapshot(), &aggregate);
        let appears_in = mapped.edges.iter().find(|e| e.rel_type == "APPEARS_IN").unwrap();
        let owns = mapped.edges.iter().find(|e| e.rel_type == "OWNS").unwrap();
        assert!(appears_in.load_factor > 0.0);
        assert_eq!(owns.load_factor, 0.0);
    }

    #[test]
    fn mapper_holds_single_most_recent_slot() {
        let mapper = GraphPerformanceMapper::new();
        assert!(mapper.current().is_none());
        let aggregate = GraphAggregate::new();
        mapper.update(&sample_snapshot(), &aggregate);
        assert!(mapper.current().is_some());
        mapper.update(&PerformanceSnapshot::empty(chrono::Utc::now()), &aggregate);
        assert_eq!(mapper.current().unwrap().nodes.len(), 0);
    }
}
