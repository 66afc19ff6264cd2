//! Neo4j (Bolt protocol) graph store adapter.

use std::collections::BTreeMap;

use async_trait::async_trait;
use neo4rs::{BoltType, Graph};
use regex::Regex;
use tracing::warn;

use relgraph_common::{Property, RelGraphError, Result};

use crate::aggregate::{Direction, GraphAggregate};

/// Labels and relationship types cannot be bound as Cypher parameters —
/// they must be validated and interpolated directly.
pub fn validate_identifier(ident: &str) -> Result<()> {
    static PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";
    if Regex::new(PATTERN).unwrap().is_match(ident) {
        Ok(())
    } else {
        Err(RelGraphError::SecurityPolicyViolation(format!(
            "unsafe Cypher identifier: '{ident}'"
        )))
    }
}

fn property_to_bolt(value: &Property) -> BoltType {
    match value {
        Property::Null => BoltType::Null(neo4rs::BoltNull),
        Property::Bool(b) => BoltType::Boolean(neo4rs::BoltBoolean::new(*b)),
        Property::Int(i) => BoltType::Integer(neo4rs::BoltInteger::new(*i)),
        Property::Float(f) => BoltType::Float(neo4rs::BoltFloat::new(*f)),
        Property::Str(s) => BoltType::String(neo4rs::BoltString::new(s)),
    }
}

fn direction_arrow(direction: Direction) -> (&'static str, &'static str) {
    match direction {
        Direction::Out => ("-", "->"),
        Direction::In => ("<-", "-"),
        Direction::Both => ("-", "-"),
    }
}

#[async_trait]
pub trait GraphStoreAdapter: Send + Sync {
    async fn store(&self, aggregate: &GraphAggregate) -> Result<()>;
    async fn fetch_nodes(&self, node_type: &str) -> Result<Vec<BTreeMap<String, Property>>>;
    async fn export(&self) -> Result<GraphAggregate>;
    async fn close(&self) -> Result<()>;
}

pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    pub async fn connect(uri: &str, user: &str, password: &str, database: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .map_err(|e| RelGraphError::ConnectionError(format!("neo4j connect failed: {e}")))?;
        let _ = database;
        Ok(Self { graph })
    }
}

#[async_trait]
impl GraphStoreAdapter for Neo4jStore {
    /// Stores nodes first, then relationships, matching endpoints by the
    /// `id` property rather than the arena's in-memory index so identity
    /// is preserved across separate runs. `MERGE` finds-or-creates by
    /// `id`; `SET n = $props` then fully replaces the property map rather
    /// than merging into it, so a property dropped between runs doesn't
    /// linger as stale state on an existing node.
    async fn store(&self, aggregate: &GraphAggregate) -> Result<()> {
        for node in aggregate.nodes() {
            validate_identifier(&node.node_type)?;
            let mut query_text = format!("MERGE (n:{} {{id: $id}}) SET n = $props", node.node_type);
            query_text.push_str(" RETURN n");

            let props_map: BTreeMap<String, BoltType> = node
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), property_to_bolt(v)))
                .collect();

            let q = neo4rs::query(&query_text)
                .param("id", node.key.as_str())
                .param("props", props_map);

            self.graph
                .run(q)
                .await
                .map_err(|e| RelGraphError::ConnectionError(format!("node store failed: {e}")))?;
        }

        for rel in aggregate.relationships() {
            validate_identifier(&rel.rel_type)?;
            let source = &aggregate.nodes()[rel.source_node];
            let target = &aggregate.nodes()[rel.target_node];
            let (left_arrow, right_arrow) = direction_arrow(rel.direction);

            let query_text = format!(
                "MATCH (a:{} {{id: $source_id}}), (b:{} {{id: $target_id}}) \
                 MERGE (a){left_arrow}[r:{}]{right_arrow}(b) SET r = $props",
                source.node_type, target.node_type, rel.rel_type
            );

            let props_map: BTreeMap<String, BoltType> = rel
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), property_to_bolt(v)))
                .collect();

            let q = neo4rs::query(&query_text)
                .param("source_id", source.key.as_str())
                .param("target_id", target.key.as_str())
                .param("props", props_map);

            match self.graph.run(q).await {
                Ok(_) => {}
                Err(e) => warn!(rel_type = %rel.rel_type, error = %e, "relationship store failed, endpoint may be missing"),
            }
        }

        Ok(())
    }

    async fn fetch_nodes(&self, node_type: &str) -> Result<Vec<BTreeMap<String, Property>>> {
        validate_identifier(node_type)?;
        let query_text = format!("MATCH (n:{node_type}) RETURN properties(n) AS props");
        let mut stream = self
            .graph
            .execute(neo4rs::query(&query_text))
            .await
            .map_err(|e| RelGraphError::ConnectionError(format!("fetch_nodes failed: {e}")))?;

        let mut out = Vec::new();
        while let Ok(Some(row)) = stream.next().await {
            if let Ok(props) = row.get::<BTreeMap<String, BoltType>>("props") {
                out.push(bolt_map_to_properties(props));
            }
        }
        Ok(out)
    }

    /// Returns every node (including isolates with no relationships) plus
    /// every directed relationship. Isolate nodes are recovered via a
    /// separate query so they are never lost to an inner join on
    /// relationships.
    async fn export(&self) -> Result<GraphAggregate> {
        let mut aggregate = GraphAggregate::new();

        let mut node_stream = self
            .graph
            .execute(neo4rs::query(
                "MATCH (n) RETURN labels(n)[0] AS label, properties(n) AS props",
            ))
            .await
            .map_err(|e| RelGraphError::ConnectionError(format!("export node scan failed: {e}")))?;

        while let Ok(Some(row)) = node_stream.next().await {
            let label: String = row.get("label").unwrap_or_default();
            if let Ok(props) = row.get::<BTreeMap<String, BoltType>>("props") {
                aggregate.add_node(&label, bolt_map_to_properties(props));
            }
        }

        let mut rel_stream = self
            .graph
            .execute(neo4rs::query(
                "MATCH (a)-[r]->(b) RETURN labels(a)[0] AS src_label, a.id AS src_id, \
                 type(r) AS rel_type, labels(b)[0] AS tgt_label, b.id AS tgt_id, \
                 properties(r) AS props",
            ))
            .await
            .map_err(|e| RelGraphError::ConnectionError(format!("export relationship scan failed: {e}")))?;

        while let Ok(Some(row)) = rel_stream.next().await {
            let src_label: String = row.get("src_label").unwrap_or_default();
            let src_id: String = row.get("src_id").unwrap_or_default();
            let rel_type: String = row.get("rel_type").unwrap_or_default();
            let tgt_label: String = row.get("tgt_label").unwrap_or_default();
            let tgt_id: String = row.get("tgt_id").unwrap_or_default();
            let props = row
                .get::<BTreeMap<String, BoltType>>("props")
                .map(bolt_map_to_properties)
                .unwrap_or_default();

            aggregate.add_relationship(
                &rel_type,
                Direction::Out,
                &src_label,
                &src_id,
                "id",
                &tgt_label,
                &tgt_id,
                "id",
                props,
            );
        }

        Ok(aggregate)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn bolt_map_to_properties(map: BTreeMap<String, BoltType>) -> BTreeMap<String, Property> {
    map.into_iter()
        .map(|(k, v)| (k, bolt_to_property(v)))
        .collect()
}

fn bolt_to_property(value: BoltType) -> Property {
    match value {
        BoltType::Null(_) => Property::Null,
        BoltType::Boolean(b) => Property::Bool(b.value),
        BoltType::Integer(i) => Property::Int(i.value),
        BoltType::Float(f) => Property::Float(f.value),
        BoltType::String(s) => Property::Str(s.value),
        other => Property::Str(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_identifiers_pass() {
        assert!(validate_identifier("ACTED_IN").is_ok());
        assert!(validate_identifier("Actor").is_ok());
        assert!(validate_identifier("_private").is_ok());
    }

    #[test]
    fn identifiers_with_injection_characters_are_rejected() {
        assert!(validate_identifier("Actor) DETACH DELETE (n").is_err());
        assert!(validate_identifier("ACTED-IN").is_err());
        assert!(validate_identifier("1Label").is_err());
    }

    #[test]
    fn direction_arrows_match_expected_cypher_syntax() {
        assert_eq!(direction_arrow(Direction::Out), ("-", "->"));
        assert_eq!(direction_arrow(Direction::In), ("<-", "-"));
        assert_eq!(direction_arrow(Direction::Both), ("-", "-"));
    }
}
