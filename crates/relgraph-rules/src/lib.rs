//! Typed transform rule model and YAML loader.
//!
//! A `TransformRule` is either a `NodeRule` or a `RelationshipRule`; both
//! are produced by the schema analyzer (auto rules) or loaded from a
//! user-authored YAML document (this crate), and merged into one ordered
//! rule set before the transform orchestrator runs.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use relgraph_common::{RelGraphError, Result};

/// Where a rule pulls its input rows from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleSource {
    Table(String),
    Sql(String),
    FromExistingNodes,
}

/// Identifies which node (by type and key column) participates in a
/// relationship rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeRef {
    #[serde(rename = "type")]
    pub node_type: String,
    pub key_field: String,
    #[serde(default)]
    pub target_field: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Out,
    In,
    Both,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRule {
    pub name: String,
    #[serde(flatten)]
    pub source: NodeRuleSource,
    pub node_type: String,
    #[serde(default)]
    pub field_mappings: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub priority: i32,
    /// Documentation-only Cypher sketch attached by the schema analyzer;
    /// the orchestrator never executes it, only the structural fields.
    #[serde(default)]
    pub cypher_hint: Option<String>,
}

/// `NodeRule`'s source is restricted to a table or raw SQL — it never
/// pairs existing nodes the way a relationship rule can.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeRuleSource {
    #[serde(rename = "source_table")]
    Table(String),
    #[serde(rename = "source_sql")]
    Sql(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipRule {
    pub name: String,
    #[serde(default)]
    pub source_table: Option<String>,
    #[serde(default)]
    pub source_sql: Option<String>,
    pub rel_type: String,
    pub direction: Direction,
    pub source_node: NodeRef,
    pub target_node: NodeRef,
    #[serde(default)]
    pub property_mappings: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub cypher_hint: Option<String>,
}

impl RelationshipRule {
    /// Resolves the effective `RuleSource`: explicit SQL wins over a named
    /// table, and when neither is present the rule pairs existing nodes.
    pub fn source(&self) -> RuleSource {
        if let Some(sql) = &self.source_sql {
            RuleSource::Sql(sql.clone())
        } else if let Some(table) = &self.source_table {
            RuleSource::Table(table.clone())
        } else {
            RuleSource::FromExistingNodes
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "rule_type", rename_all = "lowercase")]
pub enum TransformRule {
    Node(NodeRule),
    Relationship(RelationshipRule),
}

impl TransformRule {
    pub fn name(&self) -> &str {
        match self {
            TransformRule::Node(r) => &r.name,
            TransformRule::Relationship(r) => &r.name,
        }
    }

    pub fn priority(&self) -> i32 {
        match self {
            TransformRule::Node(r) => r.priority,
            TransformRule::Relationship(r) => r.priority,
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self, TransformRule::Node(_))
    }
}

/// A loaded, ordered rule set. Ordering is by `priority` descending, then
/// by source (file) order for ties.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<TransformRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn from_rules(mut rules: Vec<TransformRule>) -> Self {
        // `sort_by` is stable, which preserves source order within a
        // priority tier.
        rules.sort_by(|a, b| b.priority().cmp(&a.priority()).then(Ordering::Equal));
        Self { rules }
    }

    pub fn merge(&mut self, other: RuleSet) {
        self.rules.extend(other.rules);
        self.rules
            .sort_by(|a, b| b.priority().cmp(&a.priority()).then(Ordering::Equal));
    }

    pub fn node_rules(&self) -> impl Iterator<Item = &NodeRule> {
        self.rules.iter().filter_map(|r| match r {
            TransformRule::Node(n) => Some(n),
            TransformRule::Relationship(_) => None,
        })
    }

    pub fn relationship_rules(&self) -> impl Iterator<Item = &RelationshipRule> {
        self.rules.iter().filter_map(|r| match r {
            TransformRule::Relationship(rr) => Some(rr),
            TransformRule::Node(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Deserializes a YAML document into a `RuleSet`, rejecting entries
/// missing their discriminated fields as a fatal config error.
pub fn load_rules_yaml(yaml: &str) -> Result<RuleSet> {
    #[derive(Deserialize)]
    struct RulesFile {
        rules: Vec<TransformRule>,
    }

    let file: RulesFile = serde_yaml::from_str(yaml)
        .map_err(|e| RelGraphError::ConfigError(format!("invalid rules YAML: {e}")))?;

    for rule in &file.rules {
        validate_rule(rule)?;
    }

    Ok(RuleSet::from_rules(file.rules))
}

fn validate_rule(rule: &TransformRule) -> Result<()> {
    match rule {
        TransformRule::Node(n) => {
            if n.node_type.is_empty() {
                return Err(RelGraphError::ConfigError(format!(
                    "node rule '{}' is missing node_type",
                    n.name
                )));
            }
        }
        TransformRule::Relationship(r) => {
            if r.rel_type.is_empty() {
                return Err(RelGraphError::ConfigError(format!(
                    "relationship rule '{}' is missing rel_type",
                    r.name
                )));
            }
            if r.source_node.node_type.is_empty() || r.target_node.node_type.is_empty() {
                return Err(RelGraphError::ConfigError(format!(
                    "relationship rule '{}' must specify source_node and target_node types",
                    r.name
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_priority_desc_then_source_order() {
        let rules = vec![
            TransformRule::Node(NodeRule {
                name: "low".to_string(),
                source: NodeRuleSource::Table("t1".to_string()),
                node_type: "Foo".to_string(),
                field_mappings: Default::default(),
                priority: 1,
                cypher_hint: None,
            }),
            TransformRule::Node(NodeRule {
                name: "high".to_string(),
                source: NodeRuleSource::Table("t2".to_string()),
                node_type: "Bar".to_string(),
                field_mappings: Default::default(),
                priority: 10,
                cypher_hint: None,
            }),
            TransformRule::Node(NodeRule {
                name: "high-second".to_string(),
                source: NodeRuleSource::Table("t3".to_string()),
                node_type: "Baz".to_string(),
                field_mappings: Default::default(),
                priority: 10,
                cypher_hint: None,
            }),
        ];
        let set = RuleSet::from_rules(rules);
        let names: Vec<&str> = set.node_rules().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["high", "high-second", "low"]);
    }

    #[test]
    fn missing_rel_type_is_rejected() {
        let yaml = r#"
rules:
  - rule_type: relationship
    name: bad
    rel_type: ""
    direction: out
    source_node: { type: Actor, key_field: actor_id }
    target_node: { type: Film, key_field: film_id }
"#;
        assert!(load_rules_yaml(yaml).is_err());
    }

    #[test]
    fn well_formed_yaml_loads_both_rule_kinds() {
        let yaml = r#"
rules:
  - rule_type: node
    name: actor_node
    source_table: actor
    node_type: Actor
    field_mappings:
      actor_id: id
      first_name: first_name
    priority: 5
  - rule_type: relationship
    name: acted_in
    source_table: film_actor
    rel_type: ACTED_IN
    direction: out
    source_node: { type: Actor, key_field: actor_id }
    target_node: { type: Film, key_field: film_id }
    priority: 1
"#;
        let set = load_rules_yaml(yaml).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.node_rules().count(), 1);
        assert_eq!(set.relationship_rules().count(), 1);
    }

    #[test]
    fn relationship_source_prefers_sql_over_table() {
        let rule = RelationshipRule {
            name: "r".to_string(),
            source_table: Some("t".to_string()),
            source_sql: Some("SELECT 1".to_string()),
            rel_type: "REL".to_string(),
            direction: Direction::Out,
            source_node: NodeRef {
                node_type: "A".to_string(),
                key_field: "id".to_string(),
                target_field: None,
            },
            target_node: NodeRef {
                node_type: "B".to_string(),
                key_field: "id".to_string(),
                target_field: None,
            },
            property_mappings: Default::default(),
            priority: 0,
            cypher_hint: None,
        };
        assert!(matches!(rule.source(), RuleSource::Sql(_)));
    }

    #[test]
    fn relationship_with_no_source_pairs_existing_nodes() {
        let rule = RelationshipRule {
            name: "r".to_string(),
            source_table: None,
            source_sql: None,
            rel_type: "REL".to_string(),
            direction: Direction::Both,
            source_node: NodeRef {
                node_type: "A".to_string(),
                key_field: "id".to_string(),
                target_field: None,
            },
            target_node: NodeRef {
                node_type: "B".to_string(),
                key_field: "id".to_string(),
                target_field: None,
            },
            property_mappings: Default::default(),
            priority: 0,
            cypher_hint: None,
        };
        assert!(matches!(rule.source(), RuleSource::FromExistingNodes));
    }
}
