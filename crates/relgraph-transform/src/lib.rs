//! Two-pass transform orchestrator.
//!
//! Pass 1 applies every node rule; pass 2 applies every relationship
//! rule. This ordering is a hard invariant — a relationship can only
//! resolve endpoints against nodes that already exist in the aggregate.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use rayon::prelude::*;
use tracing::warn;

use relgraph_common::{coerce, Property, RawValue, DEFAULT_STRING_CAP};
use relgraph_graph::{Direction as GraphDirection, GraphAggregate, synthesize_id};
use relgraph_rules::{Direction as RuleDirection, NodeRule, NodeRuleSource, RelationshipRule, RuleSet, RuleSource};
use relgraph_source::{ExtractedRow, SourceAdapter};

#[derive(Debug, Clone)]
pub struct TransformConfig {
    pub string_cap: usize,
    pub row_cap: u64,
    pub query_timeout: Duration,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            string_cap: DEFAULT_STRING_CAP,
            row_cap: 100_000,
            query_timeout: Duration::from_secs(60),
        }
    }
}

/// Runs the full two-pass transform and returns the populated aggregate.
/// Per-rule failures are logged and the rule is skipped; only an adapter
/// connection failure aborts the run.
pub async fn run_transform(
    adapter: &dyn SourceAdapter,
    rules: &RuleSet,
    config: &TransformConfig,
) -> GraphAggregate {
    let mut aggregate = GraphAggregate::new();

    for rule in rules.node_rules() {
        if let Err(e) = apply_node_rule(adapter, rule, config, &mut aggregate).await {
            warn!(rule = %rule.name, error = %e, "node rule failed, skipping");
        }
    }

    for rule in rules.relationship_rules() {
        if let Err(e) = apply_relationship_rule(adapter, rule, config, &mut aggregate).await {
            warn!(rule = %rule.name, error = %e, "relationship rule failed, skipping");
        }
    }

    aggregate
}

async fn fetch_rule_rows(
    adapter: &dyn SourceAdapter,
    source: &RuleSource,
    config: &TransformConfig,
) -> relgraph_common::Result<Vec<ExtractedRow>> {
    match source {
        RuleSource::Sql(sql) => adapter.execute_sql(sql, config.query_timeout).await,
        RuleSource::Table(table) => {
            adapter
                .extract_rows(table, None, config.row_cap, config.query_timeout)
                .await
        }
        RuleSource::FromExistingNodes => Ok(Vec::new()),
    }
}

/// Value-coerces every column of a row into a `Property` map, in
/// parallel across rows within the batch; `add_node` itself stays serial.
fn coerce_rows_parallel(rows: Vec<ExtractedRow>, string_cap: usize) -> Vec<BTreeMap<String, Property>> {
    rows.into_par_iter()
        .map(|row| {
            row.into_map()
                .into_iter()
                .map(|(col, raw)| {
                    let coerced = coerce(&raw, string_cap);
                    if coerced.truncated {
                        warn!(column = %col, "value truncated to string cap during coercion");
                    }
                    (col, coerced.value)
                })
                .collect::<BTreeMap<_, _>>()
        })
        .collect()
}

async fn apply_node_rule(
    adapter: &dyn SourceAdapter,
    rule: &NodeRule,
    config: &TransformConfig,
    aggregate: &mut GraphAggregate,
) -> relgraph_common::Result<()> {
    let source = match &rule.source {
        NodeRuleSource::Table(t) => RuleSource::Table(t.clone()),
        NodeRuleSource::Sql(s) => RuleSource::Sql(s.clone()),
    };
    let rows = fetch_rule_rows(adapter, &source, config).await?;
    let coerced_rows = coerce_rows_parallel(rows, config.string_cap);

    for row in coerced_rows {
        let mut mapped: BTreeMap<String, Property> = BTreeMap::new();
        for (src_col, dst_field) in &rule.field_mappings {
            if let Some(v) = row.get(src_col) {
                mapped.insert(dst_field.clone(), v.clone());
            }
        }
        mapped.insert("_type".to_string(), Property::Str(rule.node_type.clone()));
        mapped
            .entry("id".to_string())
            .or_insert_with(|| Property::Str(synthesize_id()));
        mapped
            .entry("name".to_string())
            .or_insert_with(|| Property::Str("default_name".to_string()));

        aggregate.add_node(&rule.node_type, mapped);
    }

    Ok(())
}

async fn apply_relationship_rule(
    adapter: &dyn SourceAdapter,
    rule: &RelationshipRule,
    config: &TransformConfig,
    aggregate: &mut GraphAggregate,
) -> relgraph_common::Result<()> {
    let direction = match rule.direction {
        RuleDirection::Out => GraphDirection::Out,
        RuleDirection::In => GraphDirection::In,
        RuleDirection::Both => GraphDirection::Both,
    };

    match rule.source() {
        RuleSource::FromExistingNodes => {
            apply_pairing_relationship(rule, direction, aggregate);
            Ok(())
        }
        RuleSource::Sql(sql) => {
            let rows = adapter.execute_sql(&sql, config.query_timeout).await?;
            let coerced_rows = coerce_rows_parallel(rows, config.string_cap);

            for row in coerced_rows {
                let source_key = extract_nested_key(&row, "source", &rule.source_node.key_field);
                let target_key = extract_nested_key(&row, "target", &rule.target_node.key_field);
                let properties = extract_nested_properties(&row, "properties");

                aggregate.add_relationship(
                    &rule.rel_type,
                    direction,
                    &rule.source_node.node_type,
                    &source_key,
                    "id",
                    &rule.target_node.node_type,
                    &target_key,
                    "id",
                    properties,
                );
            }
            Ok(())
        }
        source @ RuleSource::Table(_) => {
            let rows = fetch_rule_rows(adapter, &source, config).await?;
            let coerced_rows = coerce_rows_parallel(rows, config.string_cap);

            for row in coerced_rows {
                let source_key = row
                    .get(&rule.source_node.key_field)
                    .map(|v| v.as_key_string())
                    .unwrap_or_default();
                let target_key = row
                    .get(&rule.target_node.key_field)
                    .map(|v| v.as_key_string())
                    .unwrap_or_default();

                let properties: BTreeMap<String, Property> = rule
                    .property_mappings
                    .iter()
                    .filter_map(|(src, dst)| row.get(src).map(|v| (dst.clone(), v.clone())))
                    .collect();

                aggregate.add_relationship(
                    &rule.rel_type,
                    direction,
                    &rule.source_node.node_type,
                    &source_key,
                    "id",
                    &rule.target_node.node_type,
                    &target_key,
                    "id",
                    properties,
                );
            }
            Ok(())
        }
    }
}

/// Extracts a node key from the nested `source`/`target` substructure of a
/// `source_sql`-driven relationship row. The column may coerce to a JSON
/// object string (if the adapter returned a nested map) or a bare scalar
/// string (the key value itself); both are accepted.
fn extract_nested_key(row: &BTreeMap<String, Property>, field: &str, key_field: &str) -> String {
    match row.get(field) {
        Some(Property::Str(s)) => match serde_json::from_str::<serde_json::Value>(s) {
            Ok(serde_json::Value::Object(obj)) => obj
                .get(key_field)
                .map(json_value_as_key_string)
                .unwrap_or_default(),
            _ => s.clone(),
        },
        Some(other) => other.as_key_string(),
        None => String::new(),
    }
}

/// Extracts the `properties` substructure of a `source_sql`-driven
/// relationship row as a property map; a non-object value yields an empty
/// map rather than a malformed relationship.
fn extract_nested_properties(row: &BTreeMap<String, Property>, field: &str) -> BTreeMap<String, Property> {
    match row.get(field) {
        Some(Property::Str(s)) => match serde_json::from_str::<serde_json::Value>(s) {
            Ok(serde_json::Value::Object(obj)) => obj
                .into_iter()
                .map(|(k, v)| (k, Property::Str(json_value_as_key_string(&v))))
                .collect(),
            _ => BTreeMap::new(),
        },
        _ => BTreeMap::new(),
    }
}

fn json_value_as_key_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Pairs the two node sets implied by `source_node.type`/`target_node.type`
/// whenever their stringified key properties match. Used for the
/// no-source-rows pairing style, where the relationship isn't itself
/// backed by a junction table.
fn apply_pairing_relationship(
    rule: &RelationshipRule,
    direction: GraphDirection,
    aggregate: &mut GraphAggregate,
) {
    let source_nodes: Vec<(String, BTreeMap<String, Property>)> = aggregate
        .nodes()
        .iter()
        .filter(|n| n.node_type == rule.source_node.node_type)
        .map(|n| {
            let key = n
                .properties
                .get(&rule.source_node.key_field)
                .map(|v| v.as_key_string())
                .unwrap_or_default();
            (key, n.properties.clone())
        })
        .collect();

    let target_index: HashMap<String, BTreeMap<String, Property>> = aggregate
        .nodes()
        .iter()
        .filter(|n| n.node_type == rule.target_node.node_type)
        .map(|n| {
            let key = n
                .properties
                .get(&rule.target_node.key_field)
                .map(|v| v.as_key_string())
                .unwrap_or_default();
            (key, n.properties.clone())
        })
        .collect();

    for (source_key, source_props) in source_nodes {
        if let Some(target_props) = target_index.get(&source_key) {
            let properties: BTreeMap<String, Property> = rule
                .property_mappings
                .iter()
                .filter_map(|(src, dst)| {
                    source_props
                        .get(src)
                        .or_else(|| target_props.get(src))
                        .map(|v| (dst.clone(), v.clone()))
                })
                .collect();

            let source_id = source_props
                .get("id")
                .map(|v| v.as_key_string())
                .unwrap_or_default();
            let target_id = target_props
                .get("id")
                .map(|v| v.as_key_string())
                .unwrap_or_default();

            aggregate.add_direct_relationship(&rule.rel_type, direction, &source_id, &target_id, properties);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgraph_common::RawValue;

    #[test]
    fn coerce_rows_parallel_preserves_row_count_and_values() {
        let rows = vec![
            ExtractedRow::from_pairs(vec![("id".to_string(), RawValue::Int(1))]),
            ExtractedRow::from_pairs(vec![("id".to_string(), RawValue::Int(2))]),
        ];
        let coerced = coerce_rows_parallel(rows, DEFAULT_STRING_CAP);
        assert_eq!(coerced.len(), 2);
        assert_eq!(coerced[0].get("id"), Some(&Property::Int(1)));
    }

    #[test]
    fn extract_nested_key_parses_json_object_substructure() {
        let mut row = BTreeMap::new();
        row.insert("source".to_string(), Property::Str(r#"{"id":"42","type":"Actor"}"#.to_string()));
        assert_eq!(extract_nested_key(&row, "source", "id"), "42");
    }

    #[test]
    fn extract_nested_key_falls_back_to_bare_scalar() {
        let mut row = BTreeMap::new();
        row.insert("target".to_string(), Property::Str("7".to_string()));
        assert_eq!(extract_nested_key(&row, "target", "id"), "7");
    }

    #[test]
    fn extract_nested_properties_reads_object_fields() {
        let mut row = BTreeMap::new();
        row.insert(
            "properties".to_string(),
            Property::Str(r#"{"since":"2020","role":"lead"}"#.to_string()),
        );
        let props = extract_nested_properties(&row, "properties");
        assert_eq!(props.get("since"), Some(&Property::Str("2020".to_string())));
        assert_eq!(props.get("role"), Some(&Property::Str("lead".to_string())));
    }

    #[test]
    fn missing_node_defaults_fill_in_id_and_name() {
        let mut mapped: BTreeMap<String, Property> = BTreeMap::new();
        mapped.insert("_type".to_string(), Property::Str("Actor".to_string()));
        mapped
            .entry("id".to_string())
            .or_insert_with(|| Property::Str(synthesize_id()));
        mapped
            .entry("name".to_string())
            .or_insert_with(|| Property::Str("default_name".to_string()));

        assert_eq!(mapped.get("name"), Some(&Property::Str("default_name".to_string())));
        assert!(mapped.contains_key("id"));
    }
}
