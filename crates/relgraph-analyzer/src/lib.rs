//! Schema analysis: classifies every introspected table as a graph node
//! or relationship, reports star-schema/hierarchy patterns, synthesizes
//! auto rules, and produces a rough output-size estimate.

use std::collections::HashMap;

use regex::Regex;
use tracing::warn;

use relgraph_rules::{Direction, NodeRef, NodeRule, NodeRuleSource, RelationshipRule, RuleSet, TransformRule};
use relgraph_source::{GraphRole, SourceTable};

/// Bytes-per-row heuristic for the rough size estimate.
const SIZE_ESTIMATE_BYTES_PER_ROW: u64 = 500;

/// Minimum outgoing references for a table to be reported as a star
/// schema hub.
const STAR_SCHEMA_MIN_REFS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    StarSchema,
    Hierarchy,
}

#[derive(Debug, Clone)]
pub struct DetectedPattern {
    pub kind: PatternKind,
    pub table: String,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub tables: Vec<SourceTable>,
    pub rules: RuleSet,
    pub patterns: Vec<DetectedPattern>,
    pub estimated_size_mb: f64,
}

/// Runs the full analysis pipeline on a freshly introspected table list.
pub fn analyze(mut tables: Vec<SourceTable>) -> AnalysisResult {
    for table in &mut tables {
        table.graph_role = classify_role(table);
    }

    let patterns = detect_patterns(&tables);
    let rules = synthesize_rules(&tables);
    let estimated_size_mb = estimate_size_mb(&tables);

    AnalysisResult {
        tables,
        rules,
        patterns,
        estimated_size_mb,
    }
}

/// A table is a relationship (junction) when it has at least two foreign
/// keys and either the FK-to-column ratio exceeds 0.6 or its name itself
/// looks like a join-table name (contains an underscore).
pub fn classify_role(table: &SourceTable) -> GraphRole {
    let fk_count = table.fk_count();
    if fk_count < 2 {
        return GraphRole::Node;
    }
    let ratio = fk_count as f64 / table.column_count().max(1) as f64;
    let looks_like_join_name = table.name.contains('_');
    if ratio > 0.6 || looks_like_join_name {
        GraphRole::Relationship
    } else {
        GraphRole::Node
    }
}

fn detect_patterns(tables: &[SourceTable]) -> Vec<DetectedPattern> {
    let mut patterns = Vec::new();

    let mut incoming_refs: HashMap<String, u32> = HashMap::new();
    for table in tables {
        for fk in &table.foreign_keys {
            *incoming_refs.entry(fk.ref_table.clone()).or_insert(0) += 1;
        }
    }

    for table in tables {
        let refs = incoming_refs.get(&table.name).copied().unwrap_or(0);
        if refs >= STAR_SCHEMA_MIN_REFS {
            patterns.push(DetectedPattern {
                kind: PatternKind::StarSchema,
                table: table.name.clone(),
                confidence: (0.2 * refs as f64).min(1.0),
            });
        }
        if table.is_self_referencing() {
            patterns.push(DetectedPattern {
                kind: PatternKind::Hierarchy,
                table: table.name.clone(),
                confidence: 0.9,
            });
        }
    }

    patterns
}

fn synthesize_rules(tables: &[SourceTable]) -> RuleSet {
    let mut rules = Vec::new();

    for table in tables {
        match table.graph_role {
            GraphRole::Node => rules.push(TransformRule::Node(synthesize_node_rule(table))),
            GraphRole::Relationship => {
                if table.foreign_keys.len() == 2 {
                    rules.push(TransformRule::Relationship(synthesize_relationship_rule(table)));
                } else {
                    warn!(
                        table = %table.name,
                        fk_count = table.foreign_keys.len(),
                        "relationship table does not have exactly two foreign keys; skipping auto-rule"
                    );
                }
            }
            GraphRole::Unknown => {}
        }
    }

    RuleSet::from_rules(rules)
}

fn synthesize_node_rule(table: &SourceTable) -> NodeRule {
    let node_type = pascal_case(&table.name);
    let field_mappings = table
        .non_fk_columns()
        .iter()
        .map(|c| (c.name.clone(), c.name.clone()))
        .collect();

    let col_list = table
        .non_fk_columns()
        .iter()
        .map(|c| format!("{0}: row.{0}", c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let cypher_hint = Some(format!("CREATE (n:{node_type} {{{col_list}}})"));

    NodeRule {
        name: format!("auto_node_{}", table.name),
        source: NodeRuleSource::Table(table.name.clone()),
        node_type,
        field_mappings,
        priority: 0,
        cypher_hint,
    }
}

fn synthesize_relationship_rule(table: &SourceTable) -> RelationshipRule {
    let fk1 = &table.foreign_keys[0];
    let fk2 = &table.foreign_keys[1];

    let rel_type = derive_relationship_type(&table.name, &fk1.ref_table, &fk2.ref_table);
    let t1 = pascal_case(&fk1.ref_table);
    let t2 = pascal_case(&fk2.ref_table);
    let cypher_hint = Some(format!(
        "(:{t1} {{id: row.{0}}})-[:{rel_type}]->(:{t2} {{id: row.{1}}})",
        fk1.local_col, fk2.local_col
    ));

    RelationshipRule {
        name: format!("auto_rel_{}", table.name),
        source_table: Some(table.name.clone()),
        source_sql: None,
        rel_type,
        direction: Direction::Out,
        source_node: NodeRef {
            node_type: t1,
            key_field: fk1.local_col.clone(),
            target_field: None,
        },
        target_node: NodeRef {
            node_type: t2,
            key_field: fk2.local_col.clone(),
            target_field: None,
        },
        property_mappings: Default::default(),
        priority: 0,
        cypher_hint,
    }
}

/// Derives a relationship type from the junction table's own name
/// (uppercased, trailing `S` stripped); falls back to
/// `{T1}_TO_{T2}` when that derivation carries no information beyond
/// naming one of the two endpoint tables.
fn derive_relationship_type(junction_name: &str, ref_table_1: &str, ref_table_2: &str) -> String {
    let mut derived = junction_name.to_uppercase();
    if derived.ends_with('S') {
        derived.pop();
    }

    let t1_upper = ref_table_1.to_uppercase();
    let t2_upper = ref_table_2.to_uppercase();
    let uninformative = derived.is_empty() || derived == t1_upper || derived == t2_upper;

    if uninformative {
        format!("{t1_upper}_TO_{t2_upper}")
    } else {
        derived
    }
}

/// Converts a `snake_case` or `kebab-case` table name into `PascalCase`
/// for use as a graph node label.
pub fn pascal_case(name: &str) -> String {
    name.split(|c: char| c == '_' || c == '-')
        .filter(|s| !s.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

fn estimate_size_mb(tables: &[SourceTable]) -> f64 {
    let total_bytes: u64 = tables
        .iter()
        .map(|t| t.estimated_rows.saturating_mul(SIZE_ESTIMATE_BYTES_PER_ROW))
        .sum();
    total_bytes as f64 / 1_000_000.0
}

/// Validates that a label or relationship-type identifier is safe to
/// interpolate directly into Cypher (labels/types cannot be bound
/// parameters).
pub fn validate_cypher_identifier(ident: &str) -> bool {
    static PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";
    Regex::new(PATTERN).unwrap().is_match(ident)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgraph_source::{ForeignKey, IndexInfo, KeyKind, SourceColumn};

    fn col(name: &str, key_kind: KeyKind) -> SourceColumn {
        SourceColumn {
            name: name.to_string(),
            data_type: "int".to_string(),
            nullable: false,
            default: None,
            key_kind,
            extra: None,
        }
    }

    fn fk(local: &str, ref_table: &str) -> ForeignKey {
        ForeignKey {
            name: format!("fk_{local}"),
            local_col: local.to_string(),
            ref_table: ref_table.to_string(),
            ref_col: "id".to_string(),
            on_delete: None,
            on_update: None,
        }
    }

    fn junction_table() -> SourceTable {
        SourceTable {
            schema: None,
            name: "film_actor".to_string(),
            columns: vec![
                col("actor_id", KeyKind::Foreign),
                col("film_id", KeyKind::Foreign),
                col("last_update", KeyKind::None),
            ],
            foreign_keys: vec![fk("actor_id", "actor"), fk("film_id", "film")],
            indexes: vec![],
            estimated_rows: 5_000,
            graph_role: GraphRole::Unknown,
        }
    }

    fn node_table() -> SourceTable {
        SourceTable {
            schema: None,
            name: "actor".to_string(),
            columns: vec![col("actor_id", KeyKind::Primary), col("first_name", KeyKind::None)],
            foreign_keys: vec![],
            indexes: vec![],
            estimated_rows: 200,
            graph_role: GraphRole::Unknown,
        }
    }

    #[test]
    fn junction_table_classified_as_relationship() {
        assert_eq!(classify_role(&junction_table()), GraphRole::Relationship);
    }

    #[test]
    fn plain_table_classified_as_node() {
        assert_eq!(classify_role(&node_table()), GraphRole::Node);
    }

    #[test]
    fn pascal_case_converts_snake_case() {
        assert_eq!(pascal_case("film_actor"), "FilmActor");
        assert_eq!(pascal_case("actor"), "Actor");
    }

    #[test]
    fn relationship_type_derives_from_junction_name() {
        assert_eq!(derive_relationship_type("film_actors", "film", "actor"), "FILM_ACTOR");
    }

    #[test]
    fn relationship_type_falls_back_when_uninformative() {
        assert_eq!(derive_relationship_type("film", "film", "actor"), "FILM_TO_ACTOR");
    }

    #[test]
    fn hierarchy_pattern_detected_for_self_referencing_fk() {
        let table = SourceTable {
            schema: None,
            name: "category".to_string(),
            columns: vec![col("category_id", KeyKind::Primary), col("parent_id", KeyKind::Foreign)],
            foreign_keys: vec![fk("parent_id", "category")],
            indexes: vec![],
            estimated_rows: 16,
            graph_role: GraphRole::Unknown,
        };
        let patterns = detect_patterns(&[table]);
        assert!(patterns.iter().any(|p| p.kind == PatternKind::Hierarchy && (p.confidence - 0.9).abs() < 1e-9));
    }

    #[test]
    fn star_schema_pattern_uses_confidence_formula() {
        let hub = node_table();
        let spokes: Vec<SourceTable> = (0..3)
            .map(|i| SourceTable {
                schema: None,
                name: format!("spoke_{i}"),
                columns: vec![col("id", KeyKind::Primary), col("actor_id", KeyKind::Foreign)],
                foreign_keys: vec![fk("actor_id", "actor")],
                indexes: vec![],
                estimated_rows: 10,
                graph_role: GraphRole::Unknown,
            })
            .collect();
        let mut all = vec![hub];
        all.extend(spokes);
        let patterns = detect_patterns(&all);
        let star = patterns.iter().find(|p| p.kind == PatternKind::StarSchema).unwrap();
        assert!((star.confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn size_estimate_uses_500_bytes_per_row() {
        let tables = vec![node_table()]; // 200 rows
        assert!((estimate_size_mb(&tables) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn identifier_validation_rejects_unsafe_characters() {
        assert!(validate_cypher_identifier("ACTED_IN"));
        assert!(!validate_cypher_identifier("ACTED-IN; DROP"));
    }

    #[test]
    fn analyze_synthesizes_both_rule_kinds() {
        let result = analyze(vec![node_table(), junction_table()]);
        assert_eq!(result.rules.node_rules().count(), 1);
        assert_eq!(result.rules.relationship_rules().count(), 1);
    }
}
