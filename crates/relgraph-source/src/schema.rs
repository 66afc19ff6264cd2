//! Data model produced by schema introspection.
//!
//! These types are immutable once returned by [`crate::adapter::SourceAdapter`]
//! introspection calls; [`crate::schema::SourceTable::graph_role`] is filled
//! in later by the schema analyzer (a separate crate), not here.

use serde::{Deserialize, Serialize};

/// The constraint role a column plays, in priority order for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyKind {
    None,
    Index,
    Unique,
    Foreign,
    Primary,
}

/// A single column as introspected from `information_schema.columns` (or
/// the dialect-equivalent catalog).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub key_kind: KeyKind,
    /// e.g. `"auto_increment"` on MySQL, `"identity"` on Postgres.
    pub extra: Option<String>,
}

/// A foreign key constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKey {
    pub name: String,
    pub local_col: String,
    pub ref_table: String,
    pub ref_col: String,
    pub on_delete: Option<String>,
    pub on_update: Option<String>,
}

/// An index, for completeness of introspection (not consumed by the
/// analyzer's role-classification heuristic, which only cares about FKs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// The two roles a table can play in the output graph. Assigned by the
/// schema analyzer after introspection; `Unknown` until then.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraphRole {
    Unknown,
    Node,
    Relationship,
}

/// A fully introspected table. Never mutated after analysis completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceTable {
    pub schema: Option<String>,
    pub name: String,
    pub columns: Vec<SourceColumn>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<IndexInfo>,
    pub estimated_rows: u64,
    pub graph_role: GraphRole,
}

impl SourceTable {
    pub fn fk_count(&self) -> usize {
        self.foreign_keys.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Columns that are not part of any foreign key, in original order —
    /// the set the analyzer's node auto-rule maps 1:1 into properties.
    pub fn non_fk_columns(&self) -> Vec<&SourceColumn> {
        let fk_cols: std::collections::HashSet<&str> =
            self.foreign_keys.iter().map(|fk| fk.local_col.as_str()).collect();
        self.columns
            .iter()
            .filter(|c| !fk_cols.contains(c.name.as_str()))
            .collect()
    }

    /// True if this table has a foreign key referencing itself, the
    /// hierarchy pattern the analyzer looks for.
    pub fn is_self_referencing(&self) -> bool {
        self.foreign_keys.iter().any(|fk| fk.ref_table.eq_ignore_ascii_case(&self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str) -> SourceColumn {
        SourceColumn {
            name: name.to_string(),
            data_type: "int".to_string(),
            nullable: false,
            default: None,
            key_kind: KeyKind::None,
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

    #[test]
    fn non_fk_columns_excludes_fk_local_columns() {
        let table = SourceTable {
            schema: None,
            name: "film_actor".to_string(),
            columns: vec![col("actor_id"), col("film_id"), col("last_update")],
            foreign_keys: vec![fk("actor_id", "actor"), fk("film_id", "film")],
            indexes: vec![],
            estimated_rows: 0,
            graph_role: GraphRole::Unknown,
        };
        let remaining: Vec<&str> = table.non_fk_columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(remaining, vec!["last_update"]);
    }

    #[test]
    fn self_referencing_detects_hierarchy() {
        let table = SourceTable {
            schema: None,
            name: "category".to_string(),
            columns: vec![col("category_id"), col("parent_id")],
            foreign_keys: vec![fk("parent_id", "category")],
            indexes: vec![],
            estimated_rows: 0,
            graph_role: GraphRole::Unknown,
        };
        assert!(table.is_self_referencing());
    }
}
