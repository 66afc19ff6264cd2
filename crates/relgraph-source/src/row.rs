//! Extracted row representation.
//!
//! A thin, dialect-agnostic wrapper around the column map produced by
//! [`crate::types::pg_row_to_raw`] / [`crate::types::mysql_row_to_raw`].

use std::collections::HashMap;

use relgraph_common::{RawValue, RelGraphError, Result};

#[derive(Debug, Clone)]
pub struct ExtractedRow {
    columns: HashMap<String, RawValue>,
    order: Vec<String>,
}

impl ExtractedRow {
    pub fn from_pairs(pairs: Vec<(String, RawValue)>) -> Self {
        let order = pairs.iter().map(|(k, _)| k.clone()).collect();
        Self {
            columns: pairs.into_iter().collect(),
            order,
        }
    }

    pub fn get(&self, column: &str) -> Result<&RawValue> {
        self.columns
            .get(column)
            .ok_or_else(|| RelGraphError::SchemaError(format!("column '{column}' not found in row")))
    }

    /// Column names in the order the source row returned them.
    pub fn column_names(&self) -> &[String] {
        &self.order
    }

    pub fn into_map(self) -> HashMap<String, RawValue> {
        self.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_column_order_and_lookup() {
        let row = ExtractedRow::from_pairs(vec![
            ("id".to_string(), RawValue::Int(1)),
            ("name".to_string(), RawValue::Str("alice".to_string())),
        ]);
        assert_eq!(row.column_names(), &["id".to_string(), "name".to_string()]);
        assert_eq!(row.get("name").unwrap(), &RawValue::Str("alice".to_string()));
    }

    #[test]
    fn missing_column_is_a_schema_error() {
        let row = ExtractedRow::from_pairs(vec![]);
        assert!(row.get("missing").is_err());
    }
}
