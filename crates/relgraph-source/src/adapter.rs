//! The `SourceAdapter` trait: schema introspection plus filtered row
//! extraction, implemented once per dialect in [`crate::postgres`] and
//! [`crate::mysql`].

use async_trait::async_trait;
use std::time::Duration;

use relgraph_common::Result;

use crate::row::ExtractedRow;
use crate::schema::SourceTable;

/// Table allow/deny filtering: deny always wins. If `allow` is non-empty,
/// a table must both appear in `allow` and be absent from `deny`;
/// otherwise every table not in `deny` is permitted.
#[derive(Debug, Clone, Default)]
pub struct TableFilter {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

impl TableFilter {
    pub fn permits(&self, table: &str) -> bool {
        if self.deny.iter().any(|t| t.eq_ignore_ascii_case(table)) {
            return false;
        }
        if !self.allow.is_empty() {
            return self.allow.iter().any(|t| t.eq_ignore_ascii_case(table));
        }
        true
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Lists every table visible to the connected user that passes
    /// `filter`, with columns, foreign keys, and indexes populated.
    /// A per-table introspection failure is logged and the table is
    /// skipped as a schema error; the call itself only fails for a
    /// connection-level problem.
    async fn introspect_schema(&self, filter: &TableFilter) -> Result<Vec<SourceTable>>;

    /// Extracts up to `row_cap` rows from `table`, optionally narrowed by
    /// a pre-validated `predicate` fragment, aborting after `timeout`.
    async fn extract_rows(
        &self,
        table: &str,
        predicate: Option<&str>,
        row_cap: u64,
        timeout: Duration,
    ) -> Result<Vec<ExtractedRow>>;

    /// Runs a rule's raw `source_sql` fragment directly.
    async fn execute_sql(&self, sql: &str, timeout: Duration) -> Result<Vec<ExtractedRow>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_list_overrides_allow_list() {
        let filter = TableFilter {
            allow: vec!["customer".to_string()],
            deny: vec!["customer".to_string()],
        };
        assert!(!filter.permits("customer"));
        assert!(!filter.permits("other"));
    }

    #[test]
    fn allow_list_still_requires_membership() {
        let filter = TableFilter {
            allow: vec!["orders".to_string()],
            deny: vec!["users".to_string()],
        };
        assert!(filter.permits("orders"));
        assert!(!filter.permits("users"));
        assert!(!filter.permits("products"));
    }

    #[test]
    fn deny_list_applies_when_no_allow_list() {
        let filter = TableFilter {
            allow: vec![],
            deny: vec!["audit_log".to_string()],
        };
        assert!(filter.permits("customer"));
        assert!(!filter.permits("audit_log"));
    }

    #[test]
    fn empty_filter_permits_everything() {
        let filter = TableFilter::default();
        assert!(filter.permits("anything"));
    }
}
