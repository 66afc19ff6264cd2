//! Benchmark spec validation.

use relgraph_common::{RelGraphError, Result};
use serde::{Deserialize, Serialize};

/// Fixed whitelist of supported load-tool test types. No other value is
/// accepted, whatever the external tool itself supports.
pub const TEST_TYPES: [&str; 11] = [
    "oltp_read_write",
    "oltp_read_only",
    "oltp_write_only",
    "oltp_point_select",
    "oltp_insert",
    "oltp_update_index",
    "oltp_update_non_index",
    "oltp_delete",
    "select_random_points",
    "select_random_ranges",
    "bulk_insert",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkSpec {
    pub test_type: String,
    pub target_url: String,
    pub threads: u32,
    pub duration_secs: u32,
    pub table: Option<String>,
}

impl BenchmarkSpec {
    pub fn validate(&self) -> Result<()> {
        if !TEST_TYPES.contains(&self.test_type.as_str()) {
            return Err(RelGraphError::ConfigError(format!(
                "unknown benchmark test_type '{}': must be one of {:?}",
                self.test_type, TEST_TYPES
            )));
        }
        if self.target_url.trim().is_empty() {
            return Err(RelGraphError::ConfigError("benchmark target_url cannot be empty".to_string()));
        }
        if self.threads == 0 {
            return Err(RelGraphError::ConfigError("benchmark threads must be positive".to_string()));
        }
        if self.duration_secs == 0 {
            return Err(RelGraphError::ConfigError("benchmark duration_secs must be positive".to_string()));
        }
        Ok(())
    }

    /// Approximate read/write proportions per test type, used to weight
    /// synthesized per-query performance records.
    pub fn read_write_proportions(&self) -> (f64, f64) {
        match self.test_type.as_str() {
            "oltp_read_only" | "select_random_points" | "select_random_ranges" | "oltp_point_select" => (1.0, 0.0),
            "oltp_write_only" | "oltp_insert" | "oltp_update_index" | "oltp_update_non_index" | "oltp_delete"
            | "bulk_insert" => (0.0, 1.0),
            _ => (0.7, 0.3),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(test_type: &str) -> BenchmarkSpec {
        BenchmarkSpec {
            test_type: test_type.to_string(),
            target_url: "mysql://bench@localhost/shop".to_string(),
            threads: 4,
            duration_secs: 60,
            table: None,
        }
    }

    #[test]
    fn unknown_test_type_is_rejected() {
        assert!(spec("drop_everything").validate().is_err());
    }

    #[test]
    fn whitelisted_test_type_is_accepted() {
        assert!(spec("oltp_read_write").validate().is_ok());
    }

    #[test]
    fn zero_threads_is_rejected() {
        let mut s = spec("oltp_read_write");
        s.threads = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn read_only_type_has_pure_read_proportion() {
        assert_eq!(spec("oltp_read_only").read_write_proportions(), (1.0, 0.0));
    }
}
