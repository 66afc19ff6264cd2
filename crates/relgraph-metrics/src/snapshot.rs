//! Neutral performance metric model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalCounters {
    pub queries_total: u64,
    pub connections_current: u64,
    pub slow_queries_total: u64,
    pub threads_running: u64,
    /// `(read_requests - reads) / read_requests × 100`.
    pub buffer_pool_hit_ratio: f64,
}

impl GlobalCounters {
    pub fn buffer_pool_hit_ratio(read_requests: u64, reads: u64) -> f64 {
        if read_requests == 0 {
            return 100.0;
        }
        ((read_requests.saturating_sub(reads)) as f64 / read_requests as f64) * 100.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementDigestSummary {
    pub digest_text: String,
    pub count_star: u64,
    /// Milliseconds, already converted from nanoseconds (÷1e6).
    pub avg_latency_ms: f64,
    pub sum_latency_ms: f64,
    pub index_used: bool,
    pub relationship_kind: RelationshipKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipKind {
    Join,
    Filter,
    Plain,
}

/// Classifies a digest by scanning its normalized text for `join`/`where`.
pub fn classify_relationship_kind(digest_text: &str) -> RelationshipKind {
    let lower = digest_text.to_ascii_lowercase();
    if lower.contains("join") {
        RelationshipKind::Join
    } else if lower.contains("where") {
        RelationshipKind::Filter
    } else {
        RelationshipKind::Plain
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableIoSummary {
    pub table_name: String,
    pub read_latency_ms: f64,
    pub write_latency_ms: f64,
    pub rows_read: u64,
    pub rows_written: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexUsageSummary {
    pub table_name: String,
    pub index_name: String,
    pub rows_selected: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConnectionsSummary {
    pub current: u64,
    pub max_used: u64,
    pub aborted: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReplicationSummary {
    pub lag_seconds: Option<f64>,
    pub io_running: bool,
    pub sql_running: bool,
}

/// A point-in-time collection of every metric family the collector could
/// gather. Missing families leave their field `None`; a partial snapshot
/// is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub collected_at: DateTime<Utc>,
    pub global_counters: Option<GlobalCounters>,
    pub statement_digests: Vec<StatementDigestSummary>,
    pub table_io: Vec<TableIoSummary>,
    pub index_usage: Vec<IndexUsageSummary>,
    pub connections: Option<ConnectionsSummary>,
    pub replication: Option<ReplicationSummary>,
    pub wait_events: Vec<String>,
}

impl PerformanceSnapshot {
    pub fn empty(collected_at: DateTime<Utc>) -> Self {
        Self {
            collected_at,
            global_counters: None,
            statement_digests: Vec::new(),
            table_io: Vec::new(),
            index_usage: Vec::new(),
            connections: None,
            replication: None,
            wait_events: Vec::new(),
        }
    }

    /// True average latency across recorded digests, in milliseconds.
    pub fn avg_latency_ms(&self) -> f64 {
        if self.statement_digests.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.statement_digests.iter().map(|d| d.avg_latency_ms).sum();
        sum / self.statement_digests.len() as f64
    }

    /// QPS as a true delta between this and `previous`'s `count_star`
    /// totals divided by wall-clock elapsed seconds — not a fixed
    /// 60-second divisor, which silently drifts whenever the actual
    /// collection interval isn't exactly 60s.
    pub fn qps_since(&self, previous: &PerformanceSnapshot) -> Option<f64> {
        let elapsed = (self.collected_at - previous.collected_at).num_milliseconds();
        if elapsed <= 0 {
            return None;
        }
        let current_total: u64 = self.statement_digests.iter().map(|d| d.count_star).sum();
        let previous_total: u64 = previous.statement_digests.iter().map(|d| d.count_star).sum();
        let delta = current_total.saturating_sub(previous_total);
        Some(delta as f64 / (elapsed as f64 / 1000.0))
    }
}

/// A condensed, wire-friendly rollup of a snapshot, broadcast on the
/// `metrics` topic each collector tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub collected_at: DateTime<Utc>,
    pub avg_latency_ms: f64,
    pub qps: Option<f64>,
    pub queries_total: u64,
    pub slow_queries_total: u64,
    pub connections_current: u64,
    pub buffer_pool_hit_ratio: Option<f64>,
}

impl PerformanceSnapshot {
    /// Rolls this snapshot up into a [`MetricsSummary`]. `previous` is the
    /// prior tick's snapshot, used only to compute `qps` as a true delta;
    /// `None` on the first tick leaves `qps` unset.
    pub fn summarize(&self, previous: Option<&PerformanceSnapshot>) -> MetricsSummary {
        MetricsSummary {
            collected_at: self.collected_at,
            avg_latency_ms: self.avg_latency_ms(),
            qps: previous.and_then(|p| self.qps_since(p)),
            queries_total: self.global_counters.as_ref().map(|g| g.queries_total).unwrap_or(0),
            slow_queries_total: self
                .global_counters
                .as_ref()
                .map(|g| g.slow_queries_total)
                .unwrap_or(0),
            connections_current: self.connections.as_ref().map(|c| c.current).unwrap_or(0),
            buffer_pool_hit_ratio: self.global_counters.as_ref().map(|g| g.buffer_pool_hit_ratio),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn digest(count_star: u64) -> StatementDigestSummary {
        StatementDigestSummary {
            digest_text: "SELECT ? FROM t WHERE x = ?".to_string(),
            count_star,
            avg_latency_ms: 5.0,
            sum_latency_ms: 5.0 * count_star as f64,
            index_used: true,
            relationship_kind: RelationshipKind::Filter,
        }
    }

    #[test]
    fn qps_is_a_true_delta_over_wall_clock_not_heuristic_60s() {
        let t0 = Utc::now();
        let previous = PerformanceSnapshot {
            statement_digests: vec![digest(1000)],
            ..PerformanceSnapshot::empty(t0)
        };
        let current = PerformanceSnapshot {
            statement_digests: vec![digest(1200)],
            ..PerformanceSnapshot::empty(t0 + ChronoDuration::milliseconds(2000))
        };
        let qps = current.qps_since(&previous).unwrap();
        assert!((qps - 100.0).abs() < 1e-9);
    }

    #[test]
    fn buffer_pool_hit_ratio_formula() {
        assert!((GlobalCounters::buffer_pool_hit_ratio(1000, 50) - 95.0).abs() < 1e-9);
    }

    #[test]
    fn classifier_detects_join_and_filter() {
        assert_eq!(classify_relationship_kind("SELECT * FROM a JOIN b"), RelationshipKind::Join);
        assert_eq!(classify_relationship_kind("SELECT * FROM a WHERE x=1"), RelationshipKind::Filter);
        assert_eq!(classify_relationship_kind("SELECT 1"), RelationshipKind::Plain);
    }

    #[test]
    fn summarize_without_previous_leaves_qps_unset() {
        let snapshot = PerformanceSnapshot {
            statement_digests: vec![digest(100)],
            global_counters: Some(GlobalCounters {
                queries_total: 500,
                connections_current: 3,
                slow_queries_total: 2,
                threads_running: 1,
                buffer_pool_hit_ratio: 97.5,
            }),
            ..PerformanceSnapshot::empty(Utc::now())
        };
        let summary = snapshot.summarize(None);
        assert!(summary.qps.is_none());
        assert_eq!(summary.queries_total, 500);
        assert_eq!(summary.buffer_pool_hit_ratio, Some(97.5));
    }

    #[test]
    fn summarize_with_previous_computes_qps() {
        let t0 = Utc::now();
        let previous = PerformanceSnapshot {
            statement_digests: vec![digest(1000)],
            ..PerformanceSnapshot::empty(t0)
        };
        let current = PerformanceSnapshot {
            statement_digests: vec![digest(1200)],
            ..PerformanceSnapshot::empty(t0 + ChronoDuration::milliseconds(2000))
        };
        let summary = current.summarize(Some(&previous));
        assert!((summary.qps.unwrap() - 100.0).abs() < 1e-9);
    }
}
