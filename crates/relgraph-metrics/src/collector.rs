//! Metrics collector: queries `performance_schema` /
//! `information_schema` against a MySQL source and assembles a
//! [`PerformanceSnapshot`]. Each metric family is collected independently;
//! a family's failure is logged and that family is simply absent from the
//! snapshot, rather than aborting the whole collection.

use std::collections::HashSet;

use chrono::Utc;
use parking_lot::RwLock;
use sqlx::mysql::MySqlPool;
use sqlx::Row as SqlxRow;
use tracing::warn;

use relgraph_common::RelGraphError;
use relgraph_source::Connection;

use crate::snapshot::{
    classify_relationship_kind, ConnectionsSummary, GlobalCounters, IndexUsageSummary,
    PerformanceSnapshot, ReplicationSummary, StatementDigestSummary, TableIoSummary,
};

/// Schemas never reported on.
const IGNORED_SCHEMAS: [&str; 4] = ["mysql", "information_schema", "performance_schema", "sys"];

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub min_exec_count: u64,
    pub min_avg_latency_ns: u64,
    pub max_statements: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            min_exec_count: 1,
            min_avg_latency_ns: 0,
            max_statements: 50,
        }
    }
}

/// Caches the most recent snapshot so the next collection can compute a
/// true QPS delta, and caches the digest text lookups already performed
/// this run behind a `parking_lot::RwLock`-guarded single slot.
pub struct MetricsCollector {
    conn: Connection,
    config: CollectorConfig,
    previous: RwLock<Option<PerformanceSnapshot>>,
}

impl MetricsCollector {
    pub fn new(conn: Connection, config: CollectorConfig) -> Self {
        Self {
            conn,
            config,
            previous: RwLock::new(None),
        }
    }

    /// Collects every metric family, computes QPS against the previously
    /// cached snapshot (if any), and replaces the cache with this result.
    pub async fn collect(&self) -> PerformanceSnapshot {
        let pool = match self.conn.mysql_pool() {
            Some(p) => p,
            None => {
                warn!("metrics collector requires a MySQL connection; postgres pools are not instrumented");
                return PerformanceSnapshot::empty(Utc::now());
            }
        };

        let mut snapshot = PerformanceSnapshot::empty(Utc::now());

        match collect_global_counters(pool).await {
            Ok(g) => snapshot.global_counters = Some(g),
            Err(e) => warn!(error = %e, "global counters unavailable"),
        }
        match collect_statement_digests(pool, &self.config).await {
            Ok(d) => snapshot.statement_digests = d,
            Err(e) => warn!(error = %e, "statement digest summary unavailable"),
        }
        match collect_table_io(pool).await {
            Ok(t) => snapshot.table_io = t,
            Err(e) => warn!(error = %e, "table I/O summary unavailable"),
        }
        match collect_index_usage(pool).await {
            Ok(i) => snapshot.index_usage = i,
            Err(e) => warn!(error = %e, "index usage summary unavailable"),
        }
        match collect_connections(pool).await {
            Ok(c) => snapshot.connections = Some(c),
            Err(e) => warn!(error = %e, "connections summary unavailable"),
        }
        snapshot.replication = collect_replication(pool).await.ok();

        let mut previous = self.previous.write();
        *previous = Some(snapshot.clone());
        snapshot
    }

    /// QPS computed as a true delta from the last collected snapshot; the
    /// very first collection has no predecessor and returns `None`.
    pub fn qps(&self, current: &PerformanceSnapshot) -> Option<f64> {
        let previous = self.previous.read();
        previous.as_ref().and_then(|p| current.qps_since(p))
    }

    pub fn close(&self) {
        let mut previous = self.previous.write();
        *previous = None;
    }
}

fn is_ignored_schema(schema: &str) -> bool {
    IGNORED_SCHEMAS.contains(&schema)
}

async fn collect_global_counters(pool: &MySqlPool) -> relgraph_common::Result<GlobalCounters> {
    let status_rows = sqlx::query("SHOW GLOBAL STATUS")
        .fetch_all(pool)
        .await
        .map_err(|e| RelGraphError::MetricFamilyError(format!("SHOW GLOBAL STATUS failed: {e}")))?;

    let mut values: std::collections::HashMap<String, u64> = std::collections::HashMap::new();
    for row in &status_rows {
        let name: String = row.get(0);
        if let Ok(value) = row.try_get::<String, _>(1) {
            if let Ok(parsed) = value.parse::<u64>() {
                values.insert(name.to_ascii_uppercase(), parsed);
            }
        }
    }

    let read_requests = *values.get("INNODB_BUFFER_POOL_READ_REQUESTS").unwrap_or(&0);
    let reads = *values.get("INNODB_BUFFER_POOL_READS").unwrap_or(&0);

    Ok(GlobalCounters {
        queries_total: *values.get("QUERIES").unwrap_or(&0),
        connections_current: *values.get("THREADS_CONNECTED").unwrap_or(&0),
        slow_queries_total: *values.get("SLOW_QUERIES").unwrap_or(&0),
        threads_running: *values.get("THREADS_RUNNING").unwrap_or(&0),
        buffer_pool_hit_ratio: GlobalCounters::buffer_pool_hit_ratio(read_requests, reads),
    })
}

async fn collect_statement_digests(
    pool: &MySqlPool,
    config: &CollectorConfig,
) -> relgraph_common::Result<Vec<StatementDigestSummary>> {
    let rows = sqlx::query(
        "SELECT digest_text, count_star, avg_timer_wait, sum_timer_wait, sum_no_index_used \
         FROM performance_schema.events_statements_summary_by_digest \
         WHERE digest_text IS NOT NULL AND count_star >= ? AND avg_timer_wait >= ? \
         ORDER BY sum_timer_wait DESC LIMIT ?",
    )
    .bind(config.min_exec_count as i64)
    .bind(config.min_avg_latency_ns as i64)
    .bind(config.max_statements as i64)
    .fetch_all(pool)
    .await
    .map_err(|e| RelGraphError::MetricFamilyError(format!("statement digest query failed: {e}")))?;

    Ok(rows
        .iter()
        .map(|r| {
            let digest_text: String = r.try_get(0).unwrap_or_default();
            let count_star: i64 = r.try_get(1).unwrap_or(0);
            let avg_timer_wait_ps: f64 = r.try_get::<f64, _>(2).unwrap_or(0.0);
            let sum_timer_wait_ps: f64 = r.try_get::<f64, _>(3).unwrap_or(0.0);
            let sum_no_index_used: i64 = r.try_get(4).unwrap_or(0);
            StatementDigestSummary {
                relationship_kind: classify_relationship_kind(&digest_text),
                digest_text,
                count_star: count_star.max(0) as u64,
                avg_latency_ms: ps_to_ms(avg_timer_wait_ps),
                sum_latency_ms: ps_to_ms(sum_timer_wait_ps),
                index_used: sum_no_index_used == 0,
            }
        })
        .collect())
}

/// `performance_schema` timer columns are picoseconds; this crate's
/// external unit is milliseconds throughout.
fn ps_to_ms(picoseconds: f64) -> f64 {
    picoseconds / 1e9
}

async fn collect_table_io(pool: &MySqlPool) -> relgraph_common::Result<Vec<TableIoSummary>> {
    let rows = sqlx::query(
        "SELECT object_schema, object_name, count_read, sum_timer_read, count_write, sum_timer_write \
         FROM performance_schema.table_io_waits_summary_by_table \
         WHERE object_schema IS NOT NULL",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| RelGraphError::MetricFamilyError(format!("table I/O query failed: {e}")))?;

    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for row in &rows {
        let schema: String = row.try_get(0).unwrap_or_default();
        if is_ignored_schema(&schema) {
            continue;
        }
        let table: String = row.try_get(1).unwrap_or_default();
        let rows_read: i64 = row.try_get(2).unwrap_or(0);
        let read_timer: f64 = row.try_get::<f64, _>(3).unwrap_or(0.0);
        let rows_written: i64 = row.try_get(4).unwrap_or(0);
        let write_timer: f64 = row.try_get::<f64, _>(5).unwrap_or(0.0);

        let key = format!("{schema}.{table}");
        if !seen.insert(key) {
            continue;
        }
        out.push(TableIoSummary {
            table_name: table,
            read_latency_ms: ps_to_ms(read_timer),
            write_latency_ms: ps_to_ms(write_timer),
            rows_read: rows_read.max(0) as u64,
            rows_written: rows_written.max(0) as u64,
        });
    }
    Ok(out)
}

async fn collect_index_usage(pool: &MySqlPool) -> relgraph_common::Result<Vec<IndexUsageSummary>> {
    let rows = sqlx::query(
        "SELECT object_schema, object_name, index_name, count_star \
         FROM performance_schema.table_io_waits_summary_by_index_usage \
         WHERE index_name IS NOT NULL AND object_schema IS NOT NULL",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| RelGraphError::MetricFamilyError(format!("index usage query failed: {e}")))?;

    Ok(rows
        .iter()
        .filter_map(|r| {
            let schema: String = r.try_get(0).ok()?;
            if is_ignored_schema(&schema) {
                return None;
            }
            let rows_selected: i64 = r.try_get(3).unwrap_or(0);
            Some(IndexUsageSummary {
                table_name: r.try_get(1).ok()?,
                index_name: r.try_get(2).ok()?,
                rows_selected: rows_selected.max(0) as u64,
            })
        })
        .collect())
}

async fn collect_connections(pool: &MySqlPool) -> relgraph_common::Result<ConnectionsSummary> {
    let rows = sqlx::query("SHOW GLOBAL STATUS LIKE 'Threads_connected'")
        .fetch_all(pool)
        .await
        .map_err(|e| RelGraphError::MetricFamilyError(format!("connections query failed: {e}")))?;
    let current = rows
        .first()
        .and_then(|r| r.try_get::<String, _>(1).ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    let max_used_rows = sqlx::query("SHOW GLOBAL STATUS LIKE 'Max_used_connections'")
        .fetch_all(pool)
        .await
        .map_err(|e| RelGraphError::MetricFamilyError(format!("connections query failed: {e}")))?;
    let max_used = max_used_rows
        .first()
        .and_then(|r| r.try_get::<String, _>(1).ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    let aborted_rows = sqlx::query("SHOW GLOBAL STATUS LIKE 'Aborted_connects'")
        .fetch_all(pool)
        .await
        .map_err(|e| RelGraphError::MetricFamilyError(format!("connections query failed: {e}")))?;
    let aborted = aborted_rows
        .first()
        .and_then(|r| r.try_get::<String, _>(1).ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    Ok(ConnectionsSummary { current, max_used, aborted })
}

async fn collect_replication(pool: &MySqlPool) -> relgraph_common::Result<ReplicationSummary> {
    let row = sqlx::query("SHOW SLAVE STATUS")
        .fetch_optional(pool)
        .await
        .map_err(|e| RelGraphError::MetricFamilyError(format!("replication query failed: {e}")))?;

    match row {
        Some(r) => {
            let lag_seconds = r
                .try_get::<Option<i64>, _>("Seconds_Behind_Master")
                .ok()
                .flatten()
                .map(|v| v as f64);
            let io_running = r
                .try_get::<String, _>("Slave_IO_Running")
                .map(|v| v == "Yes")
                .unwrap_or(false);
            let sql_running = r
                .try_get::<String, _>("Slave_SQL_Running")
                .map(|v| v == "Yes")
                .unwrap_or(false);
            Ok(ReplicationSummary { lag_seconds, io_running, sql_running })
        }
        None => Ok(ReplicationSummary::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignored_schemas_filter_system_catalogs() {
        assert!(is_ignored_schema("performance_schema"));
        assert!(is_ignored_schema("mysql"));
        assert!(!is_ignored_schema("shop"));
    }

    #[test]
    fn ps_to_ms_conversion() {
        assert!((ps_to_ms(1_000_000_000.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn collector_config_defaults() {
        let config = CollectorConfig::default();
        assert_eq!(config.max_statements, 50);
        assert_eq!(config.min_exec_count, 1);
    }
}
