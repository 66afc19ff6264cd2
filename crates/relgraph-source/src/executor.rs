//! Query execution with retry-on-transient-error and slow-query logging.
//!
//! Both dialects funnel through [`QueryExecutor::extract_rows`], which
//! builds a dialect-quoted `SELECT * FROM <table> [WHERE <predicate>]
//! LIMIT <row_cap>` and converts the resulting rows via
//! [`crate::types::pg_row_to_raw`] / [`crate::types::mysql_row_to_raw`].
//! Predicate and table-name validation happen in the adapters
//! (`crate::postgres`, `crate::mysql`), not here — this module assumes it
//! has already been handed a trusted, filtered query fragment.

use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use relgraph_common::{RelGraphError, Result, RetryConfig};

use crate::connection::Connection;
use crate::dialect::Dialect;
use crate::row::ExtractedRow;
use crate::types::{mysql_row_to_raw, pg_row_to_raw};

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub retry: RetryConfig,
    pub slow_query_threshold_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            slow_query_threshold_ms: 1_000,
        }
    }
}

pub struct QueryExecutor<'a> {
    conn: &'a Connection,
    config: ExecutorConfig,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            config: ExecutorConfig::default(),
        }
    }

    pub fn with_config(conn: &'a Connection, config: ExecutorConfig) -> Self {
        Self { conn, config }
    }

    /// Runs a row extraction query for one table, honoring `row_cap` as a
    /// hard `LIMIT` and `timeout` as a per-statement deadline.
    #[instrument(skip(self, predicate), fields(table = %table))]
    pub async fn extract_rows(
        &self,
        table: &str,
        predicate: Option<&str>,
        row_cap: u64,
        timeout: Duration,
    ) -> Result<Vec<ExtractedRow>> {
        let dialect = self.conn.dialect();
        let quoted = dialect.quote_ident(table);
        let mut sql = format!("SELECT * FROM {quoted}");
        if let Some(p) = predicate {
            sql.push_str(" WHERE ");
            sql.push_str(p);
        }
        sql.push_str(&format!(" LIMIT {row_cap}"));

        self.run_with_retry(&sql, timeout, dialect).await
    }

    /// Runs an arbitrary, already-validated SQL statement (a rule's
    /// `source_sql`) with the same retry and slow-query-logging behavior
    /// as `extract_rows`.
    #[instrument(skip(self, sql))]
    pub async fn execute_raw(&self, sql: &str, timeout: Duration) -> Result<Vec<ExtractedRow>> {
        let dialect = self.conn.dialect();
        self.run_with_retry(sql, timeout, dialect).await
    }

    async fn run_with_retry(
        &self,
        sql: &str,
        timeout: Duration,
        dialect: Dialect,
    ) -> Result<Vec<ExtractedRow>> {
        let mut last_error = None;
        for attempt in 0..=self.config.retry.max_retries {
            let started = Instant::now();
            let result = tokio::time::timeout(timeout, self.run_once(sql, dialect)).await;

            match result {
                Ok(Ok(rows)) => {
                    let elapsed = started.elapsed();
                    if elapsed.as_millis() as u64 >= self.config.slow_query_threshold_ms {
                        warn!(elapsed_ms = elapsed.as_millis() as u64, sql, "slow query");
                    } else {
                        debug!(elapsed_ms = elapsed.as_millis() as u64, "query completed");
                    }
                    return Ok(rows);
                }
                Ok(Err(e)) if e.is_retryable() && attempt < self.config.retry.max_retries => {
                    last_error = Some(e);
                    let delay = self.config.retry.delay_for_attempt(attempt);
                    warn!(attempt, "transient query error, retrying");
                    tokio::time::sleep(delay).await;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(RelGraphError::Transient(format!(
                        "query timed out after {:?}",
                        timeout
                    )))
                }
            }
        }
        Err(last_error.unwrap_or_else(|| RelGraphError::Internal("retry loop exhausted".to_string())))
    }

    async fn run_once(&self, sql: &str, dialect: Dialect) -> Result<Vec<ExtractedRow>> {
        match dialect {
            Dialect::Postgres => {
                let pool = self
                    .conn
                    .pg_pool()
                    .ok_or_else(|| RelGraphError::Internal("connection/dialect mismatch".to_string()))?;
                let rows = sqlx::query(sql).fetch_all(pool).await?;
                Ok(rows
                    .iter()
                    .map(|r| ExtractedRow::from_pairs(pg_row_to_raw(r)))
                    .collect())
            }
            Dialect::MySql => {
                let pool = self
                    .conn
                    .mysql_pool()
                    .ok_or_else(|| RelGraphError::Internal("connection/dialect mismatch".to_string()))?;
                let rows = sqlx::query(sql).fetch_all(pool).await?;
                Ok(rows
                    .iter()
                    .map(|r| ExtractedRow::from_pairs(mysql_row_to_raw(r)))
                    .collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executor_config_default_has_nonzero_slow_threshold() {
        let config = ExecutorConfig::default();
        assert!(config.slow_query_threshold_ms > 0);
    }
}
