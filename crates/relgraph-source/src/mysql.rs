//! MySQL implementation of [`crate::adapter::SourceAdapter`], backed by
//! `information_schema` introspection.

use async_trait::async_trait;
use std::time::Duration;

use sqlx::Row as SqlxRow;
use tracing::warn;

use relgraph_common::Result;

use crate::adapter::{SourceAdapter, TableFilter};
use crate::connection::Connection;
use crate::executor::QueryExecutor;
use crate::row::ExtractedRow;
use crate::schema::{ForeignKey, GraphRole, IndexInfo, KeyKind, SourceColumn, SourceTable};

pub struct MySqlAdapter {
    conn: Connection,
    database: String,
}

impl MySqlAdapter {
    pub fn new(conn: Connection, database: String) -> Self {
        Self { conn, database }
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let pool = self.conn.mysql_pool().expect("mysql adapter holds a mysql pool");
        let rows = sqlx::query(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = ? AND table_type = 'BASE TABLE'",
        )
        .bind(&self.database)
        .fetch_all(pool)
        .await?;
        Ok(rows.iter().map(|r| r.get::<String, _>(0)).collect())
    }

    async fn introspect_one(&self, table: &str) -> Result<SourceTable> {
        let pool = self.conn.mysql_pool().expect("mysql adapter holds a mysql pool");

        let col_rows = sqlx::query(
            "SELECT column_name, data_type, is_nullable, column_default, column_key, extra \
             FROM information_schema.columns \
             WHERE table_schema = ? AND table_name = ? \
             ORDER BY ordinal_position",
        )
        .bind(&self.database)
        .bind(table)
        .fetch_all(pool)
        .await?;

        let fk_rows = sqlx::query(
            "SELECT kcu.constraint_name, kcu.column_name, kcu.referenced_table_name, \
                    kcu.referenced_column_name, rc.delete_rule, rc.update_rule \
             FROM information_schema.key_column_usage kcu \
             JOIN information_schema.referential_constraints rc \
               ON kcu.constraint_name = rc.constraint_name AND kcu.table_schema = rc.constraint_schema \
             WHERE kcu.table_schema = ? AND kcu.table_name = ? \
               AND kcu.referenced_table_name IS NOT NULL",
        )
        .bind(&self.database)
        .bind(table)
        .fetch_all(pool)
        .await?;

        let foreign_keys: Vec<ForeignKey> = fk_rows
            .iter()
            .map(|r| ForeignKey {
                name: r.get::<String, _>(0),
                local_col: r.get::<String, _>(1),
                ref_table: r.get::<String, _>(2),
                ref_col: r.get::<String, _>(3),
                on_delete: r.try_get::<String, _>(4).ok(),
                on_update: r.try_get::<String, _>(5).ok(),
            })
            .collect();
        let fk_local_cols: std::collections::HashSet<&str> =
            foreign_keys.iter().map(|fk| fk.local_col.as_str()).collect();

        let columns: Vec<SourceColumn> = col_rows
            .iter()
            .map(|r| {
                let name: String = r.get(0);
                let column_key: String = r.try_get(4).unwrap_or_default();
                let key_kind = if column_key == "PRI" {
                    KeyKind::Primary
                } else if fk_local_cols.contains(name.as_str()) {
                    KeyKind::Foreign
                } else if column_key == "UNI" {
                    KeyKind::Unique
                } else if column_key == "MUL" {
                    KeyKind::Index
                } else {
                    KeyKind::None
                };
                SourceColumn {
                    name,
                    data_type: r.get(1),
                    nullable: r.get::<String, _>(2) == "YES",
                    default: r.try_get::<String, _>(3).ok(),
                    key_kind,
                    extra: r.try_get::<String, _>(5).ok(),
                }
            })
            .collect();

        let idx_rows = sqlx::query(
            "SELECT index_name, non_unique FROM information_schema.statistics \
             WHERE table_schema = ? AND table_name = ? GROUP BY index_name, non_unique",
        )
        .bind(&self.database)
        .bind(table)
        .fetch_all(pool)
        .await?;
        let indexes: Vec<IndexInfo> = idx_rows
            .iter()
            .map(|r| IndexInfo {
                name: r.get(0),
                columns: vec![],
                unique: r.get::<i64, _>(1) == 0,
            })
            .collect();

        let estimate_row = sqlx::query(
            "SELECT table_rows FROM information_schema.tables \
             WHERE table_schema = ? AND table_name = ?",
        )
        .bind(&self.database)
        .bind(table)
        .fetch_optional(pool)
        .await?;
        let estimated_rows = estimate_row
            .map(|r| r.try_get::<i64, _>(0).unwrap_or(0).max(0) as u64)
            .unwrap_or(0);

        Ok(SourceTable {
            schema: Some(self.database.clone()),
            name: table.to_string(),
            columns,
            foreign_keys,
            indexes,
            estimated_rows,
            graph_role: GraphRole::Unknown,
        })
    }
}

#[async_trait]
impl SourceAdapter for MySqlAdapter {
    async fn introspect_schema(&self, filter: &TableFilter) -> Result<Vec<SourceTable>> {
        let all_tables = self.list_tables().await?;
        let mut out = Vec::new();
        for table in all_tables.into_iter().filter(|t| filter.permits(t)) {
            match self.introspect_one(&table).await {
                Ok(t) => out.push(t),
                Err(e) => {
                    warn!(table = %table, error = %e, "skipping table due to introspection error");
                }
            }
        }
        Ok(out)
    }

    async fn extract_rows(
        &self,
        table: &str,
        predicate: Option<&str>,
        row_cap: u64,
        timeout: Duration,
    ) -> Result<Vec<ExtractedRow>> {
        let executor = QueryExecutor::new(&self.conn);
        executor.extract_rows(table, predicate, row_cap, timeout).await
    }

    async fn execute_sql(&self, sql: &str, timeout: Duration) -> Result<Vec<ExtractedRow>> {
        let executor = QueryExecutor::new(&self.conn);
        executor.execute_raw(sql, timeout).await
    }
}
