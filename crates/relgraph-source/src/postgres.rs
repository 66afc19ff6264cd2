//! PostgreSQL implementation of [`crate::adapter::SourceAdapter`], backed
//! by `information_schema` and `pg_catalog` introspection.

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

pub struct PostgresAdapter {
    conn: Connection,
}

impl PostgresAdapter {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let pool = self.conn.pg_pool().expect("postgres adapter holds a postgres pool");
        let rows = sqlx::query(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE'",
        )
        .fetch_all(pool)
        .await?;
        Ok(rows.iter().map(|r| r.get::<String, _>(0)).collect())
    }

    async fn introspect_one(&self, table: &str) -> Result<SourceTable> {
        let pool = self.conn.pg_pool().expect("postgres adapter holds a postgres pool");

        let col_rows = sqlx::query(
            "SELECT column_name, data_type, is_nullable, column_default \
             FROM information_schema.columns \
             WHERE table_schema = 'public' AND table_name = $1 \
             ORDER BY ordinal_position",
        )
        .bind(table)
        .fetch_all(pool)
        .await?;

        let pk_rows = sqlx::query(
            "SELECT kcu.column_name FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
             WHERE tc.table_schema = 'public' AND tc.table_name = $1 \
               AND tc.constraint_type = 'PRIMARY KEY'",
        )
        .bind(table)
        .fetch_all(pool)
        .await?;
        let primary_keys: std::collections::HashSet<String> =
            pk_rows.iter().map(|r| r.get::<String, _>(0)).collect();

        let fk_rows = sqlx::query(
            "SELECT tc.constraint_name, kcu.column_name, ccu.table_name, ccu.column_name, \
                    rc.delete_rule, rc.update_rule \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
             JOIN information_schema.constraint_column_usage ccu \
               ON tc.constraint_name = ccu.constraint_name \
             JOIN information_schema.referential_constraints rc \
               ON tc.constraint_name = rc.constraint_name \
             WHERE tc.table_schema = 'public' AND tc.table_name = $1 \
               AND tc.constraint_type = 'FOREIGN KEY'",
        )
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
                let key_kind = if primary_keys.contains(&name) {
                    KeyKind::Primary
                } else if fk_local_cols.contains(name.as_str()) {
                    KeyKind::Foreign
                } else {
                    KeyKind::None
                };
                SourceColumn {
                    name,
                    data_type: r.get(1),
                    nullable: r.get::<String, _>(2) == "YES",
                    default: r.try_get::<String, _>(3).ok(),
                    key_kind,
                    extra: None,
                }
            })
            .collect();

        let idx_rows = sqlx::query(
            "SELECT indexname, indexdef FROM pg_indexes WHERE schemaname = 'public' AND tablename = $1",
        )
        .bind(table)
        .fetch_all(pool)
        .await?;
        let indexes: Vec<IndexInfo> = idx_rows
            .iter()
            .map(|r| {
                let def: String = r.get(1);
                IndexInfo {
                    name: r.get(0),
                    columns: vec![],
                    unique: def.contains("CREATE UNIQUE"),
                }
            })
            .collect();

        let estimate_row = sqlx::query(
            "SELECT reltuples::bigint FROM pg_class WHERE relname = $1",
        )
        .bind(table)
        .fetch_optional(pool)
        .await?;
        let estimated_rows = estimate_row
            .map(|r| r.get::<i64, _>(0).max(0) as u64)
            .unwrap_or(0);

        Ok(SourceTable {
            schema: Some("public".to_string()),
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
impl SourceAdapter for PostgresAdapter {
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
