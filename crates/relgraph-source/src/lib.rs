//! Dialect-polymorphic source database adapter.
//!
//! Connects to a MySQL or PostgreSQL instance, introspects its schema into
//! the [`schema::SourceTable`] data model, and extracts rows as
//! [`relgraph_common::RawValue`]s through a single [`adapter::SourceAdapter`]
//! trait. Dialect differences are data on [`dialect::Dialect`], not a
//! second trait hierarchy — both [`postgres::PostgresAdapter`] and
//! [`mysql::MySqlAdapter`] share the same connection pooling, retry, and
//! query-execution code.

pub mod adapter;
pub mod connection;
pub mod dialect;
pub mod executor;
pub mod mysql;
pub mod postgres;
pub mod row;
pub mod schema;
pub mod types;

pub use adapter::{SourceAdapter, TableFilter};
pub use connection::{Connection, PoolConfig};
pub use dialect::{Dialect, SecurityPolicy, SslMode};
pub use executor::{ExecutorConfig, QueryExecutor};
pub use mysql::MySqlAdapter;
pub use postgres::PostgresAdapter;
pub use row::ExtractedRow;
pub use schema::{ForeignKey, GraphRole, IndexInfo, KeyKind, SourceColumn, SourceTable};

pub use relgraph_common::{RelGraphError, Result};
