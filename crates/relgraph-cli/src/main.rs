//! Process entry point: loads config, runs the transform pipeline once,
//! and optionally keeps serving realtime performance data until
//! interrupted. No global singletons — every long-lived object is
//! constructed here and passed down.
//!
//! Initialization order: config -> adapters -> analyzer/transformer ->
//! (optional) collector/analyzer/mapper -> realtime server. No
//! `static`/`lazy_static` state: every long-lived object is constructed
//! here and passed down as `Arc<...>`.

mod config;

use std::fs;
use std::sync::Arc;

use clap::Parser;
use parking_lot::RwLock;
use tracing::{error, info};

use relgraph_analyzer::analyze;
use relgraph_bench::{run_benchmark, BenchmarkSpec};
use relgraph_common::{RelGraphError, Result};
use relgraph_graph::{GraphAggregate, GraphStoreAdapter, Neo4jStore};
use relgraph_metrics::{CollectorConfig, GraphPerformanceMapper, MetricsCollector};
use relgraph_realtime::{build_router, spawn_background_tasks, AppState, BackgroundTaskConfig, RealtimeServerConfig, SessionRegistry};
use relgraph_rules::{load_rules_yaml, RuleSet};
use relgraph_source::{Connection, MySqlAdapter, PoolConfig, PostgresAdapter, SourceAdapter, TableFilter};
use relgraph_transform::{run_transform, TransformConfig};

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "relgraph", about = "Relational-to-graph transformer with a realtime performance feed")]
struct Cli {
    /// Path to the YAML process config.
    #[arg(long)]
    config: String,

    /// Run a one-off transform and exit, ignoring `realtime.enabled`.
    #[arg(long)]
    transform_only: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        error!(error = %e, "relgraph exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let yaml = fs::read_to_string(&cli.config)
        .map_err(|e| RelGraphError::ConfigError(format!("failed to read config file: {e}")))?;
    let config = AppConfig::from_yaml(&yaml)?;
    info!(config_path = %cli.config, "configuration loaded");

    let adapter = build_adapter(&config).await?;
    info!("source adapter connected");

    let filter = TableFilter { allow: config.source.allow_tables.clone(), deny: config.source.deny_tables.clone() };
    let tables = adapter.introspect_schema(&filter).await?;
    info!(table_count = tables.len(), "schema introspected");

    let analysis = analyze(tables);
    info!(
        rule_count = analysis.rules.len(),
        pattern_count = analysis.patterns.len(),
        estimated_size_mb = analysis.estimated_size_mb,
        "schema analysis complete"
    );

    let mut rules = analysis.rules;
    if let Some(path) = &config.rules_path {
        let manual_yaml = fs::read_to_string(path)
            .map_err(|e| RelGraphError::ConfigError(format!("failed to read rules file: {e}")))?;
        let manual_rules: RuleSet = load_rules_yaml(&manual_yaml)?;
        rules.merge(manual_rules);
        info!(path = %path, "manual rules merged over synthesized rules");
    }

    let transform_config = TransformConfig::default();
    let graph = run_transform(adapter.as_ref(), &rules, &transform_config).await;
    info!(
        node_count = graph.node_count(),
        relationship_count = graph.relationship_count(),
        "transform complete"
    );

    let store = Neo4jStore::connect(
        &config.graph_store.uri,
        &config.graph_store.user,
        &config.graph_store.password,
        &config.graph_store.database,
    )
    .await?;
    store.store(&graph).await?;
    info!("graph persisted to the store");

    if cli.transform_only || !config.realtime.enabled {
        store.close().await?;
        return Ok(());
    }

    serve_realtime(config, adapter, graph).await
}

async fn build_adapter(config: &AppConfig) -> Result<Arc<dyn SourceAdapter>> {
    let dialect = config.source.dialect()?;
    let pool_config = PoolConfig { security: config.security_policy(), ..PoolConfig::default() };
    let conn = Connection::new(dialect, &config.source.uri, pool_config).await?;

    let adapter: Arc<dyn SourceAdapter> = match dialect {
        relgraph_source::Dialect::Postgres => Arc::new(PostgresAdapter::new(conn)),
        relgraph_source::Dialect::MySql => {
            let database = config.source.database.clone().ok_or_else(|| {
                RelGraphError::ConfigError("mysql source requires `database` in config".to_string())
            })?;
            Arc::new(MySqlAdapter::new(conn, database))
        }
    };
    Ok(adapter)
}

/// Brings up the collector, analyzer-backed mapper, and the WebSocket
/// server, and blocks until the process receives a shutdown signal.
async fn serve_realtime(config: AppConfig, adapter: Arc<dyn SourceAdapter>, graph: GraphAggregate) -> Result<()> {
    let _ = &adapter; // retained for future re-introspection; the collector queries the source directly

    let metrics_dialect = config.source.dialect()?;
    let metrics_pool_config = PoolConfig { security: config.security_policy(), ..PoolConfig::default() };
    let metrics_conn = Connection::new(metrics_dialect, &config.source.uri, metrics_pool_config).await?;

    let collector = Arc::new(MetricsCollector::new(metrics_conn, CollectorConfig::default()));
    let mapper = Arc::new(GraphPerformanceMapper::new());
    let graph_slot = Arc::new(RwLock::new(graph));
    let registry = SessionRegistry::new();

    let background_config = BackgroundTaskConfig {
        data_update_interval: config.realtime.data_update_interval(),
        ..BackgroundTaskConfig::default()
    };
    let handles = spawn_background_tasks(
        collector.clone(),
        mapper.clone(),
        graph_slot.clone(),
        registry.clone(),
        background_config,
    );

    let server_config = RealtimeServerConfig { max_connections: config.realtime.max_connections, ..RealtimeServerConfig::default() };
    let app_state = AppState { registry, mapper, config: server_config };
    let router = build_router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.realtime.bind)
        .await
        .map_err(|e| RelGraphError::ConnectionError(format!("failed to bind {}: {e}", config.realtime.bind)))?;
    info!(bind = %config.realtime.bind, "realtime server listening");

    let shutdown = tokio::signal::ctrl_c();
    tokio::select! {
        result = axum::serve(listener, router) => {
            if let Err(e) = result {
                error!(error = %e, "realtime server exited unexpectedly");
            }
        }
        _ = shutdown => {
            info!("shutdown signal received");
        }
    }

    handles.abort_all();
    collector.close();
    Ok(())
}

/// Runs a single external benchmark to completion, independent of the
/// transform/serve pipeline. Exposed for operational tooling rather than
/// wired into `run()`'s default path.
#[allow(dead_code)]
async fn run_one_benchmark(spec: BenchmarkSpec, program: &str, args: &[String]) -> Result<()> {
    let cancel = tokio_util::sync::CancellationToken::new();
    let result = run_benchmark(&spec, program, args, cancel).await?;
    info!(status = ?result.status, records = result.records.len(), "benchmark finished");
    Ok(())
}
