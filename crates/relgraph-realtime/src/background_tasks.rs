//! Background tasks driving the realtime push server: a collector loop
//! that samples metrics on `data_update_interval` and broadcasts them,
//! and a cleanup loop that sweeps stale sessions every 30 seconds. Each
//! runs as its own `tokio::spawn`'d loop returning a `JoinHandle`, as a
//! long-running server task rather than a post-response one-shot.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use relgraph_graph::GraphAggregate;
use relgraph_metrics::{detect_bottlenecks, GraphPerformanceMapper, MetricsCollector, PerformanceSnapshot};

use crate::session::{
    Envelope, EnvelopeType, SessionRegistry, TOPIC_ALERTS, TOPIC_METRICS, TOPIC_PERFORMANCE,
};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct BackgroundTaskConfig {
    pub data_update_interval: Duration,
    pub max_idle: Duration,
    pub bottleneck_threshold_ms: f64,
}

impl Default for BackgroundTaskConfig {
    fn default() -> Self {
        Self {
            data_update_interval: Duration::from_secs(2),
            max_idle: Duration::from_secs(90),
            bottleneck_threshold_ms: 100.0,
        }
    }
}

/// Handles for the three long-running loops, so the caller can abort them
/// on server shutdown.
pub struct BackgroundTaskHandles {
    pub collector: JoinHandle<()>,
    pub alert: JoinHandle<()>,
    pub cleanup: JoinHandle<()>,
}

impl BackgroundTaskHandles {
    pub fn abort_all(&self) {
        self.collector.abort();
        self.alert.abort();
        self.cleanup.abort();
    }
}

/// Spawns the collector, alert, and cleanup loops and returns their
/// handles. `graph` is the single most-recent transform result the
/// mapper projects performance data onto.
pub fn spawn_background_tasks(
    collector: Arc<MetricsCollector>,
    mapper: Arc<GraphPerformanceMapper>,
    graph: Arc<RwLock<GraphAggregate>>,
    registry: SessionRegistry,
    config: BackgroundTaskConfig,
) -> BackgroundTaskHandles {
    let (alert_tx, alert_rx) = mpsc::channel(256);

    let collector_handle = spawn_collector_loop(
        collector,
        mapper,
        graph,
        registry.clone(),
        alert_tx,
        config.clone(),
    );
    let alert_handle = spawn_alert_loop(registry.clone(), alert_rx);
    let cleanup_handle = spawn_cleanup_loop(registry, config.max_idle);

    BackgroundTaskHandles { collector: collector_handle, alert: alert_handle, cleanup: cleanup_handle }
}

fn spawn_collector_loop(
    collector: Arc<MetricsCollector>,
    mapper: Arc<GraphPerformanceMapper>,
    graph: Arc<RwLock<GraphAggregate>>,
    registry: SessionRegistry,
    alert_tx: mpsc::Sender<Vec<relgraph_metrics::Bottleneck>>,
    config: BackgroundTaskConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.data_update_interval);
        let mut previous_snapshot: Option<PerformanceSnapshot> = None;
        loop {
            ticker.tick().await;
            let snapshot = collector.collect().await;

            let graph_data = {
                let aggregate = graph.read();
                mapper.update(&snapshot, &aggregate)
            };

            let envelope = match serde_json::to_value(&graph_data) {
                Ok(data) => Envelope::new(EnvelopeType::Data, TOPIC_PERFORMANCE, data),
                Err(e) => {
                    warn!(error = %e, "failed to serialize performance graph data, skipping broadcast");
                    continue;
                }
            };
            registry.broadcast(&envelope);

            let summary = snapshot.summarize(previous_snapshot.as_ref());
            match serde_json::to_value(&summary) {
                Ok(data) => registry.broadcast(&Envelope::new(EnvelopeType::Data, TOPIC_METRICS, data)),
                Err(e) => warn!(error = %e, "failed to serialize metrics summary, skipping broadcast"),
            }
            previous_snapshot = Some(snapshot.clone());

            let bottlenecks = detect_bottlenecks(&snapshot, config.bottleneck_threshold_ms);
            if !bottlenecks.is_empty() {
                // Bounded, best-effort: a full alert channel means the
                // alert loop is behind, and this tick's bottlenecks are
                // dropped rather than queued indefinitely.
                if alert_tx.try_send(bottlenecks).is_err() {
                    warn!("alert channel full, dropping this tick's bottleneck alerts");
                }
            }
        }
    })
}

fn spawn_alert_loop(
    registry: SessionRegistry,
    mut alert_rx: mpsc::Receiver<Vec<relgraph_metrics::Bottleneck>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(bottlenecks) = alert_rx.recv().await {
            for bottleneck in bottlenecks {
                let data = match serde_json::to_value(&bottleneck) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                let envelope = Envelope::new(EnvelopeType::Data, TOPIC_ALERTS, data);
                registry.broadcast(&envelope);
            }
        }
    })
}

fn spawn_cleanup_loop(registry: SessionRegistry, max_idle: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            ticker.tick().await;
            let removed = registry.sweep_stale(max_idle);
            if removed > 0 {
                info!(removed, "cleanup swept stale subscriber sessions");
            }
        }
    })
}

/// Builds a pong control-frame response for a client ping.
pub fn pong_message() -> Message {
    let envelope = Envelope::new(EnvelopeType::Pong, "control", serde_json::json!({}));
    Message::Text(serde_json::to_string(&envelope).unwrap_or_default().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_task_config_defaults() {
        let config = BackgroundTaskConfig::default();
        assert_eq!(config.max_idle, Duration::from_secs(90));
        assert_eq!(config.data_update_interval, Duration::from_secs(2));
    }
}
