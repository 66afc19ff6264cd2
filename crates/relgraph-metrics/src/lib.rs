//! Instrumentation collector, stateless performance analyzer, and
//! graph-performance mapper.

pub mod analyzer;
pub mod collector;
pub mod mapper;
pub mod snapshot;

pub use analyzer::{
    analyze_trend, detect_bottlenecks, detect_hotspots, detect_regressions, performance_score,
    Bottleneck, BottleneckTag, Hotspot, HotspotWeights, PerformanceScore, Rating, Regression,
    RegressionMetric, ScoreWeights, Severity, Trend, TrendDirection,
};
pub use collector::{CollectorConfig, MetricsCollector};
pub use mapper::{map_performance_to_graph, EdgePerformance, GraphPerformanceMapper, NodePerformance, PerformanceGraphData};
pub use snapshot::{
    classify_relationship_kind, ConnectionsSummary, GlobalCounters, IndexUsageSummary,
    MetricsSummary, PerformanceSnapshot, RelationshipKind, ReplicationSummary, StatementDigestSummary,
    TableIoSummary,
};

pub use relgraph_common::{RelGraphError, Result};
