//! Stateless performance analysis: bottleneck detection, hotspot scoring,
//! regression detection, composite scoring, and trend analysis. Every
//! function here is a pure transform over snapshots — no I/O, no shared
//! state.

use serde::{Deserialize, Serialize};

use crate::snapshot::PerformanceSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BottleneckTag {
    Query,
    Index,
    Join,
    Lock,
    Io,
    Cpu,
    Memory,
    Network,
    Schema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bottleneck {
    pub tag: BottleneckTag,
    pub severity: Severity,
    pub confidence: f64,
    pub description: String,
    pub recommendation: String,
}

/// Latency severity ladder: `>3×T → critical, >2×T → high,
/// >1×T → medium, else low`, where `T` is `threshold_ms`.
fn latency_severity(latency_ms: f64, threshold_ms: f64) -> Severity {
    if threshold_ms <= 0.0 {
        return Severity::Low;
    }
    let ratio = latency_ms / threshold_ms;
    if ratio > 3.0 {
        Severity::Critical
    } else if ratio > 2.0 {
        Severity::High
    } else if ratio > 1.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Flags statement digests whose average latency exceeds `threshold_ms`,
/// and flags any table whose write latency dominates its read latency as
/// a lock bottleneck candidate.
pub fn detect_bottlenecks(snapshot: &PerformanceSnapshot, threshold_ms: f64) -> Vec<Bottleneck> {
    let mut out = Vec::new();

    for digest in &snapshot.statement_digests {
        if digest.avg_latency_ms <= threshold_ms {
            continue;
        }
        let severity = latency_severity(digest.avg_latency_ms, threshold_ms);
        let tag = if !digest.index_used {
            BottleneckTag::Index
        } else {
            match digest.relationship_kind {
                crate::snapshot::RelationshipKind::Join => BottleneckTag::Join,
                _ => BottleneckTag::Query,
            }
        };
        let confidence = (digest.avg_latency_ms / threshold_ms / 4.0).min(1.0);
        let recommendation = match tag {
            BottleneckTag::Index => "add an index covering this query's filter columns".to_string(),
            BottleneckTag::Join => "review join order and verify join columns are indexed".to_string(),
            _ => "profile this query's execution plan".to_string(),
        };
        out.push(Bottleneck {
            tag,
            severity,
            confidence,
            description: format!(
                "statement averaging {:.2}ms exceeds threshold {:.2}ms: {}",
                digest.avg_latency_ms, threshold_ms, digest.digest_text
            ),
            recommendation,
        });
    }

    for table in &snapshot.table_io {
        if table.write_latency_ms > table.read_latency_ms * 2.0 && table.write_latency_ms > threshold_ms {
            out.push(Bottleneck {
                tag: BottleneckTag::Lock,
                severity: latency_severity(table.write_latency_ms, threshold_ms),
                confidence: 0.6,
                description: format!(
                    "table '{}' write latency ({:.2}ms) far exceeds read latency ({:.2}ms)",
                    table.table_name, table.write_latency_ms, table.read_latency_ms
                ),
                recommendation: "check for lock contention or unindexed write paths on this table".to_string(),
            });
        }
    }

    out
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hotspot {
    pub subject: String,
    pub score: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct HotspotWeights {
    pub latency: f64,
    pub frequency: f64,
    pub resource: f64,
}

impl Default for HotspotWeights {
    fn default() -> Self {
        Self { latency: 0.4, frequency: 0.4, resource: 0.2 }
    }
}

/// Weighted hotspot score in `[0, 100]`; a subject scoring above 50 is a
/// hotspot. Latency and frequency are each normalized against the
/// maximum observed in this snapshot; resource uses the index-miss ratio
/// as the cheapest available resource-pressure proxy.
pub fn detect_hotspots(snapshot: &PerformanceSnapshot, weights: HotspotWeights) -> Vec<Hotspot> {
    let max_latency = snapshot
        .statement_digests
        .iter()
        .map(|d| d.avg_latency_ms)
        .fold(0.0_f64, f64::max);
    let max_count = snapshot
        .statement_digests
        .iter()
        .map(|d| d.count_star)
        .max()
        .unwrap_or(0);

    snapshot
        .statement_digests
        .iter()
        .map(|d| {
            let latency_norm = if max_latency > 0.0 { d.avg_latency_ms / max_latency } else { 0.0 };
            let freq_norm = if max_count > 0 { d.count_star as f64 / max_count as f64 } else { 0.0 };
            let resource_norm = if d.index_used { 0.0 } else { 1.0 };
            let score = (weights.latency * latency_norm
                + weights.frequency * freq_norm
                + weights.resource * resource_norm)
                * 100.0;
            Hotspot { subject: d.digest_text.clone(), score }
        })
        .filter(|h| h.score > 50.0)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegressionMetric {
    Latency,
    Throughput,
    ErrorRate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Regression {
    pub metric: RegressionMetric,
    pub severity: Severity,
    pub baseline: f64,
    pub current: f64,
    pub change_pct: f64,
}

fn regression_severity(change_pct_abs: f64) -> Severity {
    if change_pct_abs >= 50.0 {
        Severity::Critical
    } else if change_pct_abs >= 25.0 {
        Severity::High
    } else if change_pct_abs >= 10.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Regression thresholds: latency regresses on a >10% increase,
/// throughput on a >5% decrease, error rate on a >20% relative increase
/// OR crossing the 1% absolute threshold.
pub fn detect_regressions(
    baseline: &PerformanceSnapshot,
    current: &PerformanceSnapshot,
    baseline_error_rate: f64,
    current_error_rate: f64,
) -> Vec<Regression> {
    let mut out = Vec::new();

    let baseline_latency = baseline.avg_latency_ms();
    let current_latency = current.avg_latency_ms();
    if baseline_latency > 0.0 {
        let change = (current_latency - baseline_latency) / baseline_latency * 100.0;
        if change > 10.0 {
            out.push(Regression {
                metric: RegressionMetric::Latency,
                severity: regression_severity(change.abs()),
                baseline: baseline_latency,
                current: current_latency,
                change_pct: change,
            });
        }
    }

    if let Some(throughput_change) = current.qps_since(baseline) {
        let baseline_throughput = baseline
            .statement_digests
            .iter()
            .map(|d| d.count_star)
            .sum::<u64>() as f64;
        if baseline_throughput > 0.0 {
            let change = (throughput_change - baseline_throughput) / baseline_throughput * 100.0;
            if change < -5.0 {
                out.push(Regression {
                    metric: RegressionMetric::Throughput,
                    severity: regression_severity(change.abs()),
                    baseline: baseline_throughput,
                    current: throughput_change,
                    change_pct: change,
                });
            }
        }
    }

    let crossed_one_pct = baseline_error_rate < 1.0 && current_error_rate >= 1.0;
    let relative_change = if baseline_error_rate > 0.0 {
        (current_error_rate - baseline_error_rate) / baseline_error_rate * 100.0
    } else if current_error_rate > 0.0 {
        100.0
    } else {
        0.0
    };
    if relative_change > 20.0 || crossed_one_pct {
        out.push(Regression {
            metric: RegressionMetric::ErrorRate,
            severity: regression_severity(relative_change.abs().max(if crossed_one_pct { 25.0 } else { 0.0 })),
            baseline: baseline_error_rate,
            current: current_error_rate,
            change_pct: relative_change,
        });
    }

    out
}

#[derive(Debug, Clone, Copy)]
pub struct ScoreWeights {
    pub latency: f64,
    pub throughput: f64,
    pub error_rate: f64,
    pub resource: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self { latency: 0.30, throughput: 0.25, error_rate: 0.25, resource: 0.20 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rating {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceScore {
    pub score: f64,
    pub rating: Rating,
}

/// Piecewise-linear latency curve: `<=10ms -> 100`, `10-50 -> 100..70`,
/// `50-200 -> 70..30`, `200-1000 -> 30..0`, beyond `-> 0`.
fn latency_curve(latency_ms: f64) -> f64 {
    if latency_ms <= 10.0 {
        100.0
    } else if latency_ms <= 50.0 {
        lerp(latency_ms, 10.0, 50.0, 100.0, 70.0)
    } else if latency_ms <= 200.0 {
        lerp(latency_ms, 50.0, 200.0, 70.0, 30.0)
    } else if latency_ms <= 1000.0 {
        lerp(latency_ms, 200.0, 1000.0, 30.0, 0.0)
    } else {
        0.0
    }
}

/// Piecewise-linear throughput curve: `>=1000qps -> 100`,
/// `100-1000 -> 70..100`, `10-100 -> 30..70`, `<10 -> linear to 0`.
fn throughput_curve(qps: f64) -> f64 {
    if qps >= 1000.0 {
        100.0
    } else if qps >= 100.0 {
        lerp(qps, 100.0, 1000.0, 70.0, 100.0)
    } else if qps >= 10.0 {
        lerp(qps, 10.0, 100.0, 30.0, 70.0)
    } else {
        lerp(qps.max(0.0), 0.0, 10.0, 0.0, 30.0)
    }
}

/// Piecewise-linear error-rate curve, `error_pct` in percent:
/// `<=0.1 -> 100`, `0.1-1 -> 100..70`, `1-5 -> 70..30`, `>5 -> 30..0`.
fn error_rate_curve(error_pct: f64) -> f64 {
    if error_pct <= 0.1 {
        100.0
    } else if error_pct <= 1.0 {
        lerp(error_pct, 0.1, 1.0, 100.0, 70.0)
    } else if error_pct <= 5.0 {
        lerp(error_pct, 1.0, 5.0, 70.0, 30.0)
    } else if error_pct <= 20.0 {
        lerp(error_pct, 5.0, 20.0, 30.0, 0.0)
    } else {
        0.0
    }
}

fn lerp(x: f64, x0: f64, x1: f64, y0: f64, y1: f64) -> f64 {
    if (x1 - x0).abs() < f64::EPSILON {
        return y0;
    }
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

fn rating_for(score: f64) -> Rating {
    if score >= 90.0 {
        Rating::Excellent
    } else if score >= 75.0 {
        Rating::Good
    } else if score >= 60.0 {
        Rating::Fair
    } else if score >= 40.0 {
        Rating::Poor
    } else {
        Rating::Critical
    }
}

/// Composite performance score: weighted 0.30/0.25/0.25/0.20
/// over latency/throughput/error-rate/resource, each mapped through its
/// own piecewise-linear curve before weighting.
pub fn performance_score(
    avg_latency_ms: f64,
    qps: f64,
    error_rate_pct: f64,
    resource_utilization_pct: f64,
    weights: ScoreWeights,
) -> PerformanceScore {
    let resource_score = (100.0 - resource_utilization_pct).clamp(0.0, 100.0);
    let score = weights.latency * latency_curve(avg_latency_ms)
        + weights.throughput * throughput_curve(qps)
        + weights.error_rate * error_rate_curve(error_rate_pct)
        + weights.resource * resource_score;
    PerformanceScore { score, rating: rating_for(score) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Improving,
    Stable,
    Degrading,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trend {
    pub metric: String,
    pub direction: TrendDirection,
    pub slope: f64,
}

/// Simple linear-regression slope over `(timestamp_seconds, value)` pairs;
/// returns `None` when fewer than `min_points` samples are available.
pub fn analyze_trend(metric: &str, points: &[(i64, f64)], min_points: usize) -> Option<Trend> {
    if points.len() < min_points || points.len() < 2 {
        return None;
    }
    let mut sorted = points.to_vec();
    sorted.sort_by_key(|(t, _)| *t);

    let n = sorted.len() as f64;
    let mean_x = sorted.iter().map(|(t, _)| *t as f64).sum::<f64>() / n;
    let mean_y = sorted.iter().map(|(_, v)| v).sum::<f64>() / n;

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (t, v) in &sorted {
        let dx = *t as f64 - mean_x;
        numerator += dx * (v - mean_y);
        denominator += dx * dx;
    }
    let slope = if denominator.abs() < f64::EPSILON { 0.0 } else { numerator / denominator };

    let direction = if slope.abs() < 1e-6 {
        TrendDirection::Stable
    } else if slope < 0.0 {
        TrendDirection::Improving
    } else {
        TrendDirection::Degrading
    };

    Some(Trend { metric: metric.to_string(), direction, slope })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{RelationshipKind, StatementDigestSummary};
    use chrono::Utc;

    fn digest(avg_latency_ms: f64, count_star: u64, index_used: bool) -> StatementDigestSummary {
        StatementDigestSummary {
            digest_text: "SELECT ? FROM orders".to_string(),
            count_star,
            avg_latency_ms,
            sum_latency_ms: avg_latency_ms * count_star as f64,
            index_used,
            relationship_kind: RelationshipKind::Plain,
        }
    }

    #[test]
    fn bottleneck_severity_ladder() {
        assert_eq!(latency_severity(10.0, 10.0), Severity::Low);
        assert_eq!(latency_severity(25.0, 10.0), Severity::Medium);
        assert_eq!(latency_severity(35.0, 10.0), Severity::High);
        assert_eq!(latency_severity(45.0, 10.0), Severity::Critical);
    }

    #[test]
    fn detect_bottlenecks_flags_slow_unindexed_query() {
        let snapshot = PerformanceSnapshot {
            statement_digests: vec![digest(500.0, 10, false)],
            ..PerformanceSnapshot::empty(Utc::now())
        };
        let bottlenecks = detect_bottlenecks(&snapshot, 100.0);
        assert_eq!(bottlenecks.len(), 1);
        assert_eq!(bottlenecks[0].tag, BottleneckTag::Index);
        assert_eq!(bottlenecks[0].severity, Severity::Critical);
    }

    #[test]
    fn hotspot_requires_score_above_fifty() {
        let snapshot = PerformanceSnapshot {
            statement_digests: vec![digest(1000.0, 1000, false), digest(1.0, 1, true)],
            ..PerformanceSnapshot::empty(Utc::now())
        };
        let hotspots = detect_hotspots(&snapshot, HotspotWeights::default());
        assert_eq!(hotspots.len(), 1);
        assert!(hotspots[0].score > 50.0);
    }

    #[test]
    fn performance_score_piecewise_curves_match_bands() {
        let excellent = performance_score(5.0, 2000.0, 0.0, 10.0, ScoreWeights::default());
        assert_eq!(excellent.rating, Rating::Excellent);

        let critical = performance_score(2000.0, 1.0, 30.0, 95.0, ScoreWeights::default());
        assert_eq!(critical.rating, Rating::Critical);
    }

    #[test]
    fn error_rate_regression_detects_crossing_one_percent() {
        let empty = PerformanceSnapshot::empty(Utc::now());
        let regressions = detect_regressions(&empty, &empty, 0.5, 1.2);
        assert!(regressions.iter().any(|r| r.metric == RegressionMetric::ErrorRate));
    }

    #[test]
    fn trend_requires_minimum_points() {
        assert!(analyze_trend("latency", &[(1, 1.0)], 3).is_none());
        let points = vec![(1, 10.0), (2, 20.0), (3, 30.0)];
        let trend = analyze_trend("latency", &points, 3).unwrap();
        assert_eq!(trend.direction, TrendDirection::Degrading);
    }
}
