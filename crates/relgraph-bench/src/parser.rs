//! Parses latency/throughput lines out of an external load tool's
//! combined stdout/stderr. Tolerant of sysbench-style output:
//!
//! ```text
//!     avg:                                 12.34ms
//!     queries:                             60000  (1000.00 per sec.)
//! ```

use regex::Regex;
use std::sync::OnceLock;

fn latency_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)avg\s*:\s*([0-9]+(?:\.[0-9]+)?)\s*(?:ms)?\s*$").unwrap())
}

fn throughput_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\(\s*([0-9]+(?:\.[0-9]+)?)\s*per\s*sec\.?\s*\)").unwrap())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParsedMetrics {
    pub avg_latency_ms: Option<f64>,
    pub throughput_qps: Option<f64>,
}

/// Scans every line of `output` for the last matching latency/throughput
/// figure. Later lines win, since load tools typically print a running
/// total followed by a final summary.
pub fn parse_output(output: &str) -> ParsedMetrics {
    let mut metrics = ParsedMetrics::default();
    for line in output.lines() {
        if let Some(caps) = latency_pattern().captures(line) {
            if let Ok(value) = caps[1].parse::<f64>() {
                metrics.avg_latency_ms = Some(value);
            }
        }
        if let Some(caps) = throughput_pattern().captures(line) {
            if let Ok(value) = caps[1].parse::<f64>() {
                metrics.throughput_qps = Some(value);
            }
        }
    }
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_latency_and_throughput_from_sysbench_style_output() {
        let output = "\
            SQL statistics:\n\
                queries performed:\n\
                    read:                            60000\n\
            Latency (ms):\n\
                    avg:                                  3.21\n\
            Throughput:\n\
                    queries:                             60000 (1000.55 per sec.)\n";
        let metrics = parse_output(output);
        assert_eq!(metrics.avg_latency_ms, Some(3.21));
        assert_eq!(metrics.throughput_qps, Some(1000.55));
    }

    #[test]
    fn missing_lines_leave_fields_none() {
        let metrics = parse_output("nothing useful here");
        assert!(metrics.avg_latency_ms.is_none());
        assert!(metrics.throughput_qps.is_none());
    }
}
