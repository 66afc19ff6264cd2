//! Spawns an external load tool, captures its output, and synthesizes a
//! [`BenchmarkResult`].

use std::process::Stdio;

use chrono::Utc;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use relgraph_common::{RelGraphError, Result};

use crate::parser::parse_output;
use crate::result::{BenchmarkResult, BenchmarkStatus, QueryPerformanceRecord};
use crate::spec::BenchmarkSpec;

const OUTPUT_TAIL_BYTES: usize = 4096;

/// Runs `program` with `args` against `spec`, honoring `cancel` for
/// external cancellation. The child is always spawned with piped
/// stdout/stderr and killed on cancellation or drop.
pub async fn run_benchmark(
    spec: &BenchmarkSpec,
    program: &str,
    args: &[String],
    cancel: CancellationToken,
) -> Result<BenchmarkResult> {
    spec.validate()?;

    let started_at = Utc::now();

    let mut command = Command::new(program);
    command
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| RelGraphError::BenchmarkError(format!("failed to spawn '{program}': {e}")))?;

    let mut stdout_handle = child
        .stdout
        .take()
        .ok_or_else(|| RelGraphError::BenchmarkError("failed to capture stdout".to_string()))?;
    let mut stderr_handle = child
        .stderr
        .take()
        .ok_or_else(|| RelGraphError::BenchmarkError("failed to capture stderr".to_string()))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout_handle.read_to_end(&mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr_handle.read_to_end(&mut buf).await;
        buf
    });

    let status = tokio::select! {
        result = child.wait() => Some(result),
        _ = cancel.cancelled() => {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill cancelled benchmark child");
            }
            None
        }
    };

    let stdout_bytes = stdout_task.await.unwrap_or_default();
    let stderr_bytes = stderr_task.await.unwrap_or_default();
    let stdout = String::from_utf8_lossy(&stdout_bytes).to_string();
    let stderr = String::from_utf8_lossy(&stderr_bytes).to_string();
    let finished_at = Utc::now();

    let (status, error) = match status {
        None => (BenchmarkStatus::Cancelled, Some("benchmark cancelled by caller".to_string())),
        Some(Ok(exit)) if exit.success() => (BenchmarkStatus::Completed, None),
        Some(Ok(exit)) => (
            BenchmarkStatus::Failed,
            Some(format!("load tool exited with status {exit}")),
        ),
        Some(Err(e)) => (BenchmarkStatus::Failed, Some(format!("failed to wait on child: {e}"))),
    };

    let metrics = parse_output(&stdout);
    let (read_ratio, write_ratio) = spec.read_write_proportions();
    let mut records = Vec::new();
    if let (Some(avg_latency_ms), Some(throughput_qps)) = (metrics.avg_latency_ms, metrics.throughput_qps) {
        if read_ratio > 0.0 {
            records.push(QueryPerformanceRecord {
                label: format!("{}:read", spec.test_type),
                avg_latency_ms,
                throughput_qps: throughput_qps * read_ratio,
                is_read: true,
            });
        }
        if write_ratio > 0.0 {
            records.push(QueryPerformanceRecord {
                label: format!("{}:write", spec.test_type),
                avg_latency_ms,
                throughput_qps: throughput_qps * write_ratio,
                is_read: false,
            });
        }
    }

    Ok(BenchmarkResult {
        status,
        test_type: spec.test_type.clone(),
        started_at,
        finished_at,
        records,
        raw_stdout_tail: tail(&stdout, OUTPUT_TAIL_BYTES),
        raw_stderr_tail: tail(&stderr, OUTPUT_TAIL_BYTES),
        error,
    })
}

fn tail(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let start = text.len() - max_bytes;
    let boundary = (start..text.len()).find(|&i| text.is_char_boundary(i)).unwrap_or(start);
    text[boundary..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::BenchmarkSpec;

    fn spec() -> BenchmarkSpec {
        BenchmarkSpec {
            test_type: "oltp_read_write".to_string(),
            target_url: "mysql://bench@localhost/shop".to_string(),
            threads: 4,
            duration_secs: 5,
            table: None,
        }
    }

    #[tokio::test]
    async fn invalid_spec_is_rejected_before_spawning() {
        let mut bad_spec = spec();
        bad_spec.threads = 0;
        let cancel = CancellationToken::new();
        let result = run_benchmark(&bad_spec, "echo", &[], cancel).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn completed_run_captures_output_and_status() {
        let cancel = CancellationToken::new();
        let result = run_benchmark(&spec(), "echo", &["avg: 5.0ms (200.0 per sec.)".to_string()], cancel)
            .await
            .unwrap();
        assert_eq!(result.status, BenchmarkStatus::Completed);
        assert!(!result.records.is_empty());
    }

    #[tokio::test]
    async fn cancellation_before_completion_yields_cancelled_status() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = run_benchmark(&spec(), "sleep", &["5".to_string()], cancel).await.unwrap();
        assert_eq!(result.status, BenchmarkStatus::Cancelled);
    }

    #[test]
    fn tail_truncates_to_char_boundary() {
        let text = "x".repeat(10);
        assert_eq!(tail(&text, 4).len(), 4);
    }
}
