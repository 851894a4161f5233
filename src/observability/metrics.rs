//! Thread-safe metrics collection
//!
//! Atomic counters for pipeline runs and LLM calls, plus mutex-protected
//! timing samples for run durations and per-tool statistics.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Samples kept per timing series
const MAX_TIMING_SAMPLES: usize = 1000;

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector using atomics and mutexes
pub struct MetricsCollector {
    pipelines_received: AtomicU64,
    pipelines_rejected: AtomicU64,
    pipelines_in_flight: AtomicU64,
    pipelines_succeeded: AtomicU64,
    pipelines_failed: AtomicU64,
    max_in_flight_reached: AtomicU64,

    llm_requests: AtomicU64,
    llm_failures: AtomicU64,

    run_durations: Mutex<Vec<u64>>, // milliseconds
    tool_stats: Mutex<HashMap<String, ToolExecutionStats>>,

    started_at: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            pipelines_received: AtomicU64::new(0),
            pipelines_rejected: AtomicU64::new(0),
            pipelines_in_flight: AtomicU64::new(0),
            pipelines_succeeded: AtomicU64::new(0),
            pipelines_failed: AtomicU64::new(0),
            max_in_flight_reached: AtomicU64::new(0),
            llm_requests: AtomicU64::new(0),
            llm_failures: AtomicU64::new(0),
            run_durations: Mutex::new(Vec::new()),
            tool_stats: Mutex::new(HashMap::new()),
            started_at: AtomicU64::new(current_timestamp()),
        }
    }

    // Pipeline metrics
    pub fn pipeline_received(&self) {
        self.pipelines_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Request refused before a run was started (e.g. empty topic)
    pub fn pipeline_rejected(&self) {
        self.pipelines_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pipeline_started(&self) {
        let in_flight = self.pipelines_in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.max_in_flight_reached
            .fetch_max(in_flight, Ordering::Relaxed);
    }

    pub fn pipeline_completed(&self, duration: Duration) {
        self.pipelines_succeeded.fetch_add(1, Ordering::Relaxed);
        self.finish_pipeline(duration);
    }

    pub fn pipeline_failed(&self, duration: Duration) {
        self.pipelines_failed.fetch_add(1, Ordering::Relaxed);
        self.finish_pipeline(duration);
    }

    fn finish_pipeline(&self, duration: Duration) {
        // Saturating: a reset between start and finish must not wrap
        let _ = self
            .pipelines_in_flight
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
        if let Ok(mut durations) = self.run_durations.lock() {
            push_sample(&mut durations, duration);
        }
    }

    // LLM metrics
    pub fn llm_request(&self) {
        self.llm_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn llm_request_failed(&self) {
        self.llm_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Tool execution metrics
    pub fn tool_executed(&self, tool_name: &str, duration: Duration, success: bool) {
        if let Ok(mut stats) = self.tool_stats.lock() {
            let tool_stats = stats.entry(tool_name.to_string()).or_default();
            tool_stats.executions += 1;
            tool_stats.last_execution = current_timestamp();
            push_sample(&mut tool_stats.execution_times, duration);
            if !success {
                tool_stats.failures += 1;
            }
        }
    }

    /// Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.pipelines_received,
            &self.pipelines_rejected,
            &self.pipelines_in_flight,
            &self.pipelines_succeeded,
            &self.pipelines_failed,
            &self.max_in_flight_reached,
            &self.llm_requests,
            &self.llm_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.started_at.store(current_timestamp(), Ordering::Relaxed);
        if let Ok(mut durations) = self.run_durations.lock() {
            durations.clear();
        }
        if let Ok(mut stats) = self.tool_stats.lock() {
            stats.clear();
        }
    }

    fn tool_snapshots(&self) -> HashMap<String, ToolStatsSnapshot> {
        let Ok(stats) = self.tool_stats.lock() else {
            return HashMap::new();
        };

        stats
            .iter()
            .map(|(name, stats)| {
                let success_rate = if stats.executions == 0 {
                    0.0
                } else {
                    (stats.executions - stats.failures) as f64 / stats.executions as f64
                };
                (
                    name.clone(),
                    ToolStatsSnapshot {
                        executions: stats.executions,
                        failures: stats.failures,
                        avg_execution_time_ms: average(&stats.execution_times),
                        last_execution: stats.last_execution,
                        success_rate,
                    },
                )
            })
            .collect()
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();

        let mut durations = self
            .run_durations
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default();
        durations.sort_unstable();

        let tools = self.tool_snapshots();
        let total_executions = tools.values().map(|t| t.executions).sum();
        let total_failures = tools.values().map(|t| t.failures).sum();

        MetricsSnapshot {
            pipelines: PipelineMetrics {
                received: self.pipelines_received.load(Ordering::Relaxed),
                rejected: self.pipelines_rejected.load(Ordering::Relaxed),
                in_flight: self.pipelines_in_flight.load(Ordering::Relaxed),
                succeeded: self.pipelines_succeeded.load(Ordering::Relaxed),
                failed: self.pipelines_failed.load(Ordering::Relaxed),
                max_in_flight_reached: self.max_in_flight_reached.load(Ordering::Relaxed),
                avg_duration_ms: average(&durations),
                duration_p50_ms: percentile(&durations, 50.0),
                duration_p95_ms: percentile(&durations, 95.0),
            },
            llm: LlmMetrics {
                requests: self.llm_requests.load(Ordering::Relaxed),
                failures: self.llm_failures.load(Ordering::Relaxed),
            },
            tools: ToolMetrics {
                tool_stats: tools,
                total_executions,
                total_failures,
            },
            uptime_seconds: now.saturating_sub(self.started_at.load(Ordering::Relaxed)),
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct ToolExecutionStats {
    executions: u64,
    failures: u64,
    execution_times: Vec<u64>, // milliseconds
    last_execution: u64,
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub pipelines: PipelineMetrics,
    pub llm: LlmMetrics,
    pub tools: ToolMetrics,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct PipelineMetrics {
    pub received: u64,
    pub rejected: u64,
    pub in_flight: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub max_in_flight_reached: u64,
    pub avg_duration_ms: f64,
    pub duration_p50_ms: f64,
    pub duration_p95_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct LlmMetrics {
    pub requests: u64,
    pub failures: u64,
}

#[derive(Debug, Serialize)]
pub struct ToolMetrics {
    pub tool_stats: HashMap<String, ToolStatsSnapshot>,
    pub total_executions: u64,
    pub total_failures: u64,
}

#[derive(Debug, Serialize)]
pub struct ToolStatsSnapshot {
    pub executions: u64,
    pub failures: u64,
    pub avg_execution_time_ms: f64,
    pub last_execution: u64,
    pub success_rate: f64,
}

fn push_sample(samples: &mut Vec<u64>, duration: Duration) {
    samples.push(duration.as_millis() as u64);
    if samples.len() > MAX_TIMING_SAMPLES {
        samples.remove(0);
    }
}

fn average(values: &[u64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<u64>() as f64 / values.len() as f64
    }
}

/// Nearest-rank percentile over sorted values
fn percentile(sorted_values: &[u64], percentile: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }
    let index = ((percentile / 100.0) * (sorted_values.len() - 1) as f64).round() as usize;
    sorted_values[index.min(sorted_values.len() - 1)] as f64
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
