//! Observability infrastructure for the diagnosis engine
//!
//! Provides:
//! - Prometheus metrics (diagnoses, cache hits/misses, method failures, analysis latency)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for analysis latency (in seconds); AI calls dominate the tail
const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SleuthMetricsInner> = OnceLock::new();

struct SleuthMetricsInner {
    diagnoses_total: IntCounter,
    cache_hits_total: IntCounter,
    cache_misses_total: IntCounter,
    method_failures_total: IntCounterVec,
    analysis_latency_seconds: Histogram,
    cache_entries: IntGauge,
    units_not_ready: IntGauge,
}

impl SleuthMetricsInner {
    fn new() -> Self {
        Self {
            diagnoses_total: register_int_counter!(
                "pod_sleuth_diagnoses_total",
                "Total number of diagnoses produced by log analysis"
            )
            .expect("Failed to register diagnoses_total"),

            cache_hits_total: register_int_counter!(
                "pod_sleuth_cache_hits_total",
                "Total number of diagnoses served from the cache"
            )
            .expect("Failed to register cache_hits_total"),

            cache_misses_total: register_int_counter!(
                "pod_sleuth_cache_misses_total",
                "Total number of cache lookups that fell through to analysis"
            )
            .expect("Failed to register cache_misses_total"),

            method_failures_total: register_int_counter_vec!(
                "pod_sleuth_method_failures_total",
                "Total number of failed analysis method runs",
                &["method"]
            )
            .expect("Failed to register method_failures_total"),

            analysis_latency_seconds: register_histogram!(
                "pod_sleuth_analysis_latency_seconds",
                "Time spent fetching and analyzing logs for one unit",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register analysis_latency_seconds"),

            cache_entries: register_int_gauge!(
                "pod_sleuth_cache_entries",
                "Number of diagnoses currently cached"
            )
            .expect("Failed to register cache_entries"),

            units_not_ready: register_int_gauge!(
                "pod_sleuth_units_not_ready",
                "Number of not-ready units seen in the last scan"
            )
            .expect("Failed to register units_not_ready"),
        }
    }
}

/// Handle to the global diagnosis metrics.
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct SleuthMetrics {
    _private: (),
}

impl Default for SleuthMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SleuthMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SleuthMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SleuthMetricsInner {
        GLOBAL_METRICS.get_or_init(SleuthMetricsInner::new)
    }

    pub fn inc_diagnoses(&self) {
        self.inner().diagnoses_total.inc();
    }

    pub fn inc_cache_hits(&self) {
        self.inner().cache_hits_total.inc();
    }

    pub fn inc_cache_misses(&self) {
        self.inner().cache_misses_total.inc();
    }

    pub fn inc_method_failures(&self, method: &str) {
        self.inner()
            .method_failures_total
            .with_label_values(&[method])
            .inc();
    }

    pub fn observe_analysis_latency(&self, duration_secs: f64) {
        self.inner().analysis_latency_seconds.observe(duration_secs);
    }

    pub fn set_cache_entries(&self, count: usize) {
        self.inner().cache_entries.set(count as i64);
    }

    pub fn set_units_not_ready(&self, count: usize) {
        self.inner().units_not_ready.set(count as i64);
    }
}

/// Structured logger for agent events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, methods: &[String]) {
        info!(
            event = "agent_started",
            instance = %self.instance,
            agent_version = %version,
            methods = %methods.join(","),
            "Pod sleuth agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Pod sleuth agent shutting down"
        );
    }

    /// Log a freshly produced diagnosis
    pub fn log_diagnosis(
        &self,
        namespace: &str,
        pod_name: &str,
        method: &str,
        confidence: u8,
        root_cause: &str,
    ) {
        info!(
            event = "diagnosis_produced",
            instance = %self.instance,
            namespace = %namespace,
            pod_name = %pod_name,
            method = %method,
            confidence = confidence,
            root_cause = %root_cause,
            "Log analysis produced a diagnosis"
        );
    }

    pub fn log_cache_hit(&self, namespace: &str, pod_name: &str, cache_key: &str) {
        info!(
            event = "cache_hit",
            instance = %self.instance,
            namespace = %namespace,
            pod_name = %pod_name,
            cache_key = %cache_key,
            "Using cached analysis result"
        );
    }

    pub fn log_method_failure(&self, namespace: &str, pod_name: &str, method: &str, error: &str) {
        warn!(
            event = "method_failed",
            instance = %self.instance,
            namespace = %namespace,
            pod_name = %pod_name,
            method = %method,
            error = %error,
            "Analysis method failed"
        );
    }

    /// Log the outcome of one scan pass
    pub fn log_scan_summary(&self, total: usize, not_ready: usize, diagnosed: usize, swept: usize) {
        if not_ready > 0 {
            warn!(
                event = "scan_completed",
                instance = %self.instance,
                total = total,
                not_ready = not_ready,
                diagnosed = diagnosed,
                swept = swept,
                "Scan found unhealthy pods"
            );
        } else {
            info!(
                event = "scan_completed",
                instance = %self.instance,
                total = total,
                not_ready = not_ready,
                diagnosed = diagnosed,
                swept = swept,
                "All pods healthy"
            );
        }
    }
}
