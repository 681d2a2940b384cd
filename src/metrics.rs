//! Prometheus metrics for the streaming proxy
//!
//! Every [`ProxyMetrics`] owns its own registry so several proxies (and
//! tests) can live in one process without colliding on metric names.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Metrics collector for the streaming proxy
#[derive(Clone)]
pub struct ProxyMetrics {
    registry: Registry,

    /// Requests by method (HEAD, GET, ...)
    requests_total: IntCounterVec,

    /// Metadata or ranged fetches that failed
    upstream_errors_total: IntCounter,

    /// Bitrate cache lookups
    bitrate_cache_hits_total: IntCounter,
    bitrate_cache_misses_total: IntCounter,
    bitrate_cache_errors_total: IntCounter,

    /// Probe outcomes: started, success, failure, skipped
    probes_total: IntCounterVec,

    /// Body bytes relayed to clients
    bytes_to_client_total: IntCounter,
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub head_requests: u64,
    pub get_requests: u64,
    pub upstream_errors: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_errors: u64,
    pub probes_started: u64,
    pub probes_succeeded: u64,
    pub probes_failed: u64,
    pub probes_skipped: u64,
    pub bytes_to_client: u64,
}

impl ProxyMetrics {
    /// Create metrics registered in a fresh registry
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Create metrics registered in the given registry
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let requests_total = IntCounterVec::new(
            Opts::new("feedit_requests_total", "Total number of stream requests"),
            &["method"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let upstream_errors_total = IntCounter::new(
            "feedit_upstream_errors_total",
            "Upstream metadata or ranged fetches that failed",
        )?;
        registry.register(Box::new(upstream_errors_total.clone()))?;

        let bitrate_cache_hits_total = IntCounter::new(
            "feedit_bitrate_cache_hits_total",
            "Bitrate cache lookups answered from disk",
        )?;
        registry.register(Box::new(bitrate_cache_hits_total.clone()))?;

        let bitrate_cache_misses_total = IntCounter::new(
            "feedit_bitrate_cache_misses_total",
            "Bitrate cache lookups with no stored entry",
        )?;
        registry.register(Box::new(bitrate_cache_misses_total.clone()))?;

        let bitrate_cache_errors_total = IntCounter::new(
            "feedit_bitrate_cache_errors_total",
            "Bitrate cache directory or file failures",
        )?;
        registry.register(Box::new(bitrate_cache_errors_total.clone()))?;

        let probes_total = IntCounterVec::new(
            Opts::new("feedit_bitrate_probes_total", "Bitrate probe outcomes"),
            &["result"],
        )?;
        registry.register(Box::new(probes_total.clone()))?;

        let bytes_to_client_total = IntCounter::new(
            "feedit_bytes_to_client_total",
            "Body bytes relayed to clients",
        )?;
        registry.register(Box::new(bytes_to_client_total.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            upstream_errors_total,
            bitrate_cache_hits_total,
            bitrate_cache_misses_total,
            bitrate_cache_errors_total,
            probes_total,
            bytes_to_client_total,
        })
    }

    pub fn record_request(&self, method: &str) {
        self.requests_total.with_label_values(&[method]).inc();
    }

    pub fn record_upstream_error(&self) {
        self.upstream_errors_total.inc();
    }

    pub fn record_cache_hit(&self) {
        self.bitrate_cache_hits_total.inc();
    }

    pub fn record_cache_miss(&self) {
        self.bitrate_cache_misses_total.inc();
    }

    pub fn record_cache_error(&self) {
        self.bitrate_cache_errors_total.inc();
    }

    pub fn record_probe_started(&self) {
        self.probes_total.with_label_values(&["started"]).inc();
    }

    /// Record a finished probe
    pub fn record_probe_result(&self, success: bool) {
        let result = if success { "success" } else { "failure" };
        self.probes_total.with_label_values(&[result]).inc();
    }

    /// Record a probe suppressed because one is already in flight for the key
    pub fn record_probe_skipped(&self) {
        self.probes_total.with_label_values(&["skipped"]).inc();
    }

    pub fn record_bytes_to_client(&self, bytes: u64) {
        self.bytes_to_client_total.inc_by(bytes);
    }

    /// Get a snapshot of current metrics
    pub fn get_stats(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            head_requests: self.requests_total.with_label_values(&["HEAD"]).get(),
            get_requests: self.requests_total.with_label_values(&["GET"]).get(),
            upstream_errors: self.upstream_errors_total.get(),
            cache_hits: self.bitrate_cache_hits_total.get(),
            cache_misses: self.bitrate_cache_misses_total.get(),
            cache_errors: self.bitrate_cache_errors_total.get(),
            probes_started: self.probes_total.with_label_values(&["started"]).get(),
            probes_succeeded: self.probes_total.with_label_values(&["success"]).get(),
            probes_failed: self.probes_total.with_label_values(&["failure"]).get(),
            probes_skipped: self.probes_total.with_label_values(&["skipped"]).get(),
            bytes_to_client: self.bytes_to_client_total.get(),
        }
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn gather_text(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl MetricsSnapshot {
    /// Cache hit rate as a percentage (0.0 to 100.0)
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            (self.cache_hits as f64 / total as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_start_at_zero() {
        let metrics = ProxyMetrics::new().unwrap();
        assert_eq!(metrics.get_stats(), MetricsSnapshot::default());
    }

    #[test]
    fn test_record_requests_by_method() {
        let metrics = ProxyMetrics::new().unwrap();
        metrics.record_request("GET");
        metrics.record_request("GET");
        metrics.record_request("HEAD");

        let stats = metrics.get_stats();
        assert_eq!(stats.get_requests, 2);
        assert_eq!(stats.head_requests, 1);
    }

    #[test]
    fn test_probe_outcomes() {
        let metrics = ProxyMetrics::new().unwrap();
        metrics.record_probe_started();
        metrics.record_probe_result(true);
        metrics.record_probe_started();
        metrics.record_probe_result(false);
        metrics.record_probe_skipped();

        let stats = metrics.get_stats();
        assert_eq!(stats.probes_started, 2);
        assert_eq!(stats.probes_succeeded, 1);
        assert_eq!(stats.probes_failed, 1);
        assert_eq!(stats.probes_skipped, 1);
    }

    #[test]
    fn test_cache_hit_rate() {
        let metrics = ProxyMetrics::new().unwrap();
        assert_eq!(metrics.get_stats().cache_hit_rate(), 0.0);

        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        assert_eq!(metrics.get_stats().cache_hit_rate(), 75.0);
    }

    #[test]
    fn test_gather_text() {
        let metrics = ProxyMetrics::new().unwrap();
        metrics.record_bytes_to_client(512);
        metrics.record_upstream_error();

        let text = metrics.gather_text().unwrap();
        assert!(text.contains("feedit_bytes_to_client_total 512"));
        assert!(text.contains("feedit_upstream_errors_total 1"));
    }

    #[test]
    fn test_independent_registries() {
        let a = ProxyMetrics::new().unwrap();
        let b = ProxyMetrics::new().unwrap();
        a.record_cache_hit();
        assert_eq!(a.get_stats().cache_hits, 1);
        assert_eq!(b.get_stats().cache_hits, 0);
    }
}
