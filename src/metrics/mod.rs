//! Metrics collection for observability

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_vec_with_registry, Counter, CounterVec, HistogramVec, Opts, Registry,
};
use std::sync::Arc;

/// `tool` label for calls naming no registered operation
pub const UNKNOWN_TOOL_LABEL: &str = "unknown";

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| {
    Arc::new(Metrics::new().expect("Failed to initialize metrics"))
});

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Governor metrics
    pub governed_calls: CounterVec,
    pub governed_tokens: HistogramVec,
    pub truncations: CounterVec,
    pub emergency_summaries: CounterVec,

    // Staging cache metrics
    pub cache_lookups: CounterVec,
    pub cache_stores: Counter,
}

impl Metrics {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let governed_calls = register_counter_vec_with_registry!(
            Opts::new("governed_calls_total", "Total governed tool invocations"),
            &["tool", "status"],
            registry
        )?;

        let governed_tokens = register_histogram_vec_with_registry!(
            "governed_response_tokens",
            "Tokens in returned tool payloads",
            &["tool"],
            vec![50.0, 100.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0],
            registry
        )?;

        let truncations = register_counter_vec_with_registry!(
            Opts::new("governor_truncations_total", "Total payloads truncated to fit budget"),
            &["tool"],
            registry
        )?;

        let emergency_summaries = register_counter_vec_with_registry!(
            Opts::new(
                "governor_emergency_summaries_total",
                "Total payloads replaced by an emergency digest"
            ),
            &["tool"],
            registry
        )?;

        let cache_lookups = register_counter_vec_with_registry!(
            Opts::new("staging_cache_lookups_total", "Total staging cache lookups"),
            &["outcome"],
            registry
        )?;

        let cache_stores = register_counter_with_registry!(
            Opts::new("staging_cache_entries_stored_total", "Total values staged"),
            registry
        )?;

        Ok(Self {
            registry,
            governed_calls,
            governed_tokens,
            truncations,
            emergency_summaries,
            cache_lookups,
            cache_stores,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a governed call and the tokens it returned
    pub fn record_governed_call(&self, tool: &str, success: bool, tokens: usize) {
        let status = if success { "success" } else { "error" };
        self.governed_calls.with_label_values(&[tool, status]).inc();
        self.governed_tokens
            .with_label_values(&[tool])
            .observe(tokens as f64);
    }

    pub fn record_truncation(&self, tool: &str) {
        self.truncations.with_label_values(&[tool]).inc();
    }

    pub fn record_emergency_summary(&self, tool: &str) {
        self.emergency_summaries.with_label_values(&[tool]).inc();
    }

    /// Record a cache lookup outcome (`hit`, `miss`, `expired`)
    pub fn record_cache_lookup(&self, outcome: &str) {
        self.cache_lookups.with_label_values(&[outcome]).inc();
    }

    pub fn record_cache_store(&self) {
        self.cache_stores.inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}
