//! Metrics and observability utilities
//!
//! Provides metric descriptions and recording helpers for the fetch path
//! and the traversal engine, with standardized naming conventions.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

/// Metrics prefix for all CiteGraph metrics
pub const METRICS_PREFIX: &str = "citegraph";

/// Buckets for provider request latency (in seconds)
pub const FETCH_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Provider metrics
    describe_counter!(
        format!("{}_provider_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total metadata provider requests by outcome"
    );

    describe_histogram!(
        format!("{}_fetch_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Provider request latency in seconds"
    );

    describe_counter!(
        format!("{}_fetch_retries_total", METRICS_PREFIX),
        Unit::Count,
        "Total provider retries after a retryable failure"
    );

    // Cache metrics
    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total fetch cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total fetch cache misses"
    );

    // Traversal metrics
    describe_counter!(
        format!("{}_frontier_entries_total", METRICS_PREFIX),
        Unit::Count,
        "Frontier entries by terminal state"
    );

    describe_gauge!(
        format!("{}_graph_nodes", METRICS_PREFIX),
        Unit::Count,
        "Nodes committed to the citation graph"
    );

    describe_gauge!(
        format!("{}_graph_edges", METRICS_PREFIX),
        Unit::Count,
        "Edges committed to the citation graph"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record one provider request
pub fn record_provider_request(duration_secs: f64, provider: &str, outcome: &str) {
    counter!(
        format!("{}_provider_requests_total", METRICS_PREFIX),
        "provider" => provider.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_fetch_duration_seconds", METRICS_PREFIX),
        "provider" => provider.to_string()
    )
    .record(duration_secs);
}

/// Helper to record a retry
pub fn record_retry(provider: &str, reason: &str) {
    counter!(
        format!("{}_fetch_retries_total", METRICS_PREFIX),
        "provider" => provider.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Helper to record cache metrics
pub fn record_cache(hit: bool, cache_name: &str) {
    if hit {
        counter!(
            format!("{}_cache_hits_total", METRICS_PREFIX),
            "cache" => cache_name.to_string()
        )
        .increment(1);
    } else {
        counter!(
            format!("{}_cache_misses_total", METRICS_PREFIX),
            "cache" => cache_name.to_string()
        )
        .increment(1);
    }
}

/// Helper to record a frontier entry reaching a terminal state
pub fn record_entry(state: &str) {
    counter!(
        format!("{}_frontier_entries_total", METRICS_PREFIX),
        "state" => state.to_string()
    )
    .increment(1);
}

/// Helper to publish graph size
pub fn record_graph_size(nodes: usize, edges: usize) {
    gauge!(format!("{}_graph_nodes", METRICS_PREFIX)).set(nodes as f64);
    gauge!(format!("{}_graph_edges", METRICS_PREFIX)).set(edges as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in FETCH_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: calls are no-ops and must not panic
        register_metrics();
        record_provider_request(0.01, "static", "ok");
        record_retry("static", "transient");
        record_cache(true, "fetch");
        record_entry("resolved");
        record_graph_size(3, 2);
    }
}
