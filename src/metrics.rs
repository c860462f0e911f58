use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Thread-safe collector registry fed by the ingest worker on every message
/// and read by the (external) Prometheus scrape handler. `prometheus`'s
/// collectors are internally synchronized, so no additional locking is
/// needed here for that reader/writer split.
pub struct MetricsRegistry {
    registry: Registry,
    pub request_latency_ms: HistogramVec,
    pub requests_total: IntCounterVec,
    pub errors_total: IntCounterVec,
    pub active_services: IntGauge,
    pub decode_errors_total: IntCounter,
    pub windows_truncated_total: IntCounterVec,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let registry = Registry::new();

        let request_latency_ms = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "workload_request_latency_ms",
                "Per-request latency in milliseconds",
            )
            .buckets(vec![
                10.0, 25.0, 50.0, 100.0, 200.0, 300.0, 500.0, 750.0, 1000.0, 2500.0, 5000.0,
            ]),
            &["service", "endpoint", "region"],
        )
        .expect("failed to build workload_request_latency_ms histogram");

        let requests_total = IntCounterVec::new(
            Opts::new("workload_requests_total", "Total requests observed"),
            &["service", "endpoint", "region", "status_code"],
        )
        .expect("failed to build workload_requests_total counter");

        let errors_total = IntCounterVec::new(
            Opts::new("workload_errors_total", "Total error responses observed"),
            &["service", "endpoint", "region"],
        )
        .expect("failed to build workload_errors_total counter");

        let active_services = IntGauge::new(
            "workload_active_services",
            "Number of distinct services seen",
        )
        .expect("failed to build workload_active_services gauge");

        let decode_errors_total = IntCounter::new(
            "decode_errors_total",
            "Number of inbound messages that failed to decode",
        )
        .expect("failed to build decode_errors_total counter");

        let windows_truncated_total = IntCounterVec::new(
            Opts::new(
                "windows_truncated_total",
                "Number of samples evicted by the hard sample cap before aging out",
            ),
            &["service"],
        )
        .expect("failed to build windows_truncated_total counter");

        registry
            .register(Box::new(request_latency_ms.clone()))
            .expect("failed to register workload_request_latency_ms");
        registry
            .register(Box::new(requests_total.clone()))
            .expect("failed to register workload_requests_total");
        registry
            .register(Box::new(errors_total.clone()))
            .expect("failed to register workload_errors_total");
        registry
            .register(Box::new(active_services.clone()))
            .expect("failed to register workload_active_services");
        registry
            .register(Box::new(decode_errors_total.clone()))
            .expect("failed to register decode_errors_total");
        registry
            .register(Box::new(windows_truncated_total.clone()))
            .expect("failed to register windows_truncated_total");

        Self {
            registry,
            request_latency_ms,
            requests_total,
            errors_total,
            active_services,
            decode_errors_total,
            windows_truncated_total,
        }
    }

    /// Renders the registry in Prometheus text exposition format. An
    /// external HTTP handler calls this; this crate does not serve it.
    pub fn encode(&self) -> String {
        let metric_families = self.registry.gather();
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder
            .encode(&metric_families, &mut buf)
            .expect("failed to encode metrics");
        String::from_utf8(buf).expect("prometheus text encoding is always valid utf-8")
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
