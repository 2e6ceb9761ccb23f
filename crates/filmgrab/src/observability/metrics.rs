use super::GLOBAL_LABELS;
use crate::config::from_env_or_panic;
use metrics_exporter_prometheus::Matcher;
use serde::Deserialize;
use std::net::SocketAddr;

/// Histogram buckets to measure the distribution of request durations in seconds
pub(crate) const DEFAULT_DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0,
];

/// Duration of a single upstream request
pub(crate) const UPSTREAM_REQUEST_DURATION_SECONDS: &str = "upstream_request_duration_seconds";

/// Number of the image proxy fetch attempts partitioned by their outcome
pub(crate) const PROXY_ATTEMPTS_TOTAL: &str = "proxy_attempts_total";

#[derive(Deserialize)]
struct MetricsConfig {
    /// Prometheus metrics are exposed on this address only if it is set
    metrics_addr: Option<SocketAddr>,
}

pub fn init_metrics() {
    let config: MetricsConfig = from_env_or_panic("");

    let Some(addr) = config.metrics_addr else {
        return;
    };

    let mut builder = metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_owned()),
            DEFAULT_DURATION_BUCKETS,
        )
        .unwrap_or_else(|err| panic!("BUG: invalid histogram buckets: {err:#?}"));

    for (key, value) in GLOBAL_LABELS {
        builder = builder.add_global_label(*key, *value);
    }

    builder
        .install()
        .unwrap_or_else(|err| panic!("BUG: failed to initialize the metrics listener: {err:#?}"));
}
