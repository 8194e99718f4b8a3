//! Prometheus counters for upstream traffic and pipeline output

use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, IntCounterVec};

lazy_static! {
    static ref UPSTREAM_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "upstream_requests_total",
        "Upstream HTTP requests issued",
        &["provider", "feed"]
    )
    .unwrap();
    static ref UPSTREAM_FAILURES: IntCounterVec = register_int_counter_vec!(
        "upstream_failures_total",
        "Upstream HTTP requests that failed or returned a non-2xx status",
        &["provider", "feed"]
    )
    .unwrap();
    static ref CHANNELS_EMITTED: IntCounterVec = register_int_counter_vec!(
        "channels_emitted_total",
        "Channels produced by provider listings",
        &["provider"]
    )
    .unwrap();
    static ref CHANNELS_SKIPPED: IntCounterVec = register_int_counter_vec!(
        "channels_skipped_total",
        "Channels dropped while building listings or guides",
        &["provider", "reason"]
    )
    .unwrap();
    static ref AIRINGS_EMITTED: IntCounterVec = register_int_counter_vec!(
        "airings_emitted_total",
        "Airings produced for guides",
        &["provider"]
    )
    .unwrap();
    static ref SESSION_BOOTSTRAPS: IntCounterVec = register_int_counter_vec!(
        "session_bootstrap_total",
        "Session bootstrap attempts against a landing page",
        &["result"]
    )
    .unwrap();
}

pub fn record_request(provider: &str, feed: &str) {
    UPSTREAM_REQUESTS.with_label_values(&[provider, feed]).inc();
}

pub fn record_failure(provider: &str, feed: &str) {
    UPSTREAM_FAILURES.with_label_values(&[provider, feed]).inc();
}

pub fn record_channel(provider: &str) {
    CHANNELS_EMITTED.with_label_values(&[provider]).inc();
}

pub fn record_skip(provider: &str, reason: &str) {
    CHANNELS_SKIPPED.with_label_values(&[provider, reason]).inc();
}

pub fn record_airing(provider: &str) {
    AIRINGS_EMITTED.with_label_values(&[provider]).inc();
}

pub fn record_bootstrap(success: bool) {
    let result = if success { "ok" } else { "failed" };
    SESSION_BOOTSTRAPS.with_label_values(&[result]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_gathered() {
        record_request("test", "catalog");
        record_skip("test", "placeholder");

        let families = prometheus::gather();
        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
        assert!(names.contains(&"upstream_requests_total"));
        assert!(names.contains(&"channels_skipped_total"));
    }
}
