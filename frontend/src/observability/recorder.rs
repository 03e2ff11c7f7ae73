//! Prometheus metrics registry with cardinality controls
//!
//! The registry owns its own Prometheus recorder instead of installing a
//! process-global one. Every metric operation runs through
//! [`MetricsRegistry::with_recorder`], which scopes the `metrics` macros to
//! this registry. Counter, gauge and histogram updates are atomic inside the
//! recorder, so call sites never add their own locking.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

use super::metrics::*;
use crate::config::MetricsConfig;
use crate::error::TelemetryError;

/// Bucket boundaries for request durations, in seconds.
pub const DURATION_BUCKETS: [f64; 11] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Label value substituted once a label has reached its distinct-value limit.
pub const OVERFLOW_LABEL: &str = "other";

/// Caps the number of distinct values each free-form label of each metric can take.
pub struct CardinalityLimiter {
    max_values: usize,
    seen: RwLock<HashMap<(&'static str, &'static str), HashSet<String>>>,
}

impl CardinalityLimiter {
    pub fn new(max_values: usize) -> Self {
        Self {
            max_values,
            seen: RwLock::new(HashMap::new()),
        }
    }

    /// Value to use for `label` of `metric`, or [`OVERFLOW_LABEL`] once the
    /// limit for that pair is reached.
    pub fn admit(&self, metric: &'static str, label: &'static str, value: &str) -> String {
        let key = (metric, label);
        {
            let seen = self.seen.read().unwrap_or_else(|e| e.into_inner());
            if seen.get(&key).is_some_and(|values| values.contains(value)) {
                return value.to_string();
            }
        }

        let mut seen = self.seen.write().unwrap_or_else(|e| e.into_inner());
        let values = seen.entry(key).or_default();
        if values.contains(value) {
            return value.to_string();
        }
        if values.len() < self.max_values {
            values.insert(value.to_string());
            return value.to_string();
        }

        tracing::debug!(metric, label, value, "Label cardinality limit reached");
        OVERFLOW_LABEL.to_string()
    }

    pub fn distinct_values(&self, metric: &'static str, label: &'static str) -> usize {
        let seen = self.seen.read().unwrap_or_else(|e| e.into_inner());
        seen.get(&(metric, label)).map_or(0, HashSet::len)
    }
}

/// Registry holding every metric series of the process.
#[derive(Clone)]
pub struct MetricsRegistry {
    recorder: Arc<PrometheusRecorder>,
    handle: PrometheusHandle,
    limiter: Arc<CardinalityLimiter>,
}

impl MetricsRegistry {
    pub fn new(config: &MetricsConfig) -> Result<Self, TelemetryError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(HTTP_REQUEST_DURATION_SECONDS.to_string()),
                &DURATION_BUCKETS,
            )?
            .build_recorder();
        let handle = recorder.handle();

        let registry = Self {
            recorder: Arc::new(recorder),
            handle,
            limiter: Arc::new(CardinalityLimiter::new(config.max_label_values)),
        };
        registry.with_recorder(describe_catalog);

        tracing::info!(
            max_label_values = %config.max_label_values,
            "Prometheus metrics registry initialized"
        );

        Ok(registry)
    }

    /// Run `f` with this registry as the target of the `metrics` macros.
    pub fn with_recorder<T>(&self, f: impl FnOnce() -> T) -> T {
        metrics::with_local_recorder(self.recorder.as_ref(), f)
    }

    pub fn limiter(&self) -> &CardinalityLimiter {
        &self.limiter
    }

    /// All registered series in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

fn describe_catalog() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests");
    describe_histogram!(HTTP_REQUEST_DURATION_SECONDS, "HTTP request duration in seconds");
    describe_counter!(ORDERS_TOTAL, "Total number of orders");
    describe_counter!(CART_CREATED_TOTAL, "Total number of carts created");
    describe_counter!(CART_ABANDONED_TOTAL, "Total number of carts abandoned");
    describe_counter!(PAYMENT_ATTEMPTED_TOTAL, "Total number of payment attempts");
    describe_counter!(PAYMENT_FAILED_TOTAL, "Total number of failed payments");
    describe_gauge!(DATABASE_CONNECTIONS_TOTAL, "Total number of database connections");
    describe_counter!(
        DATABASE_CONNECTIONS_FAILED_TOTAL,
        "Total number of failed database connections"
    );
    describe_counter!(CACHE_HITS_TOTAL, "Total number of cache hits");
    describe_counter!(CACHE_MISSES_TOTAL, "Total number of cache misses");
    describe_gauge!(
        APPLICATION_HEALTH,
        "Application health status (1 = healthy, 0 = unhealthy)"
    );
}

/// Value of the first sample of `name` whose labels include every pair in `labels`.
///
/// Parses the text exposition format; used by tests and diagnostics.
pub fn sample_value(rendered: &str, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    rendered
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| {
            let (series, value) = line.rsplit_once(' ')?;
            let (metric, rest) = match series.split_once('{') {
                Some((metric, rest)) => (metric, rest.trim_end_matches('}')),
                None => (series, ""),
            };
            (metric == name).then_some((rest, value))
        })
        .find(|(rest, _)| {
            labels
                .iter()
                .all(|(key, value)| rest.contains(&format!("{key}=\"{value}\"")))
        })
        .and_then(|(_, value)| value.parse().ok())
}
