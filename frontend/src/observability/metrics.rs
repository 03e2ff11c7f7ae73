//! Metric catalog and recording operations
//!
//! Every series of the service is named here. HTTP request metrics are
//! recorded by the metrics middleware; the business catalog is exposed through
//! [`BusinessMetrics`] for handlers and backends to update on demand.
//!
//! # Cardinality Control
//!
//! - `path` is always a route template or [`UNMATCHED_PATH`]
//! - `method` is folded to the standard verbs or `OTHER`
//! - Free-form business labels pass through the registry's
//!   [`CardinalityLimiter`](super::recorder::CardinalityLimiter)

use std::time::Duration;

use axum::http::{Method, StatusCode};
use metrics::{counter, gauge, histogram};

use super::recorder::MetricsRegistry;

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const ORDERS_TOTAL: &str = "orders_total";
pub const CART_CREATED_TOTAL: &str = "cart_created_total";
pub const CART_ABANDONED_TOTAL: &str = "cart_abandoned_total";
pub const PAYMENT_ATTEMPTED_TOTAL: &str = "payment_attempted_total";
pub const PAYMENT_FAILED_TOTAL: &str = "payment_failed_total";
pub const DATABASE_CONNECTIONS_TOTAL: &str = "database_connections_total";
pub const DATABASE_CONNECTIONS_FAILED_TOTAL: &str = "database_connections_failed_total";
pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
pub const APPLICATION_HEALTH: &str = "application_health";

/// Path label for requests that matched no route.
pub const UNMATCHED_PATH: &str = "unmatched";

/// Method label; anything outside the standard verbs becomes `OTHER`.
pub fn normalize_method(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::PUT => "PUT",
        Method::DELETE => "DELETE",
        Method::PATCH => "PATCH",
        Method::HEAD => "HEAD",
        Method::OPTIONS => "OPTIONS",
        Method::CONNECT => "CONNECT",
        Method::TRACE => "TRACE",
        _ => "OTHER",
    }
}

/// Count one finished request and observe its duration.
///
/// The duration histogram carries no status label.
pub fn record_http_request(
    registry: &MetricsRegistry,
    service: &str,
    method: &'static str,
    path: &str,
    status: StatusCode,
    duration: Duration,
) {
    registry.with_recorder(|| {
        counter!(
            HTTP_REQUESTS_TOTAL,
            "method" => method,
            "path" => path.to_string(),
            "status" => status.as_u16().to_string(),
            "service" => service.to_string()
        )
        .increment(1);

        histogram!(
            HTTP_REQUEST_DURATION_SECONDS,
            "method" => method,
            "path" => path.to_string(),
            "service" => service.to_string()
        )
        .record(duration.as_secs_f64());
    });

    tracing::trace!(
        method = %method,
        path = %path,
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        "HTTP request metrics recorded"
    );
}

/// Business counters and gauges, each update a single atomic operation on one series.
#[derive(Clone)]
pub struct BusinessMetrics {
    registry: MetricsRegistry,
    service: String,
}

impl BusinessMetrics {
    pub fn new(registry: MetricsRegistry, service: impl Into<String>) -> Self {
        Self {
            registry,
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn bounded(&self, metric: &'static str, label: &'static str, value: &str) -> String {
        self.registry.limiter().admit(metric, label, value)
    }

    pub fn record_order(&self, status: &str) {
        let status = self.bounded(ORDERS_TOTAL, "status", status);
        self.registry.with_recorder(|| {
            counter!(ORDERS_TOTAL, "status" => status, "service" => self.service.clone())
                .increment(1)
        });
    }

    pub fn record_cart_created(&self) {
        self.registry.with_recorder(|| {
            counter!(CART_CREATED_TOTAL, "service" => self.service.clone()).increment(1)
        });
    }

    pub fn record_cart_abandoned(&self) {
        self.registry.with_recorder(|| {
            counter!(CART_ABANDONED_TOTAL, "service" => self.service.clone()).increment(1)
        });
    }

    pub fn record_payment_attempt(&self) {
        self.registry.with_recorder(|| {
            counter!(PAYMENT_ATTEMPTED_TOTAL, "service" => self.service.clone()).increment(1)
        });
    }

    pub fn record_payment_failure(&self, reason: &str) {
        let reason = self.bounded(PAYMENT_FAILED_TOTAL, "reason", reason);
        self.registry.with_recorder(|| {
            counter!(PAYMENT_FAILED_TOTAL, "service" => self.service.clone(), "reason" => reason)
                .increment(1)
        });
    }

    /// One more open connection in `status`.
    pub fn record_database_connection(&self, status: &str) {
        let status = self.bounded(DATABASE_CONNECTIONS_TOTAL, "status", status);
        self.registry.with_recorder(|| {
            gauge!(DATABASE_CONNECTIONS_TOTAL, "service" => self.service.clone(), "status" => status)
                .increment(1.0)
        });
    }

    /// Overwrite the number of connections in `status`.
    pub fn set_database_connections(&self, status: &str, count: u64) {
        let status = self.bounded(DATABASE_CONNECTIONS_TOTAL, "status", status);
        self.registry.with_recorder(|| {
            gauge!(DATABASE_CONNECTIONS_TOTAL, "service" => self.service.clone(), "status" => status)
                .set(count as f64)
        });
    }

    pub fn record_database_connection_failure(&self, error: &str) {
        let error = self.bounded(DATABASE_CONNECTIONS_FAILED_TOTAL, "error", error);
        self.registry.with_recorder(|| {
            counter!(
                DATABASE_CONNECTIONS_FAILED_TOTAL,
                "service" => self.service.clone(),
                "error" => error
            )
            .increment(1)
        });
    }

    pub fn record_cache_hit(&self, cache_type: &str) {
        let cache_type = self.bounded(CACHE_HITS_TOTAL, "cache_type", cache_type);
        self.registry.with_recorder(|| {
            counter!(CACHE_HITS_TOTAL, "service" => self.service.clone(), "cache_type" => cache_type)
                .increment(1)
        });
    }

    pub fn record_cache_miss(&self, cache_type: &str) {
        let cache_type = self.bounded(CACHE_MISSES_TOTAL, "cache_type", cache_type);
        self.registry.with_recorder(|| {
            counter!(CACHE_MISSES_TOTAL, "service" => self.service.clone(), "cache_type" => cache_type)
                .increment(1)
        });
    }

    /// Last write wins: 1 for healthy, 0 otherwise.
    pub fn set_application_health(&self, component: &str, healthy: bool) {
        let component = self.bounded(APPLICATION_HEALTH, "component", component);
        self.registry.with_recorder(|| {
            gauge!(APPLICATION_HEALTH, "service" => self.service.clone(), "component" => component)
                .set(if healthy { 1.0 } else { 0.0 })
        });
    }
}
