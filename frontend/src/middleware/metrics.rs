//! Request metrics middleware
//!
//! Counts every request in `http_requests_total{method,path,status,service}`
//! and observes its wall-clock duration in
//! `http_request_duration_seconds{method,path,service}`. The `path` label is
//! the matched route template, never the raw request path. Independent of
//! tracing state, so it composes on either side of the span layer.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{MatchedPath, Request};
use axum::http::StatusCode;
use futures::FutureExt;
use tokio::time::Instant;

use super::pipeline::{BoxHandler, Handler, HandlerLayer};
use super::responder::{CapturedStatus, ResponseWriter, StatusCapturingResponder};
use crate::observability::metrics::{UNMATCHED_PATH, normalize_method, record_http_request};
use crate::observability::recorder::MetricsRegistry;

/// Status recorded for requests whose future was dropped before the handler returned.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

pub struct MetricsLayer {
    registry: MetricsRegistry,
    service: String,
}

impl MetricsLayer {
    pub fn new(registry: MetricsRegistry, service: impl Into<String>) -> Self {
        Self {
            registry,
            service: service.into(),
        }
    }
}

impl HandlerLayer for MetricsLayer {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn wrap(&self, inner: BoxHandler, _operation: &str) -> BoxHandler {
        Arc::new(MetricsMiddleware {
            inner,
            registry: self.registry.clone(),
            service: self.service.clone(),
        })
    }
}

pub struct MetricsMiddleware {
    inner: BoxHandler,
    registry: MetricsRegistry,
    service: String,
}

/// Route template of the request, or [`UNMATCHED_PATH`].
pub fn route_template(request: &Request) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_PATH.to_string())
}

/// One request's observation; recorded exactly once, as cancelled if dropped unrecorded.
struct Observation<'a> {
    registry: &'a MetricsRegistry,
    service: &'a str,
    method: &'static str,
    path: String,
    start: Instant,
    recorded: bool,
}

impl Observation<'_> {
    fn record(&mut self, status: StatusCode) {
        self.recorded = true;
        record_http_request(
            self.registry,
            self.service,
            self.method,
            &self.path,
            status,
            self.start.elapsed(),
        );
    }
}

impl Drop for Observation<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            let status = StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::REQUEST_TIMEOUT);
            self.record(status);
        }
    }
}

#[async_trait]
impl Handler for MetricsMiddleware {
    async fn handle(&self, request: Request, response: &mut dyn ResponseWriter) {
        let mut observation = Observation {
            registry: &self.registry,
            service: &self.service,
            method: normalize_method(request.method()),
            path: route_template(&request),
            start: Instant::now(),
            recorded: false,
        };

        let status = CapturedStatus::default();
        let outcome = {
            let mut responder = StatusCapturingResponder::new(response, status.clone());
            AssertUnwindSafe(self.inner.handle(request, &mut responder))
                .catch_unwind()
                .await
        };

        match outcome {
            Ok(()) => observation.record(status.get()),
            Err(panic) => {
                observation.record(StatusCode::INTERNAL_SERVER_ERROR);
                std::panic::resume_unwind(panic);
            }
        }
    }
}
