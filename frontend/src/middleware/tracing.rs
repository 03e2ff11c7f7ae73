//! Span middleware for inbound requests
//!
//! Opens one server span per request, named after the wrapped operation. The
//! parent is the span already carried by the request's [`RequestContext`],
//! else the W3C `traceparent` headers, else none (a root span). The span is
//! ended on every exit path: normal return, handler panic (re-raised after the
//! span is closed) and cancellation of the request future.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{MatchedPath, Request};
use axum::http::{StatusCode, header};
use futures::FutureExt;
use opentelemetry::KeyValue;
use opentelemetry::trace::SpanKind;

use super::pipeline::{BoxHandler, Handler, HandlerLayer};
use super::responder::{CapturedStatus, ResponseWriter, StatusCapturingResponder};
use super::{HandlerPanicked, HttpStatusError, client_address};
use crate::context::RequestContext;
use crate::observability::propagation::extract_context;
use crate::observability::tracing::{SpanGuard, TracerHandle};

pub struct SpanLayer {
    tracer: TracerHandle,
}

impl SpanLayer {
    pub fn new(tracer: TracerHandle) -> Self {
        Self { tracer }
    }
}

impl HandlerLayer for SpanLayer {
    fn name(&self) -> &'static str {
        "span"
    }

    fn wrap(&self, inner: BoxHandler, operation: &str) -> BoxHandler {
        Arc::new(SpanMiddleware {
            inner,
            operation: operation.to_string(),
            tracer: self.tracer.clone(),
        })
    }
}

pub struct SpanMiddleware {
    inner: BoxHandler,
    operation: String,
    tracer: TracerHandle,
}

fn request_attributes(request: &Request) -> Vec<KeyValue> {
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let mut attributes = vec![
        KeyValue::new("http.method", request.method().to_string()),
        KeyValue::new("http.url", request.uri().to_string()),
        KeyValue::new("http.user_agent", user_agent),
        KeyValue::new("http.remote_addr", client_address(request)),
    ];
    if let Some(route) = request.extensions().get::<MatchedPath>() {
        attributes.push(KeyValue::new("http.route", route.as_str().to_string()));
    }
    attributes
}

#[async_trait]
impl Handler for SpanMiddleware {
    async fn handle(&self, mut request: Request, response: &mut dyn ResponseWriter) {
        let context = RequestContext::from_request(&request);
        let parent = if context.has_active_span() {
            context.otel().clone()
        } else {
            extract_context(request.headers())
        };

        let span_cx = self.tracer.start(
            self.operation.clone(),
            SpanKind::Server,
            request_attributes(&request),
            &parent,
        );
        let guard = SpanGuard::new(span_cx.clone());
        context.with_otel(span_cx).attach(&mut request);

        let status = CapturedStatus::default();
        let outcome = {
            let mut responder = StatusCapturingResponder::new(response, status.clone());
            AssertUnwindSafe(self.inner.handle(request, &mut responder))
                .catch_unwind()
                .await
        };

        match outcome {
            Ok(()) => {
                let status = status.get();
                guard.set_attribute(KeyValue::new("http.status_code", i64::from(status.as_u16())));
                if status.as_u16() >= 400 {
                    guard.fail(&HttpStatusError(status), status.to_string());
                }
                guard.end();
            }
            Err(panic) => {
                guard.set_attribute(KeyValue::new(
                    "http.status_code",
                    i64::from(StatusCode::INTERNAL_SERVER_ERROR.as_u16()),
                ));
                guard.fail(&HandlerPanicked, "handler panicked");
                guard.end();
                std::panic::resume_unwind(panic);
            }
        }
    }
}
