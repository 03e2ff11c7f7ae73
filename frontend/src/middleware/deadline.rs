//! Per-request deadline
//!
//! Stamps a deadline into the request's [`RequestContext`] and drops the
//! inner handler once it passes. Anything below this layer that honours the
//! context deadline (outbound calls in particular) is bounded by it as well.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::StatusCode;
use tokio::time::Instant;
use tracing::warn;

use super::pipeline::{BoxHandler, Handler, HandlerLayer};
use super::responder::{CapturedStatus, ResponseWriter, StatusCapturingResponder};
use crate::context::RequestContext;

pub struct DeadlineLayer {
    timeout: Duration,
}

impl DeadlineLayer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl HandlerLayer for DeadlineLayer {
    fn name(&self) -> &'static str {
        "deadline"
    }

    fn wrap(&self, inner: BoxHandler, operation: &str) -> BoxHandler {
        Arc::new(DeadlineMiddleware {
            inner,
            operation: operation.to_string(),
            timeout: self.timeout,
        })
    }
}

pub struct DeadlineMiddleware {
    inner: BoxHandler,
    operation: String,
    timeout: Duration,
}

#[async_trait]
impl Handler for DeadlineMiddleware {
    async fn handle(&self, mut request: Request, response: &mut dyn ResponseWriter) {
        let requested = Instant::now() + self.timeout;
        let context = RequestContext::from_request(&request).with_deadline(requested);
        let deadline = context.deadline().unwrap_or(requested);
        context.attach(&mut request);

        let status = CapturedStatus::default();
        let mut responder = StatusCapturingResponder::new(response, status.clone());
        let finished = tokio::time::timeout_at(deadline, self.inner.handle(request, &mut responder))
            .await
            .is_ok();

        if !finished {
            warn!(
                operation = %self.operation,
                timeout_ms = %self.timeout.as_millis(),
                "Request deadline exceeded"
            );
            if !status.is_set() {
                responder.write_status(StatusCode::GATEWAY_TIMEOUT);
                responder.write_body(b"request timed out");
            }
        }
    }
}
