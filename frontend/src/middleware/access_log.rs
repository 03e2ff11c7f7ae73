//! Access log middleware
//!
//! Emits one line per finished request through the [`CorrelatedLogger`],
//! carrying the trace and span ids of the span active for the request. Place
//! it inside the span layer so those ids belong to the request span.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::{StatusCode, header};
use futures::FutureExt;
use tokio::time::Instant;

use super::client_address;
use super::metrics::route_template;
use super::pipeline::{BoxHandler, Handler, HandlerLayer};
use super::responder::{CapturedStatus, ResponseWriter, StatusCapturingResponder};
use crate::context::RequestContext;
use crate::observability::correlated::CorrelatedLogger;

pub struct AccessLogLayer {
    logger: CorrelatedLogger,
}

impl AccessLogLayer {
    pub fn new(logger: CorrelatedLogger) -> Self {
        Self { logger }
    }
}

impl HandlerLayer for AccessLogLayer {
    fn name(&self) -> &'static str {
        "access_log"
    }

    fn wrap(&self, inner: BoxHandler, _operation: &str) -> BoxHandler {
        Arc::new(AccessLogMiddleware {
            inner,
            logger: self.logger.clone(),
        })
    }
}

pub struct AccessLogMiddleware {
    inner: BoxHandler,
    logger: CorrelatedLogger,
}

#[async_trait]
impl Handler for AccessLogMiddleware {
    async fn handle(&self, request: Request, response: &mut dyn ResponseWriter) {
        let start = Instant::now();
        let context = RequestContext::from_request(&request);
        let method = request.method().to_string();
        let path = route_template(&request);
        let remote_addr = client_address(&request);
        let user_agent = request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let status = CapturedStatus::default();
        let outcome = {
            let mut responder = StatusCapturingResponder::new(response, status.clone());
            AssertUnwindSafe(self.inner.handle(request, &mut responder))
                .catch_unwind()
                .await
        };

        let final_status = match outcome {
            Ok(()) => status.get(),
            Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        self.logger.request(
            &context,
            &method,
            &path,
            final_status,
            start.elapsed(),
            &remote_addr,
            &user_agent,
        );

        if let Err(panic) = outcome {
            std::panic::resume_unwind(panic);
        }
    }
}
