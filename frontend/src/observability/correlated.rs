//! Logging correlated with the active trace
//!
//! [`CorrelatedLogger`] is the only component that touches both log output
//! and span state: logging an error through it also marks the span active in
//! the supplied context as errored.

use std::error::Error;
use std::fmt::{Display, Write as _};
use std::time::Duration;

use axum::http::StatusCode;
use opentelemetry::trace::{Status, TraceContextExt};

use crate::context::RequestContext;
use crate::deployment::DeploymentDetails;

#[derive(Clone, Debug)]
pub struct CorrelatedLogger {
    deployment: DeploymentDetails,
}

impl CorrelatedLogger {
    pub fn new(deployment: DeploymentDetails) -> Self {
        Self { deployment }
    }

    /// Log an error and mark the span in `cx` as errored with `message`.
    ///
    /// `fields` are rendered into the message as `key=value` pairs, in order.
    pub fn error(
        &self,
        cx: &RequestContext,
        error: Option<&(dyn Error + 'static)>,
        message: &str,
        fields: &[(&str, &dyn Display)],
    ) {
        let rendered = render_message(message, error, fields);
        let deployment = self.deployment.current();

        tracing::error!(
            trace_id = %cx.trace_id().unwrap_or_default(),
            span_id = %cx.span_id().unwrap_or_default(),
            hostname = deployment.hostname.as_deref().unwrap_or_default(),
            cluster = deployment.cluster_name.as_deref().unwrap_or_default(),
            zone = deployment.zone.as_deref().unwrap_or_default(),
            "{rendered}"
        );

        let span = cx.otel().span();
        if let Some(error) = error {
            span.record_error(error);
        }
        span.set_status(Status::error(message.to_string()));
    }

    /// One access-log line for a finished request.
    #[allow(clippy::too_many_arguments)]
    pub fn request(
        &self,
        cx: &RequestContext,
        method: &str,
        path: &str,
        status: StatusCode,
        duration: Duration,
        remote_addr: &str,
        user_agent: &str,
    ) {
        let deployment = self.deployment.current();

        tracing::info!(
            method,
            path,
            status = status.as_u16(),
            duration_ms = duration.as_secs_f64() * 1000.0,
            remote_addr,
            user_agent,
            trace_id = %cx.trace_id().unwrap_or_default(),
            span_id = %cx.span_id().unwrap_or_default(),
            hostname = deployment.hostname.as_deref().unwrap_or_default(),
            "HTTP request"
        );
    }
}

/// `message[: error][ key=value]...`
pub fn render_message(
    message: &str,
    error: Option<&(dyn Error + 'static)>,
    fields: &[(&str, &dyn Display)],
) -> String {
    let mut rendered = message.to_string();
    if let Some(error) = error {
        let _ = write!(rendered, ": {error}");
    }
    for (key, value) in fields {
        let _ = write!(rendered, " {key}={value}");
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::{DeploymentDetails, DeploymentSnapshot, channel};
    use crate::observability::tracing::testing::*;
    use crate::observability::tracing::SpanGuard;
    use opentelemetry::Context;
    use opentelemetry::trace::SpanKind;
    use tracing_test::traced_test;

    #[derive(Debug)]
    struct Declined;

    impl Display for Declined {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("card declined")
        }
    }

    impl Error for Declined {}

    #[test]
    fn test_render_message() {
        let order_id = 42;
        assert_eq!(render_message("checkout failed", None, &[]), "checkout failed");
        assert_eq!(
            render_message("checkout failed", Some(&Declined), &[("order_id", &order_id), ("currency", &"EUR")]),
            "checkout failed: card declined order_id=42 currency=EUR"
        );
    }

    #[test]
    #[traced_test]
    fn test_error_marks_active_span() {
        let (tracer, exporter) = in_memory_tracer();
        let guard = SpanGuard::new(tracer.start("checkout", SpanKind::Server, vec![], &Context::new()));
        let cx = RequestContext::new().with_otel(guard.context().clone());
        let trace_id = cx.trace_id().unwrap();

        let logger = CorrelatedLogger::new(DeploymentDetails::fixed(DeploymentSnapshot {
            hostname: Some("frontend-7d9f".to_string()),
            ..DeploymentSnapshot::default()
        }));
        logger.error(&cx, Some(&Declined), "payment failed", &[("amount", &"12.50")]);
        guard.end();

        assert!(logs_contain("payment failed: card declined amount=12.50"));
        assert!(logs_contain(&trace_id));
        assert!(logs_contain("frontend-7d9f"));

        let spans = finished_spans(&tracer, &exporter);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].status, Status::error("payment failed"));
        assert!(spans[0].events.iter().any(|event| event.name == "exception"));
    }

    #[test]
    #[traced_test]
    fn test_error_without_span_only_logs() {
        let (_publisher, deployment) = channel();
        let logger = CorrelatedLogger::new(deployment);

        logger.error(&RequestContext::new(), None, "cache unavailable", &[]);

        assert!(logs_contain("cache unavailable"));
    }

    #[test]
    #[traced_test]
    fn test_request_line() {
        let (_publisher, deployment) = channel();
        let logger = CorrelatedLogger::new(deployment);

        logger.request(
            &RequestContext::new(),
            "GET",
            "/cart/{id}",
            StatusCode::NOT_FOUND,
            Duration::from_millis(3),
            "10.0.0.7",
            "k6/0.49",
        );

        assert!(logs_contain("HTTP request"));
        assert!(logs_contain("status=404"));
        assert!(logs_contain("remote_addr=\"10.0.0.7\""));
    }
}
