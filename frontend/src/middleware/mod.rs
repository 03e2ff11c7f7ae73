//! Telemetry middleware pipeline
//!
//! The layers compose around any [`Handler`] through a [`Pipeline`]. The
//! default order, outermost first, is metrics, span, access log and the
//! optional deadline; see [`crate::observability::Telemetry::pipeline`].

pub mod access_log;
pub mod deadline;
pub mod metrics;
pub mod pipeline;
pub mod responder;
pub mod tracing;

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request};
use axum::http::{HeaderMap, StatusCode};
use thiserror::Error;

pub use access_log::AccessLogLayer;
pub use deadline::DeadlineLayer;
pub use self::metrics::MetricsLayer;
pub use pipeline::{BoxHandler, FnHandler, Handler, HandlerLayer, Pipeline, PipelineBuilder, endpoint, handler_fn};
pub use responder::{BufferedResponse, CapturedStatus, ResponseWriter, StatusCapturingResponder};
pub use self::tracing::SpanLayer;

/// Recorded on a request span when the handler answered with an error status.
#[derive(Error, Debug)]
#[error("HTTP {0}")]
pub struct HttpStatusError(pub StatusCode);

#[derive(Error, Debug)]
#[error("handler panicked")]
pub struct HandlerPanicked;

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    // X-Forwarded-For first, taking the client end of the chain
    if let Some(first_ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return Some(first_ip.to_string());
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|ip| ip.trim().to_string())
}

/// Client address: proxy headers, then the peer address, then `unknown`.
pub fn client_address(request: &Request) -> String {
    if let Some(ip) = forwarded_ip(request.headers()) {
        return ip;
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with(headers: &[(&str, &str)]) -> Request {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_client_address_from_forwarded_for() {
        let request = request_with(&[("x-forwarded-for", "203.0.113.195, 70.41.3.18, 150.172.238.178")]);
        assert_eq!(client_address(&request), "203.0.113.195");
    }

    #[test]
    fn test_client_address_from_real_ip() {
        let request = request_with(&[("x-real-ip", "198.51.100.7")]);
        assert_eq!(client_address(&request), "198.51.100.7");
    }

    #[test]
    fn test_client_address_from_connection() {
        let mut request = request_with(&[]);
        request
            .extensions_mut()
            .insert(ConnectInfo("192.0.2.10:4000".parse::<SocketAddr>().unwrap()));
        assert_eq!(client_address(&request), "192.0.2.10");
    }

    #[test]
    fn test_client_address_unknown() {
        assert_eq!(client_address(&request_with(&[])), "unknown");
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(HttpStatusError(StatusCode::BAD_GATEWAY).to_string(), "HTTP 502 Bad Gateway");
        assert_eq!(HandlerPanicked.to_string(), "handler panicked");
    }
}
