//! Traced outbound HTTP
//!
//! [`TracingTransport`] wraps any [`Transport`] and opens one `http.request`
//! client span per call, as a child of the span in the caller's
//! [`RequestContext`]. The W3C trace context is injected into the outgoing
//! headers. Transport failures are recorded on the span and returned to the
//! caller untouched; nothing here retries. The span is ended before the
//! result is handed back.

use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use opentelemetry::trace::SpanKind;
use thiserror::Error;

use crate::config::OutboundConfig;
use crate::context::RequestContext;
use crate::observability::propagation::inject_context;
use crate::observability::tracing::{SpanGuard, TracerHandle};

#[derive(Error, Debug)]
pub enum TransportError {
    /// The caller's deadline passed before a response arrived.
    #[error("deadline exceeded after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn round_trip(
        &self,
        cx: &RequestContext,
        request: reqwest::Request,
    ) -> Result<reqwest::Response, TransportError>;
}

/// Sends requests with a plain reqwest client.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn round_trip(
        &self,
        _cx: &RequestContext,
        request: reqwest::Request,
    ) -> Result<reqwest::Response, TransportError> {
        Ok(self.client.execute(request).await?)
    }
}

pub struct TracingTransport<T> {
    inner: T,
    tracer: TracerHandle,
}

impl<T: Transport> TracingTransport<T> {
    pub fn new(inner: T, tracer: TracerHandle) -> Self {
        Self { inner, tracer }
    }
}

fn request_attributes(request: &reqwest::Request) -> Vec<KeyValue> {
    let url = request.url();
    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    };

    vec![
        KeyValue::new("http.method", request.method().to_string()),
        KeyValue::new("http.url", url.to_string()),
        KeyValue::new("http.target", url.path().to_string()),
        KeyValue::new("http.host", host),
    ]
}

#[async_trait]
impl<T: Transport> Transport for TracingTransport<T> {
    async fn round_trip(
        &self,
        cx: &RequestContext,
        mut request: reqwest::Request,
    ) -> Result<reqwest::Response, TransportError> {
        let span_cx = self.tracer.start(
            "http.request",
            SpanKind::Client,
            request_attributes(&request),
            cx.otel(),
        );
        let guard = SpanGuard::new(span_cx.clone());
        inject_context(&span_cx, request.headers_mut());

        let child = cx.with_otel(span_cx);
        let result = match (child.deadline(), child.remaining()) {
            (Some(deadline), Some(budget)) => {
                match tokio::time::timeout_at(deadline, self.inner.round_trip(&child, request)).await {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::Timeout(budget)),
                }
            }
            _ => self.inner.round_trip(&child, request).await,
        };

        match &result {
            Ok(response) => {
                let status = response.status();
                guard.set_attribute(KeyValue::new("http.status_code", i64::from(status.as_u16())));
                guard.set_attribute(KeyValue::new("http.status_text", status.to_string()));
            }
            Err(e) => guard.fail(e, e.to_string()),
        }
        guard.end();

        result
    }
}

/// reqwest client whose requests are sent through a [`TracingTransport`].
pub struct InstrumentedClient {
    client: reqwest::Client,
    transport: TracingTransport<ReqwestTransport>,
}

impl InstrumentedClient {
    pub fn new(config: &OutboundConfig, tracer: TracerHandle) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let transport = TracingTransport::new(ReqwestTransport::new(client.clone()), tracer);
        Ok(Self { client, transport })
    }

    pub fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client.request(method, url)
    }

    pub fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.get(url)
    }

    pub async fn send(
        &self,
        cx: &RequestContext,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, TransportError> {
        self.transport.round_trip(cx, request.build()?).await
    }
}
