//! Distributed tracing bootstrap using OpenTelemetry
//!
//! Builds the process tracer from configuration and hands it out as a
//! [`TracerHandle`] owned by the telemetry context. Spans are exported through
//! a batching OTLP exporter on the tokio runtime, so an unreachable collector
//! only affects trace delivery and never the request path.
//!
//! When tracing is disabled a provider without any exporter is used instead,
//! so middleware behaves identically in both modes.

use std::borrow::Cow;
use std::error::Error;
use std::time::Duration;

use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer as _, TracerProvider as _};
use opentelemetry::{Context, KeyValue, global};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{self, Sampler, Tracer, TracerProvider};
use opentelemetry_sdk::{Resource, runtime};
use tracing::{info, warn};

use crate::config::{ServiceConfig, TracingConfig};
use crate::error::TelemetryError;

/// Instrumentation scope name for every span produced by this crate.
pub const INSTRUMENTATION_NAME: &str = "frontend";

/// Process tracer plus the provider that owns its export pipeline.
#[derive(Clone)]
pub struct TracerHandle {
    provider: TracerProvider,
    tracer: Tracer,
}

impl TracerHandle {
    pub fn new(provider: TracerProvider) -> Self {
        let tracer = provider.tracer(INSTRUMENTATION_NAME);
        Self { provider, tracer }
    }

    /// Tracer that records spans but exports nothing.
    pub fn disabled() -> Self {
        Self::new(TracerProvider::builder().build())
    }

    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// Start a span as a child of `parent` (a root span if `parent` has none)
    /// and return the context in which it is active.
    pub fn start(
        &self,
        name: impl Into<Cow<'static, str>>,
        kind: SpanKind,
        attributes: Vec<KeyValue>,
        parent: &Context,
    ) -> Context {
        let span = self
            .tracer
            .span_builder(name)
            .with_kind(kind)
            .with_attributes(attributes)
            .start_with_context(&self.tracer, parent);
        parent.with_span(span)
    }

    pub fn force_flush(&self) {
        for result in self.provider.force_flush() {
            if let Err(e) = result {
                warn!(error = %e, "Failed to flush pending spans");
            }
        }
    }

    /// Flush pending spans and detach the global provider.
    pub fn shutdown(self) {
        self.force_flush();
        global::shutdown_tracer_provider();
    }
}

/// Ends the span active in a context exactly once.
///
/// Dropping the guard without calling [`SpanGuard::end`] means the owning
/// operation never finished (its future was dropped), so the span is closed
/// with an error status and `cancelled = true`.
pub struct SpanGuard {
    cx: Context,
    ended: bool,
}

impl SpanGuard {
    pub fn new(cx: Context) -> Self {
        Self { cx, ended: false }
    }

    pub fn context(&self) -> &Context {
        &self.cx
    }

    pub fn set_attribute(&self, attribute: KeyValue) {
        self.cx.span().set_attribute(attribute);
    }

    /// Record `error` on the span and mark it errored.
    pub fn fail(&self, error: &dyn Error, description: impl Into<Cow<'static, str>>) {
        let span = self.cx.span();
        span.record_error(error);
        span.set_status(Status::error(description));
    }

    pub fn end(mut self) {
        self.ended = true;
        self.cx.span().end();
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        if self.ended {
            return;
        }
        let span = self.cx.span();
        span.set_attribute(KeyValue::new("cancelled", true));
        span.set_status(Status::error("cancelled before completion"));
        span.end();
    }
}

/// Resource attributes attached to every span from this process.
pub fn service_resource(service: &ServiceConfig) -> Resource {
    Resource::new(vec![
        KeyValue::new("service.name", service.name.clone()),
        KeyValue::new("service.version", service.version.clone()),
        KeyValue::new("environment", service.environment.clone()),
        KeyValue::new("telemetry.sdk.name", "opentelemetry"),
        KeyValue::new("telemetry.sdk.language", "rust"),
    ])
}

fn sampler(sample_rate: f64) -> Sampler {
    let root = if sample_rate >= 1.0 {
        Sampler::AlwaysOn
    } else if sample_rate <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(sample_rate)
    };
    Sampler::ParentBased(Box::new(root))
}

/// Build the process tracer with a batching OTLP exporter.
pub fn init_tracer(
    service: &ServiceConfig,
    config: &TracingConfig,
) -> Result<TracerHandle, TelemetryError> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    if !config.enabled {
        info!("Distributed tracing is disabled");
        return Ok(TracerHandle::disabled());
    }

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .with_timeout(Duration::from_secs(config.export_timeout_secs));
    let exporter = opentelemetry_otlp::SpanExporterBuilder::from(exporter).build_span_exporter()?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_config(
            trace::Config::default()
                .with_sampler(sampler(config.sample_rate))
                .with_resource(service_resource(service)),
        )
        .build();

    global::set_tracer_provider(provider.clone());

    info!(
        endpoint = %config.otlp_endpoint,
        sample_rate = %config.sample_rate,
        service = %service.name,
        "Distributed tracing initialized"
    );

    Ok(TracerHandle::new(provider))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use opentelemetry::Value;
    use opentelemetry_sdk::export::trace::SpanData;
    use opentelemetry_sdk::testing::trace::InMemorySpanExporter;

    pub(crate) fn in_memory_tracer() -> (TracerHandle, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        (TracerHandle::new(provider), exporter)
    }

    pub(crate) fn finished_spans(
        tracer: &TracerHandle,
        exporter: &InMemorySpanExporter,
    ) -> Vec<SpanData> {
        tracer.force_flush();
        exporter.get_finished_spans().expect("exporter readable")
    }

    pub(crate) fn attribute(span: &SpanData, key: &str) -> Option<Value> {
        span.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| kv.value.clone())
    }

    pub(crate) fn is_error(span: &SpanData) -> bool {
        matches!(span.status, Status::Error { .. })
    }
}
