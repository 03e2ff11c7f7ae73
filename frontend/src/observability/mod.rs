//! Observability for the storefront frontend
//!
//! Tracing bootstrap, the Prometheus metrics registry and catalog, structured
//! logging, and the [`Telemetry`] context that hands them to the request
//! pipeline.

pub mod correlated;
pub mod endpoint;
pub mod init;
pub mod logging;
pub mod metrics;
pub mod propagation;
pub mod recorder;
pub mod tracing;

pub use correlated::CorrelatedLogger;
pub use endpoint::{EXPOSITION_CONTENT_TYPE, metrics_endpoint};
pub use init::{Telemetry, init_observability};
pub use logging::{FieldMappedJson, init_logging};
pub use self::metrics::{BusinessMetrics, record_http_request};
pub use propagation::{extract_context, inject_context};
pub use recorder::{CardinalityLimiter, MetricsRegistry};
pub use self::tracing::{SpanGuard, TracerHandle, init_tracer};
