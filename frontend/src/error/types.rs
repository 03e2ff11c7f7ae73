use thiserror::Error;

/// Failures while bringing the telemetry layer up.
///
/// None of these are ever produced on the request path; once the
/// [`Telemetry`](crate::observability::Telemetry) context exists, telemetry
/// problems degrade observability instead of surfacing to clients.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tracing initialization failed: {0}")]
    TracingInit(String),

    #[error("Metrics registry error: {0}")]
    Metrics(String),

    #[error("Logging initialization failed: {0}")]
    Logging(String),
}

impl From<figment::Error> for TelemetryError {
    fn from(err: figment::Error) -> Self {
        TelemetryError::Config(err.to_string())
    }
}

impl From<garde::Report> for TelemetryError {
    fn from(report: garde::Report) -> Self {
        TelemetryError::Config(report.to_string())
    }
}

impl From<opentelemetry::trace::TraceError> for TelemetryError {
    fn from(err: opentelemetry::trace::TraceError) -> Self {
        TelemetryError::TracingInit(err.to_string())
    }
}

impl From<metrics_exporter_prometheus::BuildError> for TelemetryError {
    fn from(err: metrics_exporter_prometheus::BuildError) -> Self {
        TelemetryError::Metrics(err.to_string())
    }
}
