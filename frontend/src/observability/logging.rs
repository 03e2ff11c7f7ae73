//! Structured log output
//!
//! Production logs are newline-delimited JSON on stdout, one object per
//! event, with a fixed field mapping:
//!
//! | key         | content                                   |
//! |-------------|-------------------------------------------|
//! | `timestamp` | RFC 3339 in UTC with nanosecond precision |
//! | `severity`  | level name (`INFO`, `WARN`, ...)          |
//! | `message`   | the event message                         |
//! | `logger`    | the event target                          |
//!
//! Every other structured field of the event is copied alongside. The
//! `pretty` format is meant for local development only.

use std::fmt;
use std::io;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;
use crate::error::TelemetryError;

/// Event formatter writing the field-mapped JSON record.
#[derive(Debug, Default, Clone, Copy)]
pub struct FieldMappedJson;

impl<S, N> FormatEvent<S, N> for FieldMappedJson
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        let record = render_record(Utc::now(), metadata.level(), metadata.target(), visitor.fields);

        writeln!(writer, "{}", Value::Object(record))
    }
}

/// Build the JSON object for one event.
pub fn render_record(
    timestamp: DateTime<Utc>,
    level: &Level,
    target: &str,
    mut fields: Map<String, Value>,
) -> Map<String, Value> {
    let message = fields.remove("message").unwrap_or(Value::String(String::new()));

    let mut record = Map::new();
    record.insert(
        "timestamp".to_string(),
        Value::String(timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)),
    );
    record.insert("severity".to_string(), Value::String(level.as_str().to_string()));
    record.insert("message".to_string(), message);
    record.insert("logger".to_string(), Value::String(target.to_string()));

    for (key, value) in fields {
        record.entry(key).or_insert(value);
    }
    record
}

/// Collects event fields as JSON values.
#[derive(Default)]
struct JsonVisitor {
    fields: Map<String, Value>,
}

impl Visit for JsonVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields
            .insert(field.name().to_string(), Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.fields
            .insert(field.name().to_string(), Value::String(value.to_string()));
    }
}

/// Install the process-wide subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match config.format.as_str() {
        "json" => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .event_format(FieldMappedJson)
                .with_writer(io::stdout);
            registry.with(fmt_layer).try_init()
        }
        "pretty" => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_thread_names(true);
            registry.with(fmt_layer).try_init()
        }
        other => {
            return Err(TelemetryError::Logging(format!(
                "Unsupported log format: {other}. Use 'json' or 'pretty'"
            )));
        }
    };
    result.map_err(|e| TelemetryError::Logging(e.to_string()))?;

    tracing::info!(format = %config.format, level = %config.level, "Structured logging initialized");

    Ok(())
}
