use garde::Validate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, Validate, Default)]
pub struct AppConfig {
    #[garde(dive)]
    #[serde(default)]
    pub service: ServiceConfig,

    #[garde(dive)]
    #[serde(default)]
    pub server: ServerConfig,

    #[garde(dive)]
    #[serde(default)]
    pub logging: LoggingConfig,

    #[garde(dive)]
    #[serde(default)]
    pub tracing: TracingConfig,

    #[garde(dive)]
    #[serde(default)]
    pub metrics: MetricsConfig,

    #[garde(dive)]
    #[serde(default)]
    pub metadata: MetadataConfig,

    #[garde(dive)]
    #[serde(default)]
    pub outbound: OutboundConfig,
}

/// Identity of this process, used as resource attributes and metric labels.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ServiceConfig {
    #[garde(length(min = 1))]
    #[serde(default = "default_service_name")]
    pub name: String,

    #[garde(length(min = 1))]
    #[serde(default = "default_service_version")]
    pub version: String,

    #[garde(length(min = 1))]
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_service_name() -> String {
    "frontend".to_string()
}

fn default_service_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_environment() -> String {
    "production".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            version: default_service_version(),
            environment: default_environment(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ServerConfig {
    #[garde(range(min = 1024, max = 65535))]
    #[serde(default = "default_port")]
    pub port: u16,

    #[garde(length(min = 1), custom(validate_bind_address))]
    #[serde(default = "default_bind")]
    pub bind: String,

    #[garde(range(min = 1, max = 300))]
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64, // seconds

    /// Per-request deadline; 0 disables the deadline middleware.
    #[garde(range(max = 600_000))]
    #[serde(default)]
    pub request_timeout_ms: u64,
}

fn default_port() -> u16 {
    8080
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            shutdown_timeout: default_shutdown_timeout(),
            request_timeout_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct LoggingConfig {
    #[garde(length(min = 1))]
    #[serde(default = "default_log_level")]
    pub level: String, // trace, debug, info, warn, error

    #[garde(pattern(r"^(json|pretty)$"))]
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct TracingConfig {
    #[garde(skip)]
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[garde(length(min = 1))]
    #[serde(default = "default_otlp_endpoint")]
    pub otlp_endpoint: String,

    /// 1.0 samples every root trace.
    #[garde(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,

    #[garde(range(min = 1, max = 120))]
    #[serde(default = "default_export_timeout")]
    pub export_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_otlp_endpoint() -> String {
    "http://otel-collector:4317".to_string()
}

fn default_sample_rate() -> f64 {
    1.0
}

fn default_export_timeout() -> u64 {
    10
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            otlp_endpoint: default_otlp_endpoint(),
            sample_rate: default_sample_rate(),
            export_timeout_secs: default_export_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct MetricsConfig {
    #[garde(length(min = 1), custom(validate_path))]
    #[serde(default = "default_metrics_path")]
    pub path: String,

    /// Distinct values admitted per free-form label before folding into "other".
    #[garde(range(min = 1, max = 1000))]
    #[serde(default = "default_max_label_values")]
    pub max_label_values: usize,
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_max_label_values() -> usize {
    50
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            path: default_metrics_path(),
            max_label_values: default_max_label_values(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct MetadataConfig {
    #[garde(skip)]
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[garde(length(min = 1))]
    #[serde(default = "default_metadata_host")]
    pub host: String,

    #[garde(range(min = 1, max = 60_000))]
    #[serde(default = "default_metadata_timeout")]
    pub timeout_ms: u64,
}

fn default_metadata_host() -> String {
    std::env::var("GCE_METADATA_HOST").unwrap_or_else(|_| "169.254.169.254".to_string())
}

fn default_metadata_timeout() -> u64 {
    2000
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_metadata_host(),
            timeout_ms: default_metadata_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct OutboundConfig {
    #[garde(range(min = 1, max = 600))]
    #[serde(default = "default_outbound_timeout")]
    pub timeout_secs: u64,
}

fn default_outbound_timeout() -> u64 {
    30
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_outbound_timeout(),
        }
    }
}

fn validate_bind_address(value: &str, _: &()) -> garde::Result {
    value
        .parse::<std::net::IpAddr>()
        .map(|_| ())
        .map_err(|_| garde::Error::new("Invalid IP address"))
}

fn validate_path(value: &str, _: &()) -> garde::Result {
    if value.starts_with('/') {
        Ok(())
    } else {
        Err(garde::Error::new("Path must start with '/'"))
    }
}
