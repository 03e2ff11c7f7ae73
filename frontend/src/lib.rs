pub mod config;
pub mod context;
pub mod deployment;
pub mod error;
pub mod health;
pub mod middleware;
pub mod observability;
pub mod outbound;
pub mod server;
pub mod services;

pub use config::{AppConfig, load_config};
pub use context::RequestContext;
pub use error::TelemetryError;
pub use observability::{Telemetry, init_observability};
pub use server::start_server;

use anyhow::Result;

/// Main server entry point for library usage
pub async fn run_server() -> Result<()> {
    let app_config = config::load_config()?;

    let telemetry = observability::init_observability(&app_config)?;
    ::tracing::info!(
        service = %app_config.service.name,
        version = %app_config.service.version,
        "Frontend starting up"
    );

    server::start_server(app_config, telemetry).await
}
