use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use garde::Validate;

use super::AppConfig;
use crate::error::TelemetryError;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "frontend", about = "Frontend service with request telemetry")]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, env = "APP_CONFIG")]
    pub config: Option<std::path::PathBuf>,

    /// Server port
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Environment name
    #[arg(long, env = "ENVIRONMENT")]
    pub environment: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Disable trace export
    #[arg(long)]
    pub no_tracing: bool,
}

/// Load configuration from defaults, files, `APP_` variables and the command line.
pub fn load_config() -> Result<AppConfig, TelemetryError> {
    load_config_from(&Cli::parse())
}

pub fn load_config_from(cli: &Cli) -> Result<AppConfig, TelemetryError> {
    let env_name = cli
        .environment
        .clone()
        .or_else(|| std::env::var("ENVIRONMENT").ok())
        .unwrap_or_else(|| "production".to_string());

    let mut figment = Figment::new()
        // 1. Embedded defaults (lowest priority)
        .merge(Serialized::defaults(AppConfig::default()))
        // 2. Default config file
        .merge(Toml::file("config/default.toml"))
        // 3. Environment-specific config
        .merge(Toml::file(format!("config/{env_name}.toml")));

    if let Some(path) = &cli.config {
        figment = figment.merge(Toml::file(path));
    }

    // 4. Environment variables with APP_ prefix
    figment = figment
        .merge(Env::prefixed("APP_").split("__"))
        .merge(Serialized::default("service.environment", &env_name));

    // 5. CLI arguments (highest priority)
    if let Some(port) = cli.port {
        figment = figment.merge(Serialized::default("server.port", port));
    }
    if cli.debug {
        figment = figment.merge(Serialized::default("logging.level", "debug"));
    }
    if cli.no_tracing {
        figment = figment.merge(Serialized::default("tracing.enabled", false));
    }

    let config: AppConfig = figment.extract()?;
    config.validate()?;

    Ok(config)
}
