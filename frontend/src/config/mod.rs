pub mod models;
pub mod validation;

pub use models::*;
pub use validation::*;

#[cfg(test)]
mod tests {
    use super::*;
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };
    use garde::Validate;
    use std::io::Write;

    #[test]
    fn test_valid_config_loads() {
        let config_toml = r#"
            [service]
            name = "frontend"
            environment = "staging"

            [server]
            port = 8080
            bind = "0.0.0.0"

            [logging]
            level = "info"
            format = "json"

            [tracing]
            otlp_endpoint = "http://collector:4317"
            sample_rate = 0.25
        "#;

        let config: AppConfig = Figment::new()
            .merge(Toml::string(config_toml))
            .extract()
            .expect("Should parse valid config");

        assert_eq!(config.service.name, "frontend");
        assert_eq!(config.service.environment, "staging");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.tracing.otlp_endpoint, "http://collector:4317");
        assert_eq!(config.tracing.sample_rate, 0.25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port_rejected() {
        let config_toml = r#"
            [server]
            port = 80
            bind = "0.0.0.0"
        "#;

        let config: AppConfig = Figment::new()
            .merge(Toml::string(config_toml))
            .extract()
            .expect("Should parse");

        let validation = config.validate();
        assert!(validation.is_err());
        assert!(validation.unwrap_err().to_string().contains("port"));
    }

    #[test]
    fn test_sample_rate_out_of_range_rejected() {
        let config_toml = r#"
            [tracing]
            sample_rate = 1.5
        "#;

        let config: AppConfig = Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Toml::string(config_toml))
            .extract()
            .expect("Should parse");

        let validation = config.validate();
        assert!(validation.is_err());
        assert!(validation.unwrap_err().to_string().contains("sample_rate"));
    }

    #[test]
    fn test_metrics_path_must_be_absolute() {
        let config_toml = r#"
            [metrics]
            path = "metrics"
        "#;

        let config: AppConfig = Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Toml::string(config_toml))
            .extract()
            .expect("Should parse");

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_hierarchy() {
        unsafe {
            std::env::set_var("APP_SERVER__PORT", "3000");
        }

        let default = r#"[server]
        port = 8080"#;

        let env_specific = r#"[server]
        port = 9090"#;

        let config: AppConfig = Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Toml::string(default))
            .merge(Toml::string(env_specific))
            .merge(Env::prefixed("APP_").split("__"))
            .extract()
            .expect("Should merge configs");

        // Environment variable should win
        assert_eq!(config.server.port, 3000);

        unsafe {
            std::env::remove_var("APP_SERVER__PORT");
        }
    }

    #[test]
    fn test_default_values() {
        let config: AppConfig = Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .extract()
            .expect("Should load defaults");

        assert_eq!(config.service.name, "frontend");
        assert_eq!(config.service.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(config.metrics.path, "/metrics");
        assert_eq!(config.metrics.max_label_values, 50);
        assert_eq!(config.outbound.timeout_secs, 30);
        assert_eq!(config.server.request_timeout_ms, 0);
        assert!(config.tracing.enabled);
        assert!(config.metadata.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_catches_invalid_bind() {
        let config_toml = r#"
            [server]
            port = 8080
            bind = "invalid-ip-address"
        "#;

        let config: AppConfig = Figment::new()
            .merge(Toml::string(config_toml))
            .extract()
            .expect("Should parse");

        let validation = config.validate();
        assert!(validation.is_err());
        assert!(validation.unwrap_err().to_string().contains("bind"));
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "[server]\nport = 9000\n\n[tracing]\nenabled = true\n"
        )
        .expect("write config");

        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            port: Some(9500),
            environment: Some("test".to_string()),
            debug: true,
            no_tracing: true,
        };

        let config = load_config_from(&cli).expect("config should load");
        assert_eq!(config.server.port, 9500);
        assert_eq!(config.service.environment, "test");
        assert_eq!(config.logging.level, "debug");
        assert!(!config.tracing.enabled);
    }
}
