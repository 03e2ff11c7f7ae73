//! Observability initialization
//!
//! [`init_observability`] brings up logging, tracing and metrics at server
//! startup and starts the deployment metadata lookup in the background. The
//! resulting [`Telemetry`] is passed explicitly to everything that records
//! telemetry; nothing here is reachable through a global.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::correlated::CorrelatedLogger;
use super::logging::init_logging;
use super::metrics::BusinessMetrics;
use super::recorder::MetricsRegistry;
use super::tracing::{TracerHandle, init_tracer};
use crate::config::{AppConfig, ServerConfig, ServiceConfig};
use crate::deployment::{
    DeploymentDetails, GceMetadataSource, LocalOnlySource, MetadataSource, spawn_loader,
};
use crate::error::TelemetryError;
use crate::middleware::{AccessLogLayer, DeadlineLayer, MetricsLayer, Pipeline, SpanLayer};

/// Everything a request needs to record traces, metrics and logs.
#[derive(Clone)]
pub struct Telemetry {
    service: Arc<ServiceConfig>,
    tracer: TracerHandle,
    registry: MetricsRegistry,
    business: BusinessMetrics,
    deployment: DeploymentDetails,
    logger: CorrelatedLogger,
}

impl Telemetry {
    pub fn new(
        service: ServiceConfig,
        tracer: TracerHandle,
        registry: MetricsRegistry,
        deployment: DeploymentDetails,
    ) -> Self {
        let business = BusinessMetrics::new(registry.clone(), service.name.clone());
        let logger = CorrelatedLogger::new(deployment.clone());
        Self {
            service: Arc::new(service),
            tracer,
            registry,
            business,
            deployment,
            logger,
        }
    }

    pub fn service(&self) -> &ServiceConfig {
        &self.service
    }

    pub fn tracer(&self) -> &TracerHandle {
        &self.tracer
    }

    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    pub fn business(&self) -> &BusinessMetrics {
        &self.business
    }

    pub fn deployment(&self) -> &DeploymentDetails {
        &self.deployment
    }

    pub fn logger(&self) -> &CorrelatedLogger {
        &self.logger
    }

    /// Standard request pipeline, outermost first.
    ///
    /// Metrics wrap everything so their duration covers span bookkeeping too.
    /// The access log runs inside the span so its record carries the request's
    /// trace id.
    pub fn pipeline(&self, server: &ServerConfig) -> Pipeline {
        Pipeline::builder()
            .layer(MetricsLayer::new(self.registry.clone(), self.service.name.clone()))
            .layer(SpanLayer::new(self.tracer.clone()))
            .layer(AccessLogLayer::new(self.logger.clone()))
            .layer_if(
                server.request_timeout_ms > 0,
                DeadlineLayer::new(Duration::from_millis(server.request_timeout_ms)),
            )
            .build()
    }

    /// Flush pending spans and detach the tracer provider.
    pub fn shutdown(self) {
        info!("Shutting down telemetry");
        self.tracer.shutdown();
    }
}

fn metadata_source(config: &AppConfig) -> Arc<dyn MetadataSource> {
    if !config.metadata.enabled {
        return Arc::new(LocalOnlySource);
    }

    match GceMetadataSource::new(&config.metadata) {
        Ok(source) => Arc::new(source),
        Err(e) => {
            warn!(error = %e, "Failed to build metadata client, using local hostname only");
            Arc::new(LocalOnlySource)
        }
    }
}

/// Log a loader task that ended without publishing; readers then stay unloaded.
async fn watch_loader(loader: JoinHandle<()>) {
    if let Err(e) = loader.await {
        error!(error = %e, "Deployment metadata loader failed");
    }
}

/// Initialize logging, tracing and metrics, and start loading deployment details.
///
/// Must be called from within a tokio runtime. The metadata lookup runs in the
/// background; requests served before it completes see empty deployment
/// fields.
pub fn init_observability(config: &AppConfig) -> Result<Telemetry, TelemetryError> {
    init_logging(&config.logging)?;

    let tracer = init_tracer(&config.service, &config.tracing)?;
    let registry = MetricsRegistry::new(&config.metrics)?;
    let (deployment, loader) = spawn_loader(metadata_source(config));
    tokio::spawn(watch_loader(loader));

    info!(
        service = %config.service.name,
        environment = %config.service.environment,
        tracing_enabled = config.tracing.enabled,
        metadata_enabled = config.metadata.enabled,
        log_format = %config.logging.format,
        "Observability components initialized"
    );

    Ok(Telemetry::new(config.service.clone(), tracer, registry, deployment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetricsConfig;
    use crate::deployment::DeploymentSnapshot;
    use tracing_test::traced_test;

    fn telemetry() -> Telemetry {
        Telemetry::new(
            ServiceConfig::default(),
            TracerHandle::disabled(),
            MetricsRegistry::new(&MetricsConfig::default()).unwrap(),
            DeploymentDetails::fixed(DeploymentSnapshot::default()),
        )
    }

    #[test]
    fn test_pipeline_order() {
        let server = ServerConfig {
            request_timeout_ms: 5000,
            ..ServerConfig::default()
        };

        assert_eq!(
            telemetry().pipeline(&server).layer_names(),
            vec!["metrics", "span", "access_log", "deadline"]
        );
    }

    #[test]
    fn test_pipeline_without_deadline() {
        let server = ServerConfig {
            request_timeout_ms: 0,
            ..ServerConfig::default()
        };

        assert_eq!(
            telemetry().pipeline(&server).layer_names(),
            vec!["metrics", "span", "access_log"]
        );
    }

    #[test]
    fn test_business_metrics_use_service_name() {
        let telemetry = telemetry();
        assert_eq!(telemetry.business().service(), telemetry.service().name);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failed_loader_is_logged() {
        let loader: JoinHandle<()> = tokio::spawn(async { panic!("metadata client crashed") });

        watch_loader(loader).await;

        assert!(logs_contain("Deployment metadata loader failed"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_finished_loader_is_silent() {
        watch_loader(tokio::spawn(async {})).await;

        assert!(!logs_contain("Deployment metadata loader failed"));
    }

    #[tokio::test]
    async fn test_disabled_metadata_uses_local_source() {
        let mut config = AppConfig::default();
        config.metadata.enabled = false;

        let (details, loader) = spawn_loader(metadata_source(&config));
        loader.await.unwrap();

        let snapshot = details.current();
        assert!(details.is_loaded());
        assert!(snapshot.cluster_name.is_none());
        assert!(snapshot.zone.is_none());
    }
}
