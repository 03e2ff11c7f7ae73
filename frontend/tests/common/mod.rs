#![allow(dead_code)]

use std::net::SocketAddr;

use axum::Router;
use frontend_telemetry::config::{MetricsConfig, ServiceConfig};
use frontend_telemetry::deployment::{DeploymentDetails, DeploymentSnapshot};
use frontend_telemetry::observability::{MetricsRegistry, Telemetry, TracerHandle};
use opentelemetry::Value;
use opentelemetry::trace::Status;
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
use opentelemetry_sdk::trace::TracerProvider;
use tokio::net::TcpListener;

pub struct TestTelemetry {
    pub telemetry: Telemetry,
    pub exporter: InMemorySpanExporter,
}

impl TestTelemetry {
    pub fn new() -> Self {
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let telemetry = Telemetry::new(
            ServiceConfig::default(),
            TracerHandle::new(provider),
            MetricsRegistry::new(&MetricsConfig::default()).unwrap(),
            DeploymentDetails::fixed(DeploymentSnapshot {
                hostname: Some("frontend-test".to_string()),
                cluster_name: Some("test-cluster".to_string()),
                zone: Some("us-central1-a".to_string()),
            }),
        );
        Self {
            telemetry,
            exporter,
        }
    }

    pub fn spans(&self) -> Vec<SpanData> {
        self.telemetry.tracer().force_flush();
        self.exporter.get_finished_spans().unwrap()
    }

    pub fn scrape(&self) -> String {
        self.telemetry.registry().render()
    }
}

pub fn attribute(span: &SpanData, key: &str) -> Option<Value> {
    span.attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| kv.value.clone())
}

pub fn is_error(span: &SpanData) -> bool {
    matches!(span.status, Status::Error { .. })
}

/// Serve `router` on an ephemeral local port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}
