//! Traced database access
//!
//! [`InstrumentedDatabase`] opens a `database.query` client span around every
//! statement a [`DatabaseBackend`] executes. The backend itself is pluggable;
//! only the no-op [`NoopDatabase`] ships here.

use async_trait::async_trait;
use opentelemetry::KeyValue;
use opentelemetry::trace::SpanKind;
use serde_json::Value;
use thiserror::Error;

use crate::context::RequestContext;
use crate::observability::metrics::BusinessMetrics;
use crate::observability::tracing::{SpanGuard, TracerHandle};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Timeout occurred: {0}")]
    Timeout(String),
}

impl DatabaseError {
    /// Bounded label for `database_connections_failed_total`.
    pub fn kind(&self) -> &'static str {
        match self {
            DatabaseError::ConnectionFailed(_) => "connection_failed",
            DatabaseError::QueryFailed(_) => "query_failed",
            DatabaseError::Timeout(_) => "timeout",
        }
    }
}

pub type Row = Value;

#[async_trait]
pub trait DatabaseBackend: Send + Sync {
    /// Value of the `db.system` span attribute.
    fn system(&self) -> &'static str;

    async fn query(
        &self,
        cx: &RequestContext,
        statement: &str,
        params: &[Value],
    ) -> Result<Vec<Row>, DatabaseError>;
}

/// Backend that answers every statement with no rows.
pub struct NoopDatabase;

#[async_trait]
impl DatabaseBackend for NoopDatabase {
    fn system(&self) -> &'static str {
        "postgresql"
    }

    async fn query(
        &self,
        _cx: &RequestContext,
        _statement: &str,
        _params: &[Value],
    ) -> Result<Vec<Row>, DatabaseError> {
        Ok(Vec::new())
    }
}

pub struct InstrumentedDatabase<B> {
    backend: B,
    tracer: TracerHandle,
    metrics: BusinessMetrics,
}

impl<B: DatabaseBackend> InstrumentedDatabase<B> {
    pub fn new(backend: B, tracer: TracerHandle, metrics: BusinessMetrics) -> Self {
        Self {
            backend,
            tracer,
            metrics,
        }
    }

    pub async fn query(
        &self,
        cx: &RequestContext,
        statement: &str,
        params: &[Value],
    ) -> Result<Vec<Row>, DatabaseError> {
        let span_cx = self.tracer.start(
            "database.query",
            SpanKind::Client,
            vec![
                KeyValue::new("db.statement", statement.to_string()),
                KeyValue::new("db.system", self.backend.system()),
            ],
            cx.otel(),
        );
        let guard = SpanGuard::new(span_cx.clone());
        let child = cx.with_otel(span_cx);

        let query = self.backend.query(&child, statement, params);
        let result = match child.deadline() {
            Some(deadline) => tokio::time::timeout_at(deadline, query)
                .await
                .unwrap_or_else(|_| Err(DatabaseError::Timeout("request deadline exceeded".to_string()))),
            None => query.await,
        };

        match &result {
            Ok(rows) => guard.set_attribute(KeyValue::new("db.rows", rows.len() as i64)),
            Err(e) => {
                guard.fail(e, e.to_string());
                if matches!(e, DatabaseError::ConnectionFailed(_) | DatabaseError::Timeout(_)) {
                    self.metrics.record_database_connection_failure(e.kind());
                }
            }
        }
        guard.end();

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetricsConfig;
    use crate::observability::metrics::DATABASE_CONNECTIONS_FAILED_TOTAL;
    use crate::observability::recorder::{MetricsRegistry, sample_value};
    use crate::observability::tracing::testing::*;
    use opentelemetry::Value as AttributeValue;
    use opentelemetry::trace::Status;
    use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::Instant;

    struct Refusing;

    #[async_trait]
    impl DatabaseBackend for Refusing {
        fn system(&self) -> &'static str {
            "postgresql"
        }

        async fn query(
            &self,
            _cx: &RequestContext,
            _statement: &str,
            _params: &[Value],
        ) -> Result<Vec<Row>, DatabaseError> {
            Err(DatabaseError::ConnectionFailed("connection refused".to_string()))
        }
    }

    struct Products;

    #[async_trait]
    impl DatabaseBackend for Products {
        fn system(&self) -> &'static str {
            "postgresql"
        }

        async fn query(
            &self,
            _cx: &RequestContext,
            _statement: &str,
            params: &[Value],
        ) -> Result<Vec<Row>, DatabaseError> {
            Ok(vec![json!({ "id": params[0], "name": "Sunglasses" })])
        }
    }

    struct Stalled;

    #[async_trait]
    impl DatabaseBackend for Stalled {
        fn system(&self) -> &'static str {
            "postgresql"
        }

        async fn query(
            &self,
            _cx: &RequestContext,
            _statement: &str,
            _params: &[Value],
        ) -> Result<Vec<Row>, DatabaseError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    fn setup<B: DatabaseBackend>(
        backend: B,
    ) -> (InstrumentedDatabase<B>, TracerHandle, InMemorySpanExporter, MetricsRegistry) {
        let (tracer, exporter) = in_memory_tracer();
        let registry = MetricsRegistry::new(&MetricsConfig::default()).unwrap();
        let metrics = BusinessMetrics::new(registry.clone(), "frontend");
        (InstrumentedDatabase::new(backend, tracer.clone(), metrics), tracer, exporter, registry)
    }

    #[tokio::test]
    async fn test_query_span_attributes() {
        let (db, tracer, exporter, _) = setup(Products);

        let rows = db
            .query(&RequestContext::new(), "SELECT * FROM products WHERE id = $1", &[json!("OLJCESPC7Z")])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        let spans = finished_spans(&tracer, &exporter);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "database.query");
        assert_eq!(
            attribute(&spans[0], "db.statement"),
            Some(AttributeValue::from("SELECT * FROM products WHERE id = $1"))
        );
        assert_eq!(attribute(&spans[0], "db.system"), Some(AttributeValue::from("postgresql")));
        assert_eq!(attribute(&spans[0], "db.rows"), Some(AttributeValue::I64(1)));
    }

    #[tokio::test]
    async fn test_connection_failure_recorded() {
        let (db, tracer, exporter, registry) = setup(Refusing);

        let err = db.query(&RequestContext::new(), "SELECT 1", &[]).await.unwrap_err();
        assert!(matches!(err, DatabaseError::ConnectionFailed(_)));

        let spans = finished_spans(&tracer, &exporter);
        assert_eq!(spans[0].status, Status::error("Connection failed: connection refused"));
        assert_eq!(
            sample_value(
                &registry.render(),
                DATABASE_CONNECTIONS_FAILED_TOTAL,
                &[("error", "connection_failed")]
            ),
            Some(1.0)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_bounded_by_deadline() {
        let (db, tracer, exporter, _) = setup(Stalled);
        let cx = RequestContext::new().with_deadline(Instant::now() + Duration::from_millis(100));

        let err = db.query(&cx, "SELECT pg_sleep(60)", &[]).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Timeout(_)));

        let spans = finished_spans(&tracer, &exporter);
        assert!(is_error(&spans[0]));
    }

    #[tokio::test]
    async fn test_noop_backend_returns_no_rows() {
        let (db, _, _, _) = setup(NoopDatabase);
        let rows = db.query(&RequestContext::new(), "SELECT 1", &[]).await.unwrap();
        assert!(rows.is_empty());
    }
}
