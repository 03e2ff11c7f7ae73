//! Prometheus scrape endpoint
//!
//! Serves every series of the [`MetricsRegistry`] in the text exposition
//! format. Scrapes are outside request-serving traffic and are not themselves
//! wrapped by the telemetry pipeline.

use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use super::recorder::MetricsRegistry;

pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub async fn metrics_endpoint(State(registry): State<MetricsRegistry>) -> Response {
    let metrics_content = registry.render();

    tracing::debug!(
        metrics_size = %metrics_content.len(),
        "Metrics served successfully"
    );

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
        metrics_content,
    )
        .into_response()
}
