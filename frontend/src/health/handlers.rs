use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::debug;

use crate::deployment::DeploymentSnapshot;
use crate::observability::Telemetry;

/// Component name of the deployment lookup in `application_health`.
const DEPLOYMENT_COMPONENT: &str = "deployment_metadata";

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub service: String,
    pub version: String,
    pub deployment_loaded: bool,
    pub deployment: DeploymentSnapshot,
}

/// Liveness probe handler at /health - indicates if the process is running.
pub async fn liveness_handler() -> Response {
    (StatusCode::OK, "OK").into_response()
}

/// Readiness probe handler at /health/ready
///
/// Reports the deployment details loaded so far. The metadata lookup only
/// enriches telemetry, so the service is ready whether or not it has finished,
/// and this handler never waits for it.
pub async fn readiness_handler(State(telemetry): State<Telemetry>) -> Json<ReadinessResponse> {
    let deployment = telemetry.deployment();
    let loaded = deployment.is_loaded();

    telemetry
        .business()
        .set_application_health(DEPLOYMENT_COMPONENT, loaded);
    debug!(deployment_loaded = loaded, "Readiness check requested");

    Json(ReadinessResponse {
        status: "ready",
        service: telemetry.service().name.clone(),
        version: telemetry.service().version.clone(),
        deployment_loaded: loaded,
        deployment: (*deployment.current()).clone(),
    })
}
