//! Storefront routes served through the telemetry pipeline
//!
//! Each endpoint is a [`Handler`](crate::middleware::Handler) wrapped by the
//! pipeline built from [`Telemetry::pipeline`]. Health probes and the scrape
//! endpoint are plain axum handlers outside the pipeline.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, RequestExt, Router,
    extract::{Path, Request},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;

use crate::config::AppConfig;
use crate::context::RequestContext;
use crate::health::{liveness_handler, readiness_handler};
use crate::middleware::handler_fn;
use crate::observability::{Telemetry, metrics_endpoint};
use crate::services::{InstrumentedCache, InstrumentedDatabase, MemoryCache, NoopDatabase};

const CART_TTL: Duration = Duration::from_secs(30 * 60);
const EMPTY_CART: &[u8] = b"[]";

/// Demo storefront backed by the instrumented cache and database.
#[derive(Clone)]
pub struct Storefront {
    telemetry: Telemetry,
    carts: Arc<InstrumentedCache<MemoryCache>>,
    catalog: Arc<InstrumentedDatabase<NoopDatabase>>,
}

impl Storefront {
    pub fn new(telemetry: Telemetry) -> Self {
        let carts = InstrumentedCache::new(
            MemoryCache::new(),
            telemetry.tracer().clone(),
            telemetry.business().clone(),
        );
        let catalog = InstrumentedDatabase::new(
            NoopDatabase,
            telemetry.tracer().clone(),
            telemetry.business().clone(),
        );
        Self {
            telemetry,
            carts: Arc::new(carts),
            catalog: Arc::new(catalog),
        }
    }

    async fn home(&self, _request: Request) -> Response {
        (StatusCode::OK, "Online Boutique").into_response()
    }

    async fn view_cart(&self, mut request: Request) -> Response {
        let cx = RequestContext::from_request(&request);
        let Ok(Path(id)) = request.extract_parts::<Path<String>>().await else {
            return StatusCode::BAD_REQUEST.into_response();
        };
        let key = format!("cart:{id}");

        let cart = match self.carts.get(&cx, &key).await {
            Ok(Some(cart)) => cart,
            Ok(None) => {
                if let Err(e) = self.carts.set(&cx, &key, EMPTY_CART.to_vec(), CART_TTL).await {
                    self.telemetry.logger().error(
                        &cx,
                        Some(&e),
                        "failed to create cart",
                        &[("cart_id", &id)],
                    );
                    return StatusCode::SERVICE_UNAVAILABLE.into_response();
                }
                self.telemetry.business().record_cart_created();
                EMPTY_CART.to_vec()
            }
            Err(e) => {
                self.telemetry
                    .logger()
                    .error(&cx, Some(&e), "failed to load cart", &[("cart_id", &id)]);
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
        };

        (StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], cart).into_response()
    }

    async fn abandon_cart(&self, _request: Request) -> Response {
        self.telemetry.business().record_cart_abandoned();
        StatusCode::NO_CONTENT.into_response()
    }

    async fn checkout(&self, mut request: Request) -> Response {
        let Ok(Path(id)) = request.extract_parts::<Path<String>>().await else {
            return StatusCode::BAD_REQUEST.into_response();
        };

        let business = self.telemetry.business();
        business.record_payment_attempt();
        business.record_order("completed");

        Json(json!({ "cart_id": id, "status": "completed" })).into_response()
    }

    async fn product(&self, mut request: Request) -> Response {
        let cx = RequestContext::from_request(&request);
        let Ok(Path(id)) = request.extract_parts::<Path<String>>().await else {
            return StatusCode::BAD_REQUEST.into_response();
        };

        let rows = self
            .catalog
            .query(
                &cx,
                "SELECT id, name, price_usd FROM products WHERE id = $1",
                &[json!(id)],
            )
            .await;

        match rows {
            Ok(rows) => match rows.into_iter().next() {
                Some(product) => Json(product).into_response(),
                None => (StatusCode::NOT_FOUND, "product not found").into_response(),
            },
            Err(e) => {
                self.telemetry
                    .logger()
                    .error(&cx, Some(&e), "failed to query product", &[("product_id", &id)]);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

macro_rules! store_handler {
    ($store:expr, $method:ident) => {{
        let store = $store.clone();
        handler_fn(move |request: Request| {
            let store = store.clone();
            async move { store.$method(request).await }
        })
    }};
}

async fn not_found(_request: Request) -> Response {
    (StatusCode::NOT_FOUND, "not found").into_response()
}

/// Build the application router.
///
/// Storefront routes and the fallback run through the telemetry pipeline;
/// `CatchPanicLayer` turns a panic that escapes it into a 500.
pub fn create_router(telemetry: &Telemetry, config: &AppConfig) -> Router {
    let pipeline = telemetry.pipeline(&config.server);
    let store = Storefront::new(telemetry.clone());

    Router::new()
        .route("/", get(pipeline.endpoint(store_handler!(store, home), "home")))
        .route(
            "/cart/{id}",
            get(pipeline.endpoint(store_handler!(store, view_cart), "view_cart"))
                .delete(pipeline.endpoint(store_handler!(store, abandon_cart), "abandon_cart")),
        )
        .route(
            "/cart/{id}/checkout",
            post(pipeline.endpoint(store_handler!(store, checkout), "checkout")),
        )
        .route(
            "/product/{id}",
            get(pipeline.endpoint(store_handler!(store, product), "product")),
        )
        .fallback(pipeline.endpoint(handler_fn(not_found), "not_found"))
        .route(
            &config.metrics.path,
            get(metrics_endpoint).with_state(telemetry.registry().clone()),
        )
        .route("/health", get(liveness_handler))
        .route("/health/ready", get(readiness_handler).with_state(telemetry.clone()))
        .layer(CatchPanicLayer::new())
}
