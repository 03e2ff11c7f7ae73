//! Handler capability and pipeline composition
//!
//! A [`Pipeline`] is an ordered list of [`HandlerLayer`]s declared once at
//! startup. Wrapping a handler applies the layers so that the first one added
//! is the outermost. Each layer only sees a [`BoxHandler`], so any layer can
//! be tested on its own around a bare handler.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use tracing::warn;

use super::responder::{BufferedResponse, ResponseWriter};

/// A request handler that writes its outcome into a [`ResponseWriter`].
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, request: Request, response: &mut dyn ResponseWriter);
}

pub type BoxHandler = Arc<dyn Handler>;

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn handle(&self, request: Request, response: &mut dyn ResponseWriter) {
        (**self).handle(request, response).await
    }
}

/// Adapts an axum-style `async fn(Request) -> impl IntoResponse`.
#[derive(Clone)]
pub struct FnHandler<F> {
    f: F,
}

pub fn handler_fn<F, Fut, R>(f: F) -> FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send,
    R: IntoResponse,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut, R> Handler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send,
    R: IntoResponse,
{
    async fn handle(&self, request: Request, response: &mut dyn ResponseWriter) {
        let (parts, body) = (self.f)(request).await.into_response().into_parts();

        response.headers_mut().extend(parts.headers);
        response.write_status(parts.status);

        match axum::body::to_bytes(body, usize::MAX).await {
            Ok(bytes) if !bytes.is_empty() => response.write_body(&bytes),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to collect response body"),
        }
    }
}

/// One telemetry concern that can wrap a handler.
pub trait HandlerLayer: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Wrap `inner`; `operation` names the endpoint being wrapped.
    fn wrap(&self, inner: BoxHandler, operation: &str) -> BoxHandler;
}

#[derive(Default)]
pub struct PipelineBuilder {
    layers: Vec<Arc<dyn HandlerLayer>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer inside every layer added so far.
    pub fn layer(mut self, layer: impl HandlerLayer) -> Self {
        self.layers.push(Arc::new(layer));
        self
    }

    pub fn layer_if(self, enabled: bool, layer: impl HandlerLayer) -> Self {
        if enabled { self.layer(layer) } else { self }
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            layers: self.layers.into(),
        }
    }
}

#[derive(Clone)]
pub struct Pipeline {
    layers: Arc<[Arc<dyn HandlerLayer>]>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Layer names, outermost first.
    pub fn layer_names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|layer| layer.name()).collect()
    }

    pub fn wrap(&self, handler: impl Handler, operation: &str) -> BoxHandler {
        let mut wrapped: BoxHandler = Arc::new(handler);
        for layer in self.layers.iter().rev() {
            wrapped = layer.wrap(wrapped, operation);
        }
        wrapped
    }

    /// Wrap `handler` and expose it as an axum handler.
    pub fn endpoint(
        &self,
        handler: impl Handler,
        operation: &str,
    ) -> impl Fn(Request) -> BoxFuture<'static, Response> + Clone + Send + Sync + 'static {
        endpoint(self.wrap(handler, operation))
    }
}

/// Serve a [`BoxHandler`] from an axum route.
pub fn endpoint(
    handler: BoxHandler,
) -> impl Fn(Request) -> BoxFuture<'static, Response> + Clone + Send + Sync + 'static {
    move |request: Request| {
        let handler = handler.clone();
        Box::pin(async move {
            let mut sink = BufferedResponse::new();
            handler.handle(request, &mut sink).await;
            sink.into_response()
        }) as BoxFuture<'static, Response>
    }
}
