//! Per-request context carried down the call chain.
//!
//! A [`RequestContext`] travels in the request's extensions. It holds the
//! OpenTelemetry context (and with it the active span) plus an optional
//! deadline. It is never mutated in place: components that open a child span
//! or tighten the deadline derive a new context and attach it for everything
//! downstream, so the parent's context is what remains active once the child
//! is done.

use std::time::Duration;

use axum::extract::Request;
use opentelemetry::Context;
use opentelemetry::trace::TraceContextExt;
use tokio::time::Instant;

#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    otel: Context,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context attached to `request`, or an empty one if none was attached.
    pub fn from_request(request: &Request) -> Self {
        request
            .extensions()
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default()
    }

    /// Replace the context stored in `request`'s extensions.
    pub fn attach(self, request: &mut Request) {
        request.extensions_mut().insert(self);
    }

    pub fn otel(&self) -> &Context {
        &self.otel
    }

    /// Derive a context whose active span is the one carried by `otel`.
    pub fn with_otel(&self, otel: Context) -> Self {
        Self {
            otel,
            deadline: self.deadline,
        }
    }

    /// Derive a context bounded by `deadline`; an earlier existing deadline wins.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current <= deadline => current,
            _ => deadline,
        };
        Self {
            otel: self.otel.clone(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn has_active_span(&self) -> bool {
        self.otel.has_active_span()
    }

    /// Hex trace id of the active span, if it carries a valid one.
    pub fn trace_id(&self) -> Option<String> {
        let span = self.otel.span();
        let span_context = span.span_context();
        span_context
            .is_valid()
            .then(|| format!("{:032x}", span_context.trace_id()))
    }

    pub fn span_id(&self) -> Option<String> {
        let span = self.otel.span();
        let span_context = span.span_context();
        span_context
            .is_valid()
            .then(|| format!("{:016x}", span_context.span_id()))
    }
}
