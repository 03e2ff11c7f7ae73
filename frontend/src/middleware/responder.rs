//! Response sinks and status capture
//!
//! Handlers in the telemetry pipeline write their outcome into a
//! [`ResponseWriter`] instead of returning it, so every layer between the
//! server and the handler sees the same write calls. A layer that needs the
//! final status wraps the writer in a [`StatusCapturingResponder`] and reads
//! the [`CapturedStatus`] once the handler has returned.

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

/// The write operations available to a handler.
pub trait ResponseWriter: Send {
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Set the status. Only the first call (or the implicit 200 of a body
    /// write) takes effect.
    fn write_status(&mut self, status: StatusCode);

    fn write_body(&mut self, chunk: &[u8]);
}

/// In-memory sink converted into the server's response once the pipeline returns.
#[derive(Debug, Default)]
pub struct BufferedResponse {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed status, 200 if nothing was written.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

impl ResponseWriter for BufferedResponse {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }

    fn write_body(&mut self, chunk: &[u8]) {
        self.write_status(StatusCode::OK);
        self.body.extend_from_slice(chunk);
    }
}

impl IntoResponse for BufferedResponse {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, self.headers, self.body).into_response()
    }
}

/// Status observed on a wrapped writer; 0 means nothing was written yet.
#[derive(Clone, Debug, Default)]
pub struct CapturedStatus(Arc<AtomicU16>);

impl CapturedStatus {
    /// Record `status` unless one was already recorded. Returns whether it was.
    pub fn capture(&self, status: StatusCode) -> bool {
        self.0
            .compare_exchange(0, status.as_u16(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire) != 0
    }

    /// The captured status, or 200 when the handler never set one.
    pub fn get(&self) -> StatusCode {
        match self.0.load(Ordering::Acquire) {
            0 => StatusCode::OK,
            code => StatusCode::from_u16(code).unwrap_or(StatusCode::OK),
        }
    }
}

/// Forwards every write to `inner` and records the first status it sees.
///
/// Bytes, headers and status reach the inner writer unchanged.
pub struct StatusCapturingResponder<'a> {
    inner: &'a mut dyn ResponseWriter,
    status: CapturedStatus,
}

impl<'a> StatusCapturingResponder<'a> {
    pub fn new(inner: &'a mut dyn ResponseWriter, status: CapturedStatus) -> Self {
        Self { inner, status }
    }

    pub fn status(&self) -> &CapturedStatus {
        &self.status
    }
}

impl ResponseWriter for StatusCapturingResponder<'_> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) {
        self.status.capture(status);
        self.inner.write_status(status);
    }

    fn write_body(&mut self, chunk: &[u8]) {
        self.status.capture(StatusCode::OK);
        self.inner.write_body(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_status_defaults_to_ok() {
        let status = CapturedStatus::default();
        let mut sink = BufferedResponse::new();
        let responder = StatusCapturingResponder::new(&mut sink, status.clone());
        drop(responder);

        assert!(!status.is_set());
        assert_eq!(status.get(), StatusCode::OK);
        assert_eq!(sink.status(), StatusCode::OK);
    }

    #[test]
    fn test_explicit_status_is_captured() {
        let status = CapturedStatus::default();
        let mut sink = BufferedResponse::new();
        {
            let mut responder = StatusCapturingResponder::new(&mut sink, status.clone());
            responder.write_status(StatusCode::NOT_FOUND);
        }

        assert!(status.is_set());
        assert_eq!(status.get(), StatusCode::NOT_FOUND);
        assert_eq!(sink.status(), StatusCode::NOT_FOUND);
        assert!(sink.body().is_empty());
    }

    #[test]
    fn test_first_status_wins() {
        let status = CapturedStatus::default();
        let mut sink = BufferedResponse::new();
        {
            let mut responder = StatusCapturingResponder::new(&mut sink, status.clone());
            responder.write_status(StatusCode::CREATED);
            responder.write_status(StatusCode::INTERNAL_SERVER_ERROR);
        }

        assert_eq!(status.get(), StatusCode::CREATED);
        assert_eq!(sink.status(), StatusCode::CREATED);
    }

    #[test]
    fn test_body_write_commits_ok() {
        let status = CapturedStatus::default();
        let mut sink = BufferedResponse::new();
        {
            let mut responder = StatusCapturingResponder::new(&mut sink, status.clone());
            responder.write_body(b"hello");
            responder.write_status(StatusCode::BAD_REQUEST);
        }

        assert_eq!(status.get(), StatusCode::OK);
        assert_eq!(sink.status(), StatusCode::OK);
    }

    #[test]
    fn test_writes_pass_through_unchanged() {
        let status = CapturedStatus::default();
        let mut sink = BufferedResponse::new();
        {
            let mut responder = StatusCapturingResponder::new(&mut sink, status.clone());
            responder
                .headers_mut()
                .insert("content-type", HeaderValue::from_static("application/json"));
            responder.write_status(StatusCode::ACCEPTED);
            responder.write_body(b"{\"id\":");
            responder.write_body(b"7}");
        }

        assert_eq!(sink.status(), StatusCode::ACCEPTED);
        assert_eq!(sink.headers()["content-type"], "application/json");
        assert_eq!(sink.body(), b"{\"id\":7}");
    }

    #[test]
    fn test_nested_responders_observe_same_status() {
        let outer = CapturedStatus::default();
        let inner = CapturedStatus::default();
        let mut sink = BufferedResponse::new();
        {
            let mut first = StatusCapturingResponder::new(&mut sink, outer.clone());
            let mut second = StatusCapturingResponder::new(&mut first, inner.clone());
            second.write_status(StatusCode::SERVICE_UNAVAILABLE);
        }

        assert_eq!(outer.get(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(inner.get(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_buffered_response_into_response() {
        let mut sink = BufferedResponse::new();
        sink.write_status(StatusCode::IM_A_TEAPOT);
        sink.write_body(b"short and stout");

        let response = sink.into_response();
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"short and stout");
    }

    #[test]
    fn test_captured_status_shared_between_clones() {
        let status = CapturedStatus::default();
        let observer = status.clone();
        assert!(status.capture(StatusCode::NO_CONTENT));
        assert!(!status.capture(StatusCode::OK));
        assert_eq!(observer.get(), StatusCode::NO_CONTENT);
    }
}
