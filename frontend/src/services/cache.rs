//! Traced cache access
//!
//! [`InstrumentedCache`] wraps a [`CacheBackend`] with `cache.get` /
//! `cache.set` client spans and counts hits and misses through
//! [`BusinessMetrics`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use opentelemetry::trace::SpanKind;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::context::RequestContext;
use crate::observability::metrics::BusinessMetrics;
use crate::observability::tracing::{SpanGuard, TracerHandle};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Cache operation failed: {0}")]
    Operation(String),
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Value of the `cache.system` span attribute and the `cache_type` label.
    fn system(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, expiration: Duration) -> Result<(), CacheError>;
}

#[derive(Clone, Debug)]
struct CacheEntry {
    value: Vec<u8>,
    /// `None` when the expiration lies beyond what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-process cache with per-entry expiration.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    fn system(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
                None => return Ok(None),
                Some(_) => {}
            }
        }

        // Expired: drop it so the map does not grow with dead keys
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(CacheEntry::is_expired) {
            entries.remove(key);
            debug!(key, "Removed expired cache entry");
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, expiration: Duration) -> Result<(), CacheError> {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now().checked_add(expiration),
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }
}

pub struct InstrumentedCache<B> {
    backend: B,
    tracer: TracerHandle,
    metrics: BusinessMetrics,
}

impl<B: CacheBackend> InstrumentedCache<B> {
    pub fn new(backend: B, tracer: TracerHandle, metrics: BusinessMetrics) -> Self {
        Self {
            backend,
            tracer,
            metrics,
        }
    }

    pub async fn get(&self, cx: &RequestContext, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let guard = SpanGuard::new(self.tracer.start(
            "cache.get",
            SpanKind::Client,
            vec![
                KeyValue::new("cache.key", key.to_string()),
                KeyValue::new("cache.system", self.backend.system()),
            ],
            cx.otel(),
        ));

        let result = self.backend.get(key).await;
        match &result {
            Ok(Some(_)) => {
                guard.set_attribute(KeyValue::new("cache.hit", true));
                self.metrics.record_cache_hit(self.backend.system());
            }
            Ok(None) => {
                guard.set_attribute(KeyValue::new("cache.hit", false));
                self.metrics.record_cache_miss(self.backend.system());
            }
            Err(e) => guard.fail(e, e.to_string()),
        }
        guard.end();

        result
    }

    pub async fn set(
        &self,
        cx: &RequestContext,
        key: &str,
        value: Vec<u8>,
        expiration: Duration,
    ) -> Result<(), CacheError> {
        let guard = SpanGuard::new(self.tracer.start(
            "cache.set",
            SpanKind::Client,
            vec![
                KeyValue::new("cache.key", key.to_string()),
                KeyValue::new("cache.system", self.backend.system()),
                KeyValue::new(
                    "cache.expiration_ms",
                    i64::try_from(expiration.as_millis()).unwrap_or(i64::MAX),
                ),
            ],
            cx.otel(),
        ));

        let result = self.backend.set(key, value, expiration).await;
        if let Err(e) = &result {
            guard.fail(e, e.to_string());
        }
        guard.end();

        result
    }
}
