//! Deployment metadata
//!
//! Facts about where the process runs (hostname, cluster, zone) are
//! discovered once by a background loader. Until it finishes, readers see an
//! empty snapshot; nothing ever blocks waiting for it except callers that
//! explicitly ask to via [`DeploymentDetails::wait_loaded`].

pub mod loader;
pub mod source;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

pub use loader::{load, spawn_loader};
pub use source::{GceMetadataSource, LocalOnlySource, MetadataError, MetadataSource};

pub const HOSTNAME_KEY: &str = "HOSTNAME";
pub const CLUSTER_NAME_KEY: &str = "CLUSTERNAME";
pub const ZONE_KEY: &str = "ZONE";

/// Result of one load. Each field is absent when its lookup failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeploymentSnapshot {
    pub hostname: Option<String>,
    pub cluster_name: Option<String>,
    pub zone: Option<String>,
}

impl DeploymentSnapshot {
    /// Lookup by the `HOSTNAME` / `CLUSTERNAME` / `ZONE` keys.
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            HOSTNAME_KEY => self.hostname.as_deref(),
            CLUSTER_NAME_KEY => self.cluster_name.as_deref(),
            ZONE_KEY => self.zone.as_deref(),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hostname.is_none() && self.cluster_name.is_none() && self.zone.is_none()
    }
}

/// Read side of the deployment details, cheap to clone.
#[derive(Clone, Debug)]
pub struct DeploymentDetails {
    rx: watch::Receiver<Option<Arc<DeploymentSnapshot>>>,
}

/// Write side; consumed by its single publish.
#[derive(Debug)]
pub struct DeploymentPublisher {
    tx: watch::Sender<Option<Arc<DeploymentSnapshot>>>,
}

/// Create an unloaded pair.
pub fn channel() -> (DeploymentPublisher, DeploymentDetails) {
    let (tx, rx) = watch::channel(None);
    (DeploymentPublisher { tx }, DeploymentDetails { rx })
}

impl DeploymentPublisher {
    pub fn publish(self, snapshot: DeploymentSnapshot) {
        self.tx.send_replace(Some(Arc::new(snapshot)));
    }
}

impl DeploymentDetails {
    /// Details that are already loaded with `snapshot`.
    pub fn fixed(snapshot: DeploymentSnapshot) -> Self {
        let (publisher, details) = channel();
        publisher.publish(snapshot);
        details
    }

    /// Current snapshot; empty if the loader has not finished.
    pub fn current(&self) -> Arc<DeploymentSnapshot> {
        (*self.rx.borrow()).clone().unwrap_or_default()
    }

    pub fn is_loaded(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Wait up to `timeout` for the loader.
    ///
    /// Returns `None` on timeout or if the loader went away without publishing.
    pub async fn wait_loaded(&self, timeout: Duration) -> Option<Arc<DeploymentSnapshot>> {
        let mut rx = self.rx.clone();
        match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
            Ok(Ok(snapshot)) => (*snapshot).clone(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> DeploymentSnapshot {
        DeploymentSnapshot {
            hostname: Some("frontend-7d9f".to_string()),
            cluster_name: None,
            zone: Some("us-central1-a".to_string()),
        }
    }

    #[test]
    fn test_reads_before_load_are_absent() {
        let (_publisher, details) = channel();
        assert!(!details.is_loaded());

        let current = details.current();
        assert!(current.is_empty());
        assert_eq!(current.get(HOSTNAME_KEY), None);
    }

    #[test]
    fn test_reads_after_publish() {
        let (publisher, details) = channel();
        publisher.publish(snapshot());

        assert!(details.is_loaded());
        let current = details.current();
        assert_eq!(current.get(HOSTNAME_KEY), Some("frontend-7d9f"));
        assert_eq!(current.get(CLUSTER_NAME_KEY), None);
        assert_eq!(current.get(ZONE_KEY), Some("us-central1-a"));
        assert_eq!(current.get("REGION"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_loaded_times_out_without_publish() {
        let (_publisher, details) = channel();
        assert!(details.wait_loaded(Duration::from_secs(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_wait_loaded_after_publisher_dropped() {
        let (publisher, details) = channel();
        drop(publisher);
        assert!(details.wait_loaded(Duration::from_millis(50)).await.is_none());
    }

    #[tokio::test]
    async fn test_wait_loaded_sees_publish() {
        let (publisher, details) = channel();
        let waiter = details.clone();
        let handle = tokio::spawn(async move { waiter.wait_loaded(Duration::from_secs(5)).await });

        publisher.publish(snapshot());

        let loaded = handle.await.unwrap().unwrap();
        assert_eq!(*loaded, snapshot());
    }

    #[test]
    fn test_fixed_details_are_loaded() {
        let details = DeploymentDetails::fixed(snapshot());
        assert!(details.is_loaded());
        assert_eq!(*details.current(), snapshot());
    }
}
