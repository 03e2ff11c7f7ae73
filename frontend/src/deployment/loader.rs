use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::source::{MetadataError, MetadataSource};
use super::{DeploymentDetails, DeploymentSnapshot, channel};

/// Run the three lookups concurrently and collect whatever succeeded.
///
/// A failed lookup is logged and leaves its field absent; it never affects
/// the other two.
pub async fn load(source: &dyn MetadataSource) -> DeploymentSnapshot {
    let (hostname, cluster_name, zone) =
        tokio::join!(source.hostname(), source.cluster_name(), source.zone());

    let snapshot = DeploymentSnapshot {
        hostname: settle(hostname, "Failed to fetch the hostname for the pod"),
        cluster_name: settle(
            cluster_name,
            "Failed to fetch the name of the cluster in which the pod is running",
        ),
        zone: settle(zone, "Failed to fetch the zone of the node where the pod is scheduled"),
    };

    debug!(
        hostname = snapshot.hostname.as_deref().unwrap_or_default(),
        cluster = snapshot.cluster_name.as_deref().unwrap_or_default(),
        zone = snapshot.zone.as_deref().unwrap_or_default(),
        "Loaded deployment details"
    );

    snapshot
}

fn settle(result: Result<String, MetadataError>, message: &'static str) -> Option<String> {
    match result {
        Ok(value) => Some(value),
        Err(MetadataError::Disabled) => None,
        Err(e) => {
            warn!(error = %e, "{message}");
            None
        }
    }
}

/// Start the loader as a background task.
///
/// The returned details read as empty until the task publishes.
pub fn spawn_loader(source: Arc<dyn MetadataSource>) -> (DeploymentDetails, JoinHandle<()>) {
    let (publisher, details) = channel();
    let handle = tokio::spawn(async move {
        let snapshot = load(source.as_ref()).await;
        publisher.publish(snapshot);
    });
    (details, handle)
}
