use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::MetadataConfig;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("metadata service unreachable: {0}")]
    Unavailable(#[from] reqwest::Error),

    #[error("metadata service returned status {0}")]
    Status(u16),

    #[error("failed to read hostname: {0}")]
    Io(#[from] std::io::Error),

    #[error("lookup returned an empty value")]
    Empty,

    #[error("metadata lookups are disabled")]
    Disabled,
}

/// Where deployment facts come from.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn hostname(&self) -> Result<String, MetadataError>;

    async fn cluster_name(&self) -> Result<String, MetadataError>;

    async fn zone(&self) -> Result<String, MetadataError>;
}

const HOSTNAME_FILES: [&str; 2] = ["/proc/sys/kernel/hostname", "/etc/hostname"];

/// Hostname of the local machine (the pod name under Kubernetes).
pub async fn local_hostname() -> Result<String, MetadataError> {
    let mut last_error = None;
    for path in HOSTNAME_FILES {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => return non_empty(contents),
            Err(e) => last_error = Some(e),
        }
    }

    if let Ok(hostname) = std::env::var("HOSTNAME") {
        return non_empty(hostname);
    }

    Err(last_error.map_or(MetadataError::Empty, MetadataError::Io))
}

fn non_empty(value: String) -> Result<String, MetadataError> {
    let value = value.trim();
    if value.is_empty() {
        Err(MetadataError::Empty)
    } else {
        Ok(value.to_string())
    }
}

/// Last path segment of a `projects/<n>/zones/<zone>` value.
pub fn zone_from_path(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// GCE-style instance metadata server.
pub struct GceMetadataSource {
    client: reqwest::Client,
    base_url: String,
}

impl GceMetadataSource {
    pub fn new(config: &MetadataConfig) -> Result<Self, MetadataError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        let base_url = if config.host.starts_with("http://") || config.host.starts_with("https://") {
            config.host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", config.host.trim_end_matches('/'))
        };

        Ok(Self { client, base_url })
    }

    async fn fetch(&self, suffix: &str) -> Result<String, MetadataError> {
        let response = self
            .client
            .get(format!("{}/computeMetadata/v1/{suffix}", self.base_url))
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::Status(status.as_u16()));
        }

        non_empty(response.text().await?)
    }
}

#[async_trait]
impl MetadataSource for GceMetadataSource {
    async fn hostname(&self) -> Result<String, MetadataError> {
        local_hostname().await
    }

    async fn cluster_name(&self) -> Result<String, MetadataError> {
        self.fetch("instance/attributes/cluster-name").await
    }

    async fn zone(&self) -> Result<String, MetadataError> {
        let zone = self.fetch("instance/zone").await?;
        non_empty(zone_from_path(&zone).to_string())
    }
}

/// Hostname only, for deployments without a metadata service.
pub struct LocalOnlySource;

#[async_trait]
impl MetadataSource for LocalOnlySource {
    async fn hostname(&self) -> Result<String, MetadataError> {
        local_hostname().await
    }

    async fn cluster_name(&self) -> Result<String, MetadataError> {
        Err(MetadataError::Disabled)
    }

    async fn zone(&self) -> Result<String, MetadataError> {
        Err(MetadataError::Disabled)
    }
}
