use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::discovery::{DiscoveryEvent, ResolvedService, ServiceAdvertisement};

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("discovery backend unavailable: {0}")]
    Unavailable(String),

    #[error("advertisement rejected: {0}")]
    Advertise(String),

    #[error("browse failed: {0}")]
    Browse(String),
}

/// Local network service discovery (mDNS in production).
#[async_trait]
pub trait DiscoveryPort: Send + Sync {
    /// Publish an advertisement. Re-advertising the same instance name replaces it.
    async fn advertise(&self, advertisement: ServiceAdvertisement) -> Result<(), DiscoveryError>;

    /// Remove a previously published advertisement. Unknown names are ignored.
    async fn withdraw(&self, instance_name: &str) -> Result<(), DiscoveryError>;

    /// Stream of found/lost notifications for the configured service type.
    async fn browse(&self) -> Result<mpsc::Receiver<DiscoveryEvent>, DiscoveryError>;

    /// Latest resolution of a named instance, if it is still visible.
    async fn resolve(&self, instance_name: &str) -> Result<Option<ResolvedService>, DiscoveryError>;
}
