//! # Dependency Injection / 依赖注入模块
//!
//! The only place that depends on `sl-infra`, `sl-network` and `sl-app` at
//! once. It assembles, it does not decide: settings are taken as loaded.

use std::path::PathBuf;
use std::sync::Arc;

use sl_app::{AppDeps, EventHub};
use sl_core::ports::{AuthenticatorPort, DiscoveryError, DiscoveryPort, OperatorPort};
use sl_core::{DeviceId, Settings};
use sl_infra::{FileShardStore, ShamirSecretSharing, SystemClock};
use sl_network::{MdnsDiscovery, OperatorGate};
use tracing::{info, warn};

pub type WiringResult<T> = Result<T, WiringError>;

/// Errors during dependency assembly
/// 依赖组装错误
#[derive(Debug, thiserror::Error)]
pub enum WiringError {
    #[error("Discovery initialization failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("No shard directory configured and no platform data directory available")]
    NoShardDir,
}

/// Collaborators supplied by the embedding application.
/// 宿主应用提供的外部协作者
#[derive(Clone)]
pub struct ExternalPorts {
    /// Shows pairing codes to the operator and returns their verdict.
    pub operator: Arc<dyn OperatorPort>,
    /// Unlocks the wallet signing key for redistribution.
    pub authenticator: Arc<dyn AuthenticatorPort>,
    /// Discovery backend; mDNS on `network.service_type` when `None`.
    pub discovery: Option<Arc<dyn DiscoveryPort>>,
}

/// Build [`AppDeps`] from settings and the host's collaborators.
pub fn wire_dependencies(settings: Settings, ports: ExternalPorts) -> WiringResult<AppDeps> {
    let settings = Arc::new(settings);

    // Step 1: identity / 步骤 1：本机身份
    let device_id = match &settings.device.device_id {
        Some(id) => id.clone(),
        None => {
            let generated = DeviceId::new();
            warn!(device_id = %generated, "no device_id configured, using a fresh one for this run");
            generated
        }
    };
    let local_device = settings.local_device_info(device_id, env!("CARGO_PKG_VERSION"));

    // Step 2: network / 步骤 2：网络
    let discovery: Arc<dyn DiscoveryPort> = match ports.discovery {
        Some(discovery) => discovery,
        None => Arc::new(MdnsDiscovery::new(settings.network.service_type.clone())?),
    };
    let events = Arc::new(EventHub::new());
    let gate = Arc::new(OperatorGate::new(
        ports.operator,
        events.clone(),
        settings.network.operator_timeout(),
    ));

    // Step 3: storage and crypto / 步骤 3：存储与密码学
    let shard_dir = resolve_shard_dir(&settings)?;
    info!(shard_dir = %shard_dir.display(), device_id = %local_device.device_id, "dependencies wired");

    Ok(AppDeps {
        local_device,
        settings,
        discovery,
        gate,
        shard_store: Arc::new(FileShardStore::new(shard_dir)),
        secret_sharing: Arc::new(ShamirSecretSharing::new()),
        authenticator: ports.authenticator,
        clock: Arc::new(SystemClock),
        events,
    })
}

fn resolve_shard_dir(settings: &Settings) -> WiringResult<PathBuf> {
    match &settings.storage.shard_dir {
        Some(dir) if !dir.as_os_str().is_empty() => Ok(dir.clone()),
        _ => dirs::data_dir()
            .map(|dir| dir.join("shardlink").join("shards"))
            .ok_or(WiringError::NoShardDir),
    }
}
