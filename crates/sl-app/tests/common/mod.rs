#![allow(dead_code)]

use async_trait::async_trait;
use mockall::mock;
use sl_app::{AppDeps, DistributorOptions, EventHub, ShardDistributor, ShardReceiver};
use sl_core::crypto::WalletSigningKey;
use sl_core::discovery::{ResolvedService, ServiceFunction};
use sl_core::ports::{AuthError, AuthenticatorPort, OperatorDecision};
use sl_core::security::SecretBytes;
use sl_core::{
    ConnectionId, DeviceId, PairingCode, Platform, RemoteDeviceInfo, SecretString, SessionId,
    Settings,
};
use sl_infra::{FileShardStore, ShamirSecretSharing, SystemClock};
use sl_network::{ConnectionGate, InMemoryDiscoveryHub};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

mock! {
    pub Authenticator {}

    #[async_trait]
    impl AuthenticatorPort for Authenticator {
        async fn request_signing_key(&self, pin: &SecretString) -> Result<WalletSigningKey, AuthError>;
    }
}

/// Approves every pairing code without operator interaction.
pub struct ApproveAll;

#[async_trait]
impl ConnectionGate for ApproveAll {
    async fn admit(&self, _: &ConnectionId, _: &PairingCode) -> OperatorDecision {
        OperatorDecision::Approved
    }
}

pub const WAIT: Duration = Duration::from_secs(5);

pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.network.bind_host = "127.0.0.1".to_string();
    settings.network.handshake_timeout_ms = 5_000;
    settings.network.greeting_timeout_ms = 5_000;
    settings.network.operator_timeout_ms = 5_000;
    settings.distribution.ack_timeout_ms = 5_000;
    settings.aggregation.deadline_ms = 5_000;
    settings
}

/// One simulated device: its own shard directory, sharing the discovery hub.
pub struct Node {
    pub deps: AppDeps,
    _dir: TempDir,
}

impl Node {
    pub fn new(hub: &InMemoryDiscoveryHub, name: &str) -> Self {
        Self::with(hub, name, test_settings(), MockAuthenticator::new())
    }

    pub fn with(
        hub: &InMemoryDiscoveryHub,
        name: &str,
        settings: Settings,
        authenticator: MockAuthenticator,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let deps = AppDeps {
            local_device: RemoteDeviceInfo {
                device_id: DeviceId::from(name),
                name: name.to_string(),
                platform: Platform::Linux,
                model: "test".to_string(),
                app_version: "0.1.0".to_string(),
            },
            settings: Arc::new(settings),
            discovery: Arc::new(hub.handle("127.0.0.1")),
            gate: Arc::new(ApproveAll),
            shard_store: Arc::new(FileShardStore::new(dir.path().to_path_buf())),
            secret_sharing: Arc::new(ShamirSecretSharing::new()),
            authenticator: Arc::new(authenticator),
            clock: Arc::new(SystemClock),
            events: Arc::new(EventHub::new()),
        };
        Self { deps, _dir: dir }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.deps.local_device.device_id
    }

    pub async fn find(&self, function: ServiceFunction, session_id: &SessionId) -> ResolvedService {
        let query = sl_app::ServiceQuery::new(function)
            .session(session_id.clone())
            .excluding(self.device_id().clone());
        sl_app::find_service(self.deps.discovery.as_ref(), &query, WAIT)
            .await
            .unwrap()
    }
}

/// Poll `check` until it holds or `WAIT` elapses.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(WAIT, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

pub async fn wait_for_participants(distributor: &ShardDistributor, count: usize) {
    eventually(move || async move { distributor.participants().await.len() == count }).await;
}

/// Run a full first distribution of `secret` from `host` to `holders`.
pub async fn distribute(host: &Node, holders: &[&Node], threshold: u8, secret: &[u8]) -> SessionId {
    let session_id = SessionId::new();
    let distributor = ShardDistributor::new(
        host.deps.clone(),
        session_id.clone(),
        1,
        SecretBytes::new(secret.to_vec()),
        DistributorOptions::default(),
    );
    distributor.start().await.unwrap();

    let mut joins = Vec::new();
    for node in holders {
        let service = node.find(ServiceFunction::Distribution, &session_id).await;
        let receiver = ShardReceiver::new(node.deps.clone());
        joins.push(tokio::spawn(async move { receiver.join(&service, None).await }));
    }
    wait_for_participants(&distributor, holders.len()).await;
    distributor.set_threshold(threshold).await.unwrap();
    let report = distributor.seal().await.unwrap();
    assert_eq!(report.delivered.len(), holders.len());
    for join in joins {
        join.await.unwrap().unwrap();
    }
    distributor.stop().await;
    session_id
}
