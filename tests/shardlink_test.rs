use async_trait::async_trait;
use shardlink::bootstrap::ExternalPorts;
use shardlink::core::crypto::WalletSigningKey;
use shardlink::core::discovery::ServiceFunction;
use shardlink::core::ports::{AuthError, AuthenticatorPort, OperatorDecision, OperatorPort};
use shardlink::core::security::SecretBytes;
use shardlink::core::{ConnectionId, DeviceId, PairingCode, SecretString, Settings, ShardEvent};
use shardlink::network::InMemoryDiscoveryHub;
use shardlink::ShardLink;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Approve;

#[async_trait]
impl OperatorPort for Approve {
    async fn confirm_pairing_code(&self, _: &ConnectionId, _: &PairingCode) -> OperatorDecision {
        OperatorDecision::Approved
    }
}

struct NoWallet;

#[async_trait]
impl AuthenticatorPort for NoWallet {
    async fn request_signing_key(&self, _: &SecretString) -> Result<WalletSigningKey, AuthError> {
        Err(AuthError::Unavailable("no wallet in tests".to_string()))
    }
}

fn link(hub: &InMemoryDiscoveryHub, name: &str) -> (ShardLink, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.device.device_id = Some(DeviceId::from(name));
    settings.device.name = name.to_string();
    settings.network.bind_host = "127.0.0.1".to_string();
    settings.storage.shard_dir = Some(dir.path().to_path_buf());

    let ports = ExternalPorts {
        operator: Arc::new(Approve),
        authenticator: Arc::new(NoWallet),
        discovery: Some(Arc::new(hub.handle("127.0.0.1"))),
    };
    (ShardLink::new(settings, ports).unwrap(), dir)
}

#[tokio::test]
async fn wired_devices_distribute_and_aggregate() {
    let hub = InMemoryDiscoveryHub::new();
    let (host, _host_dir) = link(&hub, "host");
    let (peer, _peer_dir) = link(&hub, "peer");
    let mut peer_events = peer.subscribe().await;

    let distributor = host
        .distribute(SecretBytes::new(b"seed".to_vec()))
        .await
        .unwrap();
    let session_id = distributor.session_id().await;

    let service = peer
        .find(ServiceFunction::Distribution, Some(session_id.clone()), Duration::from_secs(5))
        .await
        .unwrap();
    let (received, report) = tokio::join!(peer.receive(&service, None), async {
        while distributor.participants().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        distributor.seal().await
    });
    assert_eq!(report.unwrap().total, 2);
    assert_eq!(received.unwrap().index, 2);
    distributor.stop().await;

    // The operator gate announced a pairing code on the joining side.
    let mut saw_code = false;
    while let Ok(event) = peer_events.try_recv() {
        saw_code |= matches!(event, ShardEvent::PairingCodeReady { .. });
    }
    assert!(saw_code);

    let (rebuilt, provided) = tokio::join!(host.aggregate(&session_id), async {
        let service = peer
            .find(ServiceFunction::Aggregation, Some(session_id.clone()), Duration::from_secs(5))
            .await
            .unwrap();
        peer.provide(&service).await
    });
    provided.unwrap();
    assert_eq!(rebuilt.unwrap().secret.expose(), b"seed");
}

#[tokio::test]
async fn redistribution_needs_an_unlocked_wallet() {
    let hub = InMemoryDiscoveryHub::new();
    let (host, _dir) = link(&hub, "host");

    let Err(err) = host
        .redistribute(&"missing".into(), &SecretString::new("1234".to_string()))
        .await
    else {
        panic!("redistribution started without a wallet key");
    };
    assert!(err.to_string().contains("no wallet in tests"));
}
