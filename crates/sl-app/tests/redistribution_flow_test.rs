mod common;

use common::{distribute, test_settings, wait_for_participants, MockAuthenticator, Node, WAIT};
use rand::rngs::OsRng;
use sl_app::{
    find_service, RedistributionController, RedistributionError, ReceiverError, ServiceQuery,
    ShardHolder, ShardReceiver,
};
use sl_core::crypto::{WalletSigningKey, WitnessError, WitnessVerifier};
use sl_core::discovery::{ResolvedService, ServiceFunction};
use sl_core::ports::AuthError;
use sl_core::{SecretString, ShardPersistentState};
use sl_network::InMemoryDiscoveryHub;

const SECRET: &[u8] = b"wallet seed material";
const PIN: &str = "1234";

fn authenticator_for(key: &WalletSigningKey) -> MockAuthenticator {
    let key = key.clone();
    let mut authenticator = MockAuthenticator::new();
    authenticator
        .expect_request_signing_key()
        .returning(move |pin| {
            if pin.expose() == PIN {
                Ok(key.clone())
            } else {
                Err(AuthError::WrongPin)
            }
        });
    authenticator
}

async fn find_offer(node: &Node) -> ResolvedService {
    let query = ServiceQuery::new(ServiceFunction::Redistribution).excluding(node.device_id().clone());
    find_service(node.deps.discovery.as_ref(), &query, WAIT)
        .await
        .unwrap()
}

fn verifier(node: &Node, key: &WalletSigningKey, held_version: u64) -> WitnessVerifier {
    let settings = &node.deps.settings.redistribution;
    WitnessVerifier::new(
        key.verifying_key().clone(),
        settings.witness_freshness_ms,
        settings.max_clock_skew_ms,
    )
    .with_held_version(held_version)
}

#[tokio::test]
async fn redistribution_rebuilds_and_hands_out_a_newer_version() {
    let hub = InMemoryDiscoveryHub::new();
    let wallet_key = WalletSigningKey::random(&mut OsRng);
    let host = Node::with(&hub, "host", test_settings(), authenticator_for(&wallet_key));
    let alice = Node::new(&hub, "alice");
    let bob = Node::new(&hub, "bob");
    let session_id = distribute(&host, &[&alice, &bob], 2, SECRET).await;

    let controller = RedistributionController::new(host.deps.clone());
    let holder = ShardHolder::new(alice.deps.clone());
    let pin = SecretString::new(PIN.to_string());
    let (distributor, served) = tokio::join!(
        controller.redistribute(&session_id, &pin),
        async {
            let service = alice.find(ServiceFunction::Aggregation, &session_id).await;
            holder.serve(&service).await
        }
    );
    served.unwrap();
    let distributor = distributor.unwrap();
    let new_session = distributor.session_id().await;
    assert_ne!(new_session, session_id);

    let offer = find_offer(&bob).await;
    assert_eq!(offer.version(), Some(2));
    assert_eq!(offer.session_id(), Some(new_session.clone()));

    let receiver = ShardReceiver::new(bob.deps.clone());
    let mut bob_verifier = verifier(&bob, &wallet_key, 1);
    let (joined, report) = tokio::join!(
        receiver.join_redistribution(&offer, &mut bob_verifier, None),
        async {
            wait_for_participants(&distributor, 1).await;
            distributor.seal().await
        }
    );

    let report = report.unwrap();
    assert_eq!(report.version, 2);
    let shard = joined.unwrap();
    assert_eq!((shard.session_id.clone(), shard.version), (new_session.clone(), 2));
    assert_eq!(receiver.state().await, ShardPersistentState::Saved);

    let host_shard = host
        .deps
        .shard_store
        .load_shard(&new_session)
        .await
        .unwrap()
        .unwrap();
    assert_eq!((host_shard.index, host_shard.version), (1, 2));
    distributor.stop().await;
}

#[tokio::test]
async fn offer_signed_by_an_unknown_key_is_refused_before_connecting() {
    let hub = InMemoryDiscoveryHub::new();
    let wallet_key = WalletSigningKey::random(&mut OsRng);
    let host = Node::with(&hub, "host", test_settings(), authenticator_for(&wallet_key));
    let alice = Node::new(&hub, "alice");
    let bob = Node::new(&hub, "bob");
    let session_id = distribute(&host, &[&alice, &bob], 2, SECRET).await;

    let controller = RedistributionController::new(host.deps.clone());
    let holder = ShardHolder::new(alice.deps.clone());
    let pin = SecretString::new(PIN.to_string());
    let (distributor, served) = tokio::join!(
        controller.redistribute(&session_id, &pin),
        async {
            let service = alice.find(ServiceFunction::Aggregation, &session_id).await;
            holder.serve(&service).await
        }
    );
    served.unwrap();
    let distributor = distributor.unwrap();

    let offer = find_offer(&bob).await;
    let receiver = ShardReceiver::new(bob.deps.clone());
    let impostor = WalletSigningKey::random(&mut OsRng);
    let mut wrong_trust = verifier(&bob, &impostor, 1);

    let err = receiver
        .join_redistribution(&offer, &mut wrong_trust, None)
        .await
        .unwrap_err();
    assert!(
        matches!(err, ReceiverError::Witness(WitnessError::BadSignature)),
        "got {err:?}"
    );
    assert_eq!(receiver.state().await, ShardPersistentState::Waiting);
    assert!(distributor.participants().await.is_empty());

    // Already holding version 2 makes the same offer not newer.
    let mut current = verifier(&bob, &wallet_key, 2);
    let err = receiver
        .join_redistribution(&offer, &mut current, None)
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            ReceiverError::Witness(WitnessError::VersionNotNewer { offered: 2, held: 2 })
        ),
        "got {err:?}"
    );
    distributor.stop().await;
}

#[tokio::test]
async fn wrong_pin_stops_before_aggregation() {
    let hub = InMemoryDiscoveryHub::new();
    let wallet_key = WalletSigningKey::random(&mut OsRng);
    let host = Node::with(&hub, "host", test_settings(), authenticator_for(&wallet_key));
    let alice = Node::new(&hub, "alice");
    let session_id = distribute(&host, &[&alice], 2, SECRET).await;

    let Err(err) = RedistributionController::new(host.deps.clone())
        .redistribute(&session_id, &SecretString::new("0000".to_string()))
        .await
    else {
        panic!("redistribution started with a wrong pin");
    };
    assert!(matches!(err, RedistributionError::Auth(AuthError::WrongPin)));

    let query = ServiceQuery::new(ServiceFunction::Aggregation).session(session_id);
    let lookup = find_service(
        alice.deps.discovery.as_ref(),
        &query,
        std::time::Duration::from_millis(200),
    )
    .await;
    assert!(lookup.is_err());
}
