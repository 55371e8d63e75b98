mod common;

use common::{distribute, Node};
use sl_app::{AggregationError, AppDeps, HolderOutcome, ShardAggregator, ShardHolder};
use sl_core::discovery::ServiceFunction;
use sl_core::{SessionId, ShardEvent};
use sl_network::InMemoryDiscoveryHub;
use std::sync::Arc;
use std::time::Duration;

const SECRET: &[u8] = b"wallet seed material";

#[tokio::test]
async fn threshold_holders_rebuild_the_secret() {
    let hub = InMemoryDiscoveryHub::new();
    let host = Node::new(&hub, "host");
    let alice = Node::new(&hub, "alice");
    let bob = Node::new(&hub, "bob");
    let session_id = distribute(&host, &[&alice, &bob], 2, SECRET).await;
    let mut events = host.deps.events.subscribe().await;

    let aggregator = ShardAggregator::new(host.deps.clone());
    let holder = ShardHolder::new(alice.deps.clone());
    let (rebuilt, served) = tokio::join!(aggregator.collect(&session_id), async {
        let service = alice.find(ServiceFunction::Aggregation, &session_id).await;
        holder.serve(&service).await
    });

    let rebuilt = rebuilt.unwrap();
    assert_eq!(rebuilt.secret.expose(), SECRET);
    assert_eq!((rebuilt.version, rebuilt.threshold), (1, 2));
    assert!(matches!(
        served.unwrap(),
        HolderOutcome::Provided { index: 2, .. }
    ));

    let mut progress = Vec::new();
    let mut completed = false;
    while let Ok(event) = events.try_recv() {
        match event {
            ShardEvent::AggregationProgress { collected, required, .. } => {
                progress.push((collected, required))
            }
            ShardEvent::AggregationComplete { .. } => completed = true,
            _ => {}
        }
    }
    assert_eq!(progress, vec![(2, 2)]);
    assert!(completed);
}

#[tokio::test]
async fn one_shard_short_of_threshold_fails_at_the_deadline() {
    let hub = InMemoryDiscoveryHub::new();
    let host = Node::new(&hub, "host");
    let alice = Node::new(&hub, "alice");
    let bob = Node::new(&hub, "bob");
    let session_id = distribute(&host, &[&alice, &bob], 3, SECRET).await;

    let mut settings = common::test_settings();
    settings.aggregation.deadline_ms = 1_500;
    let impatient = AppDeps {
        settings: Arc::new(settings),
        ..host.deps.clone()
    };

    let aggregator = ShardAggregator::new(impatient);
    let holder = ShardHolder::new(alice.deps.clone());
    let (rebuilt, served) = tokio::join!(aggregator.collect(&session_id), async {
        let service = alice.find(ServiceFunction::Aggregation, &session_id).await;
        holder.serve(&service).await
    });

    served.unwrap();
    match rebuilt.unwrap_err() {
        AggregationError::InsufficientShards {
            collected,
            required,
        } => assert_eq!((collected, required), (2, 3)),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn holder_without_the_requested_shard_reports_unavailable() {
    let hub = InMemoryDiscoveryHub::new();
    let host = Node::new(&hub, "host");
    let alice = Node::new(&hub, "alice");
    let stranger = Node::new(&hub, "stranger");
    let session_id = distribute(&host, &[&alice], 2, SECRET).await;

    let aggregator = ShardAggregator::new(host.deps.clone());
    let (rebuilt, outcomes) = tokio::join!(aggregator.collect(&session_id), async {
        let service = stranger.find(ServiceFunction::Aggregation, &session_id).await;
        let missing = ShardHolder::new(stranger.deps.clone()).serve(&service).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let provided = ShardHolder::new(alice.deps.clone()).serve(&service).await;
        (missing, provided)
    });

    assert!(matches!(
        outcomes.0.unwrap(),
        HolderOutcome::Unavailable { .. }
    ));
    assert!(matches!(outcomes.1.unwrap(), HolderOutcome::Provided { .. }));
    assert_eq!(rebuilt.unwrap().secret.expose(), SECRET);
}

#[tokio::test]
async fn aggregating_without_a_local_shard_fails_fast() {
    let hub = InMemoryDiscoveryHub::new();
    let stranger = Node::new(&hub, "stranger");
    let session_id = SessionId::new();

    let err = ShardAggregator::new(stranger.deps.clone())
        .collect(&session_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AggregationError::NoLocalShard(id) if id == session_id));
}
