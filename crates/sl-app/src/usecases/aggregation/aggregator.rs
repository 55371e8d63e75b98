//! Shard aggregator
//!
//! Loads this device's own shard, advertises an aggregation service and asks
//! every holder that connects for its shard. Reconstruction runs as soon as
//! `threshold` distinct shards of the same session and version are held.

use sl_core::discovery::{ServiceAdvertisement, ServiceFunction};
use sl_core::ports::{DiscoveryError, SecretSharingError, ShardStoreError};
use sl_core::security::SecretBytes;
use sl_core::shard::CollectionError;
use sl_core::{SessionId, Shard, ShardCollection, ShardEvent, ShardMessage};
use sl_network::{
    ChannelError, ListenerConfig, ListenerError, ShardListener, TcpReadyChannel,
};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::deps::AppDeps;

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("this device holds no shard for session {0}")]
    NoLocalShard(SessionId),

    #[error(transparent)]
    Store(#[from] ShardStoreError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("collected {collected} of {required} shards before the deadline")]
    InsufficientShards { collected: usize, required: usize },

    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Sharing(#[from] SecretSharingError),
}

#[derive(Debug, Error)]
enum RequestError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("holder has no shard: {0}")]
    Unavailable(String),

    #[error("unexpected {0} message")]
    UnexpectedMessage(&'static str),

    #[error(transparent)]
    Envelope(#[from] sl_core::protocol::EnvelopeError),
}

/// The rebuilt secret plus the session it came from.
#[derive(Debug)]
pub struct ReconstructedSecret {
    pub session_id: SessionId,
    pub version: u64,
    pub threshold: u8,
    pub secret: SecretBytes,
}

pub struct ShardAggregator {
    deps: AppDeps,
}

impl ShardAggregator {
    pub fn new(deps: AppDeps) -> Self {
        Self { deps }
    }

    /// Collect shards until the threshold is met or the configured aggregation
    /// deadline elapses.
    pub async fn collect(
        &self,
        session_id: &SessionId,
    ) -> Result<ReconstructedSecret, AggregationError> {
        let deadline = self.deps.settings.aggregation.deadline();
        let span = info_span!("aggregation", session_id = %session_id);
        let result = self.collect_inner(session_id, deadline).instrument(span).await;

        let event = match &result {
            Ok(_) => ShardEvent::AggregationComplete {
                session_id: session_id.clone(),
            },
            Err(err) => ShardEvent::AggregationFailed {
                session_id: session_id.clone(),
                reason: err.to_string(),
            },
        };
        self.deps.events.publish(event).await;
        result
    }

    async fn collect_inner(
        &self,
        session_id: &SessionId,
        deadline: Duration,
    ) -> Result<ReconstructedSecret, AggregationError> {
        let own = self
            .deps
            .shard_store
            .load_shard(session_id)
            .await?
            .ok_or_else(|| AggregationError::NoLocalShard(session_id.clone()))?;
        let (version, threshold) = (own.version, own.threshold);

        let mut collection = ShardCollection::new(session_id.clone(), version, threshold);
        collection.offer(own)?;
        if collection.is_complete() {
            return self.reconstruct(&collection);
        }

        let listener = ShardListener::new(
            ListenerConfig::from(&self.deps.settings.network),
            self.deps.gate.clone(),
            self.deps.local_device.clone(),
        );
        let (port, mut ready_rx) = listener.start().await?;
        let advertisement = ServiceAdvertisement::new(
            ServiceFunction::Aggregation,
            &self.deps.local_device,
            session_id,
            version,
            port,
        );
        let instance_name = advertisement.instance_name.clone();
        if let Err(err) = self.deps.discovery.advertise(advertisement).await {
            listener.stop().await;
            return Err(err.into());
        }
        info!(instance = %instance_name, port = port, threshold = threshold, "aggregation open");

        let mut requests: JoinSet<Result<Shard, RequestError>> = JoinSet::new();
        let timer = tokio::time::sleep(deadline);
        tokio::pin!(timer);

        let outcome = loop {
            tokio::select! {
                _ = &mut timer => {
                    let progress = collection.progress();
                    warn!(collected = progress.collected, required = progress.required, "aggregation deadline reached");
                    break Err(AggregationError::InsufficientShards {
                        collected: progress.collected,
                        required: progress.required,
                    });
                }
                Some(channel) = ready_rx.recv() => {
                    let session_id = session_id.clone();
                    requests.spawn(request_shard(channel, session_id, version));
                }
                Some(joined) = requests.join_next(), if !requests.is_empty() => {
                    let shard = match joined {
                        Ok(Ok(shard)) => shard,
                        Ok(Err(err)) => {
                            debug!(error = %err, "holder did not provide a shard");
                            continue;
                        }
                        Err(err) => {
                            warn!(error = %err, "shard request task failed");
                            continue;
                        }
                    };
                    match collection.offer(shard) {
                        Ok(progress) => {
                            self.deps
                                .events
                                .publish(ShardEvent::AggregationProgress {
                                    session_id: session_id.clone(),
                                    collected: progress.collected,
                                    required: progress.required,
                                })
                                .await;
                            if progress.is_complete() {
                                break self.reconstruct(&collection);
                            }
                        }
                        Err(err) => warn!(error = %err, "shard refused"),
                    }
                }
            }
        };

        requests.abort_all();
        if let Err(err) = self.deps.discovery.withdraw(&instance_name).await {
            warn!(instance = %instance_name, error = %err, "withdraw failed");
        }
        listener.stop().await;
        outcome
    }

    fn reconstruct(&self, collection: &ShardCollection) -> Result<ReconstructedSecret, AggregationError> {
        let parts = collection.share_parts()?;
        let secret = self.deps.secret_sharing.reconstruct(&parts)?;
        info!(session_id = %collection.session_id(), "secret reconstructed");
        Ok(ReconstructedSecret {
            session_id: collection.session_id().clone(),
            version: collection.version(),
            threshold: collection.threshold(),
            secret,
        })
    }
}

async fn request_shard(
    mut channel: TcpReadyChannel,
    session_id: SessionId,
    version: u64,
) -> Result<Shard, RequestError> {
    let result = async {
        channel
            .send_message(&ShardMessage::ShardRequest {
                session_id,
                version,
            })
            .await?;
        match channel.expect_message().await? {
            ShardMessage::ShardResponse(envelope) => Ok(envelope.open(None)?),
            ShardMessage::ShardUnavailable { reason } => Err(RequestError::Unavailable(reason)),
            other => Err(RequestError::UnexpectedMessage(other.kind())),
        }
    }
    .await;
    channel.close().await;
    result
}
