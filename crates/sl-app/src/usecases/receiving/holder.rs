use sl_core::discovery::ResolvedService;
use sl_core::ports::ShardStoreError;
use sl_core::{SessionId, ShardEnvelope, ShardMessage};
use sl_network::{ChannelError, EstablishConfig, EstablishError, ShardConnector};
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::deps::AppDeps;

#[derive(Debug, Error)]
pub enum HolderError {
    #[error(transparent)]
    Establish(#[from] EstablishError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Store(#[from] ShardStoreError),

    #[error("unexpected {0} message")]
    UnexpectedMessage(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HolderOutcome {
    Provided { session_id: SessionId, index: u8 },
    Unavailable { reason: String },
}

/// Answers an aggregator's request with the shard this device holds.
pub struct ShardHolder {
    deps: AppDeps,
    connector: ShardConnector,
}

impl ShardHolder {
    pub fn new(deps: AppDeps) -> Self {
        let connector = ShardConnector::new(
            EstablishConfig::from(&deps.settings.network),
            deps.gate.clone(),
            deps.local_device.clone(),
        );
        Self { deps, connector }
    }

    pub async fn serve(&self, aggregator: &ResolvedService) -> Result<HolderOutcome, HolderError> {
        let span = info_span!("hold", instance = %aggregator.instance_name);
        async move {
            let mut channel = self.connector.connect(&aggregator.socket_addr()).await?;

            let (session_id, version) = match channel.expect_message().await? {
                ShardMessage::ShardRequest {
                    session_id,
                    version,
                } => (session_id, version),
                other => {
                    channel.close().await;
                    return Err(HolderError::UnexpectedMessage(other.kind()));
                }
            };

            let outcome = match self.deps.shard_store.load_shard(&session_id).await {
                Ok(Some(shard)) if shard.version == version => {
                    channel
                        .send_message(&ShardMessage::ShardResponse(ShardEnvelope::from_shard(&shard)))
                        .await?;
                    HolderOutcome::Provided {
                        session_id,
                        index: shard.index,
                    }
                }
                Ok(Some(shard)) => HolderOutcome::Unavailable {
                    reason: format!("held version {} does not match {}", shard.version, version),
                },
                Ok(None) => HolderOutcome::Unavailable {
                    reason: format!("no shard for session {session_id}"),
                },
                Err(err) => {
                    warn!(error = %err, "loading shard failed");
                    if let Err(send_err) = channel
                        .send_message(&ShardMessage::ShardUnavailable {
                            reason: "storage error".to_string(),
                        })
                        .await
                    {
                        debug!(error = %send_err, "unavailable reply send failed");
                    }
                    channel.close().await;
                    return Err(err.into());
                }
            };

            if let HolderOutcome::Unavailable { reason } = &outcome {
                channel
                    .send_message(&ShardMessage::ShardUnavailable {
                        reason: reason.clone(),
                    })
                    .await?;
            }
            info!(outcome = ?outcome, "answered shard request");
            channel.close().await;
            Ok(outcome)
        }
        .instrument(span)
        .await
    }
}
