//! One task per joined participant.
//!
//! Before sealing the task only watches for disconnects; at seal it receives
//! exactly one delivery command, sends the shard, waits for the ack and
//! closes the channel.

use sl_core::{DeviceId, ShardEnvelope, ShardMessage};
use sl_network::TcpReadyChannel;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Saved,
    SaveFailed,
    /// Channel died or no ack arrived in time.
    NoAck,
}

pub(crate) enum ParticipantCommand {
    Deliver {
        envelope: ShardEnvelope,
        reply: oneshot::Sender<DeliveryOutcome>,
    },
}

pub(crate) enum ParticipantExit {
    /// Channel closed before any delivery; the participant should be dropped.
    Disconnected,
    Finished,
}

pub(crate) async fn run_participant(
    device_id: DeviceId,
    mut channel: TcpReadyChannel,
    mut commands: mpsc::Receiver<ParticipantCommand>,
    ack_timeout: Duration,
) -> ParticipantExit {
    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(ParticipantCommand::Deliver { envelope, reply }) => {
                        let outcome = deliver(&mut channel, envelope, ack_timeout).await;
                        debug!(device_id = %device_id, outcome = ?outcome, "shard delivery finished");
                        let _ = reply.send(outcome);
                        channel.close().await;
                        return ParticipantExit::Finished;
                    }
                    None => {
                        channel.close().await;
                        return ParticipantExit::Finished;
                    }
                }
            }
            incoming = channel.recv_message() => {
                match incoming {
                    Ok(Some(message)) => {
                        debug!(device_id = %device_id, kind = message.kind(), "ignoring message before seal");
                    }
                    Ok(None) => {
                        debug!(device_id = %device_id, "participant closed channel before seal");
                        return ParticipantExit::Disconnected;
                    }
                    Err(err) => {
                        warn!(device_id = %device_id, error = %err, "participant channel failed before seal");
                        return ParticipantExit::Disconnected;
                    }
                }
            }
        }
    }
}

async fn deliver(
    channel: &mut TcpReadyChannel,
    envelope: ShardEnvelope,
    ack_timeout: Duration,
) -> DeliveryOutcome {
    let session_id = envelope.session_id.clone();
    if let Err(err) = channel.send_message(&ShardMessage::Shard(envelope)).await {
        warn!(error = %err, "shard send failed");
        return DeliveryOutcome::NoAck;
    }

    let wait_ack = async {
        loop {
            match channel.recv_message().await {
                Ok(Some(ShardMessage::Ack {
                    session_id: acked,
                    saved,
                })) if acked == session_id => {
                    return if saved {
                        DeliveryOutcome::Saved
                    } else {
                        DeliveryOutcome::SaveFailed
                    };
                }
                Ok(Some(other)) => {
                    debug!(kind = other.kind(), "ignoring message while awaiting ack");
                }
                Ok(None) | Err(_) => return DeliveryOutcome::NoAck,
            }
        }
    };

    tokio::time::timeout(ack_timeout, wait_ack)
        .await
        .unwrap_or(DeliveryOutcome::NoAck)
}
