//! Shard receiver
//!
//! ```text
//! Waiting ──code confirmed──▶ Verifying ──persisted──▶ Saved
//!    ▲                           │
//!    │                           └──persist failed──▶ SaveFailed
//!    └──────────── reset ─────────────────────────────────┘
//! ```
//!
//! A disconnect while `Verifying` is reported as an error and the state is
//! left untouched; the caller restarts from `Waiting`.

use sl_core::crypto::{RedistributionWitness, WitnessError, WitnessVerifier};
use sl_core::discovery::ResolvedService;
use sl_core::ports::ShardStoreError;
use sl_core::protocol::EnvelopeError;
use sl_core::{SessionId, Shard, ShardDigest, ShardEvent, ShardMessage, ShardPersistentState};
use sl_network::{ChannelError, EstablishConfig, EstablishError, ShardConnector, TcpReadyChannel};
use tokio::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::deps::AppDeps;

#[derive(Debug, Error)]
pub enum ReceiverError {
    #[error(transparent)]
    Establish(#[from] EstablishError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("host rejected the join: {0}")]
    RejectedByHost(String),

    #[error("channel closed before the shard was saved")]
    Disconnected,

    #[error("shard failed verification: {0}")]
    Verify(#[from] EnvelopeError),

    #[error("shard is for session {got}, expected {expected}")]
    WrongSession { expected: SessionId, got: SessionId },

    #[error("shard is addressed to another device")]
    WrongHolder,

    #[error("unexpected {0} message")]
    UnexpectedMessage(&'static str),

    #[error("saving shard failed: {0}")]
    Persist(#[from] ShardStoreError),

    #[error(transparent)]
    Witness(#[from] WitnessError),

    #[error("receiver is in state {0:?}")]
    InvalidState(ShardPersistentState),
}

pub struct ShardReceiver {
    deps: AppDeps,
    connector: ShardConnector,
    state: Mutex<ShardPersistentState>,
}

impl ShardReceiver {
    pub fn new(deps: AppDeps) -> Self {
        let connector = ShardConnector::new(
            EstablishConfig::from(&deps.settings.network),
            deps.gate.clone(),
            deps.local_device.clone(),
        );
        Self {
            deps,
            connector,
            state: Mutex::new(ShardPersistentState::Waiting),
        }
    }

    pub async fn state(&self) -> ShardPersistentState {
        *self.state.lock().await
    }

    /// Return to `Waiting` after a terminal outcome or a failed attempt.
    pub async fn reset(&self) {
        *self.state.lock().await = ShardPersistentState::Waiting;
    }

    /// Join a distribution host and save the shard it hands out.
    ///
    /// `expected_digest`, when supplied out of band, overrides the digest
    /// carried in the envelope.
    pub async fn join(
        &self,
        service: &ResolvedService,
        expected_digest: Option<ShardDigest>,
    ) -> Result<Shard, ReceiverError> {
        let span = info_span!("receive", instance = %service.instance_name);
        async move {
            {
                let state = *self.state.lock().await;
                if state != ShardPersistentState::Waiting {
                    return Err(ReceiverError::InvalidState(state));
                }
            }
            let expected_session = service.session_id();

            let mut channel = self.connector.connect(&service.socket_addr()).await?;
            self.transition(expected_session.as_ref(), ShardPersistentState::on_code_confirmed)
                .await;

            let result = self
                .receive_and_save(&mut channel, expected_session, expected_digest)
                .await;
            channel.close().await;
            result
        }
        .instrument(span)
        .await
    }

    /// Evaluate a redistribution offer, then join it.
    ///
    /// The witness is checked before any socket is opened; a bad witness
    /// never reaches the network layer.
    pub async fn join_redistribution(
        &self,
        service: &ResolvedService,
        verifier: &mut WitnessVerifier,
        expected_digest: Option<ShardDigest>,
    ) -> Result<Shard, ReceiverError> {
        let version = service
            .version()
            .ok_or_else(|| WitnessError::Malformed("missing version".to_string()))?;
        let witness = RedistributionWitness::from_attributes(&service.attributes, version)?;
        if let Err(err) = verifier.verify(&witness, self.deps.clock.now_ms()) {
            warn!(instance = %service.instance_name, error = %err, "redistribution witness rejected");
            return Err(err.into());
        }
        self.join(service, expected_digest).await
    }

    async fn receive_and_save(
        &self,
        channel: &mut TcpReadyChannel,
        expected_session: Option<SessionId>,
        expected_digest: Option<ShardDigest>,
    ) -> Result<Shard, ReceiverError> {
        let envelope = match channel.recv_message().await? {
            Some(ShardMessage::Shard(envelope)) => envelope,
            Some(ShardMessage::Reject { reason }) => return Err(ReceiverError::RejectedByHost(reason)),
            Some(other) => return Err(ReceiverError::UnexpectedMessage(other.kind())),
            None => {
                warn!("host closed the channel while verifying");
                return Err(ReceiverError::Disconnected);
            }
        };
        let session_id = envelope.session_id.clone();

        if let Err(err) = self.check_envelope(&session_id, &envelope.holder_device_id, expected_session) {
            self.verify_failed(&session_id, &err).await;
            return Err(err);
        }
        let shard = match envelope.open(expected_digest.as_ref()) {
            Ok(shard) => shard,
            Err(err) => {
                let err = ReceiverError::Verify(err);
                self.verify_failed(&session_id, &err).await;
                return Err(err);
            }
        };
        self.deps
            .events
            .publish(ShardEvent::DataVerified {
                session_id: session_id.clone(),
            })
            .await;

        let persisted = self.deps.shard_store.persist_shard(&shard).await;
        let saved = persisted.is_ok();
        self.transition(Some(&session_id), |s| s.on_persisted(saved)).await;

        if let Err(err) = channel
            .send_message(&ShardMessage::Ack {
                session_id: session_id.clone(),
                saved,
            })
            .await
        {
            warn!(error = %err, "ack send failed");
        }

        match persisted {
            Ok(()) => {
                info!(session_id = %session_id, index = shard.index, "shard saved");
                Ok(shard)
            }
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "shard save failed");
                Err(err.into())
            }
        }
    }

    fn check_envelope(
        &self,
        session_id: &SessionId,
        holder: &sl_core::DeviceId,
        expected_session: Option<SessionId>,
    ) -> Result<(), ReceiverError> {
        if let Some(expected) = expected_session {
            if &expected != session_id {
                return Err(ReceiverError::WrongSession {
                    expected,
                    got: session_id.clone(),
                });
            }
        }
        if holder != &self.deps.local_device.device_id {
            return Err(ReceiverError::WrongHolder);
        }
        Ok(())
    }

    async fn verify_failed(&self, session_id: &SessionId, err: &ReceiverError) {
        warn!(session_id = %session_id, error = %err, "shard verification failed");
        self.deps
            .events
            .publish(ShardEvent::DataVerifyFailed {
                session_id: session_id.clone(),
                reason: err.to_string(),
            })
            .await;
    }

    /// Advance the state machine. The change is only published when the
    /// session is known; an advertisement without a `session` attribute
    /// reports nothing until the envelope arrives.
    async fn transition(
        &self,
        session_id: Option<&SessionId>,
        step: impl FnOnce(ShardPersistentState) -> Option<ShardPersistentState>,
    ) {
        let mut state = self.state.lock().await;
        let Some(next) = step(*state) else {
            warn!(from = ?*state, "ignored invalid receiver transition");
            return;
        };
        *state = next;
        drop(state);
        let Some(session_id) = session_id else {
            debug!(state = ?next, "session not yet known, state change not published");
            return;
        };
        self.deps
            .events
            .publish(ShardEvent::ShardStateChanged {
                session_id: session_id.clone(),
                state: next,
            })
            .await;
    }
}
