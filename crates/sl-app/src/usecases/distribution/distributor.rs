//! Shard distributor
//!
//! ```text
//! start ──▶ collecting ──(join / leave / set_threshold)──┐
//!               ▲                                        │
//!               └────────────────────────────────────────┘
//!               │ seal
//!               ▼
//!            sealed ──▶ split, keep index 1, deliver 2..=N, await acks
//! ```
//!
//! The secret is held only until sealing; it is consumed and wiped by the
//! first successful seal.

use chrono::Utc;
use futures::future::join_all;
use sl_core::discovery::{ServiceAdvertisement, ServiceFunction};
use sl_core::distribution::{PairedDevice, SessionError, LOCAL_SHARE_INDEX};
use sl_core::ports::{DiscoveryError, SecretSharingError};
use sl_core::security::SecretBytes;
use sl_core::{
    DeviceId, DistributionSession, SessionId, SessionPhase, Shard, ShardEnvelope, ShardEvent,
    ShardMessage,
};
use sl_network::{ListenerConfig, ListenerError, ShardListener, TcpReadyChannel};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

use super::participant::{run_participant, DeliveryOutcome, ParticipantCommand, ParticipantExit};
use crate::deps::AppDeps;

#[derive(Debug, Error)]
pub enum DistributionError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Sharing(#[from] SecretSharingError),

    #[error("distributor already started")]
    AlreadyStarted,

    #[error("secret already consumed")]
    SecretConsumed,
}

/// Extra knobs for a distributor instance.
#[derive(Debug, Clone)]
pub struct DistributorOptions {
    pub function: ServiceFunction,
    pub extra_attributes: BTreeMap<String, String>,
}

impl Default for DistributorOptions {
    fn default() -> Self {
        Self {
            function: ServiceFunction::Distribution,
            extra_attributes: BTreeMap::new(),
        }
    }
}

/// Outcome of sealing, kept so later seal calls return the same answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealReport {
    pub session_id: SessionId,
    pub version: u64,
    pub threshold: u8,
    pub total: u8,
    pub local_saved: bool,
    pub delivered: Vec<DeviceId>,
    pub failed: Vec<DeviceId>,
}

struct ParticipantHandle {
    commands: mpsc::Sender<ParticipantCommand>,
    task: JoinHandle<()>,
}

struct DistributorState {
    session: DistributionSession,
    secret: Option<SecretBytes>,
    participants: HashMap<DeviceId, ParticipantHandle>,
    report: Option<SealReport>,
    advertised: Option<String>,
    join_pump: Option<JoinHandle<()>>,
}

struct DistributorInner {
    deps: AppDeps,
    options: DistributorOptions,
    listener: ShardListener,
    ack_timeout: Duration,
    state: Mutex<DistributorState>,
    seal_lock: Mutex<()>,
}

#[derive(Clone)]
pub struct ShardDistributor {
    inner: Arc<DistributorInner>,
}

impl ShardDistributor {
    pub fn new(
        deps: AppDeps,
        session_id: SessionId,
        version: u64,
        secret: SecretBytes,
        options: DistributorOptions,
    ) -> Self {
        let settings = deps.settings.clone();
        let listener = ShardListener::new(
            ListenerConfig::from(&settings.network),
            deps.gate.clone(),
            deps.local_device.clone(),
        );
        let session = DistributionSession::new(
            session_id,
            version,
            settings.distribution.default_threshold,
            settings.distribution.max_shares,
        );
        Self {
            inner: Arc::new(DistributorInner {
                deps,
                options,
                listener,
                ack_timeout: settings.distribution.ack_timeout(),
                state: Mutex::new(DistributorState {
                    session,
                    secret: Some(secret),
                    participants: HashMap::new(),
                    report: None,
                    advertised: None,
                    join_pump: None,
                }),
                seal_lock: Mutex::new(()),
            }),
        }
    }

    /// Start accepting joins and advertise the session. Returns the bound port.
    pub async fn start(&self) -> Result<u16, DistributionError> {
        let mut state = self.inner.state.lock().await;
        if state.join_pump.is_some() {
            return Err(DistributionError::AlreadyStarted);
        }

        let (port, ready_rx) = self.inner.listener.start().await?;
        let advertisement = ServiceAdvertisement::new(
            self.inner.options.function,
            &self.inner.deps.local_device,
            state.session.session_id(),
            state.session.version(),
            port,
        )
        .with_attributes(self.inner.options.extra_attributes.clone());
        let instance_name = advertisement.instance_name.clone();

        if let Err(err) = self.inner.deps.discovery.advertise(advertisement).await {
            self.inner.listener.stop().await;
            return Err(err.into());
        }

        let span = info_span!(
            "distribution",
            session_id = %state.session.session_id(),
            version = state.session.version()
        );
        let inner = Arc::downgrade(&self.inner);
        state.join_pump = Some(tokio::spawn(
            DistributorInner::run_join_pump(inner, ready_rx).instrument(span),
        ));
        state.advertised = Some(instance_name.clone());

        info!(instance = %instance_name, port = port, "distribution session open");
        Ok(port)
    }

    pub async fn session_id(&self) -> SessionId {
        self.inner.state.lock().await.session.session_id().clone()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.inner.state.lock().await.session.phase()
    }

    pub async fn threshold(&self) -> (u8, u8) {
        let state = self.inner.state.lock().await;
        (state.session.threshold(), state.session.max_threshold())
    }

    pub async fn participants(&self) -> Vec<PairedDevice> {
        self.inner.state.lock().await.session.participants().to_vec()
    }

    pub async fn set_threshold(&self, threshold: u8) -> Result<(), DistributionError> {
        let mut state = self.inner.state.lock().await;
        state.session.set_threshold(threshold)?;
        self.inner.emit_threshold(&state.session).await;
        Ok(())
    }

    /// Freeze participants, split the secret and deliver every share.
    ///
    /// Sealing again returns the first report without side effects.
    pub async fn seal(&self) -> Result<SealReport, DistributionError> {
        let _serialized = self.inner.seal_lock.lock().await;

        let (plan, secret, deliveries) = {
            let mut state = self.inner.state.lock().await;
            if let Some(report) = &state.report {
                return Ok(report.clone());
            }
            let plan = state.session.seal()?;
            let secret = state.secret.take().ok_or(DistributionError::SecretConsumed)?;
            let deliveries: Vec<(DeviceId, u8, Option<mpsc::Sender<ParticipantCommand>>)> = plan
                .assignments
                .iter()
                .map(|(device_id, index)| {
                    let commands = state
                        .participants
                        .get(device_id)
                        .map(|handle| handle.commands.clone());
                    (device_id.clone(), *index, commands)
                })
                .collect();
            (plan, secret, deliveries)
        };

        self.inner
            .deps
            .events
            .publish(ShardEvent::DistributionSealed {
                session_id: plan.session_id.clone(),
                threshold: plan.threshold,
                total: plan.total,
            })
            .await;

        let mut parts = self
            .inner
            .deps
            .secret_sharing
            .split(secret.expose(), plan.threshold, plan.total)?;
        drop(secret);

        let make_shard = |index: u8, holder: &DeviceId, payload: Vec<u8>| Shard {
            session_id: plan.session_id.clone(),
            version: plan.version,
            index,
            threshold: plan.threshold,
            total: plan.total,
            holder_device_id: holder.clone(),
            payload,
        };

        let mut local_saved = false;
        let mut pending = Vec::new();
        for part in parts.iter_mut() {
            let index = part.index();
            if index == LOCAL_SHARE_INDEX {
                let shard = make_shard(index, &self.inner.deps.local_device.device_id, part.take_data());
                local_saved = match self.inner.deps.shard_store.persist_shard(&shard).await {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(error = %err, "failed to persist distributor's own shard");
                        false
                    }
                };
                continue;
            }
            let Some((device_id, _, commands)) = deliveries.iter().find(|(_, i, _)| *i == index) else {
                continue;
            };
            let shard = make_shard(index, device_id, part.take_data());
            let envelope = ShardEnvelope::from_shard(&shard);
            pending.push(Self::dispatch(device_id.clone(), commands.clone(), envelope));
        }

        let outcomes = join_all(pending).await;
        let mut delivered = Vec::new();
        let mut failed = Vec::new();
        for (device_id, outcome) in outcomes {
            self.inner
                .deps
                .events
                .publish(ShardEvent::ShardDelivered {
                    session_id: plan.session_id.clone(),
                    device_id: device_id.clone(),
                    saved: outcome == DeliveryOutcome::Saved,
                })
                .await;
            match outcome {
                DeliveryOutcome::Saved => delivered.push(device_id),
                DeliveryOutcome::SaveFailed | DeliveryOutcome::NoAck => failed.push(device_id),
            }
        }

        let report = SealReport {
            session_id: plan.session_id.clone(),
            version: plan.version,
            threshold: plan.threshold,
            total: plan.total,
            local_saved,
            delivered,
            failed,
        };
        info!(
            session_id = %report.session_id,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            local_saved = report.local_saved,
            "distribution sealed"
        );
        self.inner.state.lock().await.report = Some(report.clone());
        Ok(report)
    }

    /// Withdraw the advertisement, stop listening and drop every participant.
    pub async fn stop(&self) {
        let (advertised, pump, participants) = {
            let mut state = self.inner.state.lock().await;
            if let Some(mut secret) = state.secret.take() {
                secret.wipe();
            }
            (
                state.advertised.take(),
                state.join_pump.take(),
                std::mem::take(&mut state.participants),
            )
        };

        if let Some(instance) = advertised {
            if let Err(err) = self.inner.deps.discovery.withdraw(&instance).await {
                warn!(instance = %instance, error = %err, "withdraw failed");
            }
        }
        if let Some(pump) = pump {
            pump.abort();
        }
        self.inner.listener.stop().await;
        for (_, handle) in participants {
            handle.task.abort();
        }
    }

    async fn dispatch(
        device_id: DeviceId,
        commands: Option<mpsc::Sender<ParticipantCommand>>,
        envelope: ShardEnvelope,
    ) -> (DeviceId, DeliveryOutcome) {
        let Some(commands) = commands else {
            return (device_id, DeliveryOutcome::NoAck);
        };
        let (reply, outcome) = oneshot::channel();
        if commands
            .send(ParticipantCommand::Deliver { envelope, reply })
            .await
            .is_err()
        {
            return (device_id, DeliveryOutcome::NoAck);
        }
        (device_id, outcome.await.unwrap_or(DeliveryOutcome::NoAck))
    }
}

impl DistributorInner {
    async fn run_join_pump(inner: Weak<Self>, mut ready_rx: mpsc::Receiver<TcpReadyChannel>) {
        while let Some(channel) = ready_rx.recv().await {
            let Some(inner) = inner.upgrade() else {
                debug!("distributor dropped, stopping join pump");
                return;
            };
            inner.on_ready(channel).await;
        }
    }

    async fn on_ready(self: Arc<Self>, mut channel: TcpReadyChannel) {
        let remote = channel.remote().clone();
        let mut state = self.state.lock().await;

        let joined = state.session.join(PairedDevice {
            info: remote.clone(),
            joined_at: Utc::now(),
            approved: true,
        });
        if let Err(err) = joined {
            info!(device_id = %remote.device_id, reason = %err, "join rejected");
            drop(state);
            if let Err(send_err) = channel
                .send_message(&ShardMessage::Reject {
                    reason: err.to_string(),
                })
                .await
            {
                debug!(device_id = %remote.device_id, error = %send_err, "reject send failed");
            }
            channel.close().await;
            return;
        }

        let (commands_tx, commands_rx) = mpsc::channel(1);
        let inner = Arc::downgrade(&self);
        let device_id = remote.device_id.clone();
        let ack_timeout = self.ack_timeout;
        let task = tokio::spawn(async move {
            let exit = run_participant(device_id.clone(), channel, commands_rx, ack_timeout).await;
            if let ParticipantExit::Disconnected = exit {
                if let Some(inner) = inner.upgrade() {
                    inner.on_participant_left(&device_id).await;
                }
            }
        });
        state.participants.insert(
            remote.device_id.clone(),
            ParticipantHandle {
                commands: commands_tx,
                task,
            },
        );

        info!(device_id = %remote.device_id, name = %remote.name, "participant joined");
        self.deps
            .events
            .publish(ShardEvent::ParticipantJoined {
                session_id: state.session.session_id().clone(),
                device: remote,
            })
            .await;
        self.emit_threshold(&state.session).await;
    }

    async fn on_participant_left(&self, device_id: &DeviceId) {
        let mut state = self.state.lock().await;
        if state.session.leave(device_id).is_none() {
            return;
        }
        state.participants.remove(device_id);

        info!(device_id = %device_id, "participant left before seal");
        self.deps
            .events
            .publish(ShardEvent::ParticipantLeft {
                session_id: state.session.session_id().clone(),
                device_id: device_id.clone(),
            })
            .await;
        self.emit_threshold(&state.session).await;
    }

    async fn emit_threshold(&self, session: &DistributionSession) {
        self.deps
            .events
            .publish(ShardEvent::ThresholdChanged {
                session_id: session.session_id().clone(),
                threshold: session.threshold(),
                max: session.max_threshold(),
            })
            .await;
    }
}

impl Drop for DistributorInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(mut secret) = state.secret.take() {
            secret.wipe();
        }
        if let Some(pump) = state.join_pump.take() {
            pump.abort();
        }
        for (_, handle) in state.participants.drain() {
            handle.task.abort();
        }
        let Some(instance) = state.advertised.take() else {
            return;
        };
        // The listener closes with its own drop; the advertisement needs an
        // async withdraw.
        let discovery = self.deps.discovery.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(err) = discovery.withdraw(&instance).await {
                        warn!(instance = %instance, error = %err, "withdraw on drop failed");
                    }
                });
            }
            Err(_) => warn!(instance = %instance, "distributor dropped outside a runtime, advertisement left behind"),
        }
    }
}
