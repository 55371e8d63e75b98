use sl_core::settings::NetworkSettings;
use sl_core::{ConnectionId, RemoteDeviceInfo};
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, info_span, warn, Instrument};

use crate::channel::{HandshakeRole, ReadyChannel};
use crate::framing::FramedStream;
use crate::gate::ConnectionGate;
use crate::greeting::{exchange_identity, GreetingError};
use crate::handshake::{perform_handshake, HandshakeError};

#[derive(Debug, Error)]
pub enum EstablishError {
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Greeting(#[from] GreetingError),

    #[error("pairing code rejected by operator")]
    Rejected,

    #[error("{stage} timed out")]
    Timeout { stage: &'static str },
}

#[derive(Debug, Clone)]
pub struct EstablishConfig {
    pub max_frame_bytes: usize,
    pub handshake_timeout: Duration,
    pub greeting_timeout: Duration,
    pub operator_timeout: Duration,
}

impl EstablishConfig {
    /// How long to wait for the peer's descriptor once ours is sent. The
    /// peer may still be waiting on its own operator at that point.
    pub fn greeting_deadline(&self) -> Duration {
        self.operator_timeout + self.greeting_timeout
    }
}

impl From<&NetworkSettings> for EstablishConfig {
    fn from(settings: &NetworkSettings) -> Self {
        Self {
            max_frame_bytes: settings.max_frame_bytes,
            handshake_timeout: settings.handshake_timeout(),
            greeting_timeout: settings.greeting_timeout(),
            operator_timeout: settings.operator_timeout(),
        }
    }
}

impl Default for EstablishConfig {
    fn default() -> Self {
        Self::from(&NetworkSettings::default())
    }
}

/// Handshake, operator gate, identity exchange.
///
/// A connection whose pairing code is denied is closed before any
/// descriptor is sent and never becomes a [`ReadyChannel`].
pub async fn establish<S>(
    stream: S,
    role: HandshakeRole,
    connection_id: ConnectionId,
    config: &EstablishConfig,
    gate: &dyn ConnectionGate,
    local: &RemoteDeviceInfo,
) -> Result<ReadyChannel<S>, EstablishError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let span = info_span!("establish", connection_id = %connection_id, role = role.as_str());
    async move {
        let framed = FramedStream::new(stream, config.max_frame_bytes);
        let channel = tokio::time::timeout(
            config.handshake_timeout,
            perform_handshake(framed, role, connection_id.clone()),
        )
        .await
        .map_err(|_| EstablishError::Timeout { stage: "handshake" })??;

        let decision = gate.admit(&connection_id, channel.pairing_code()).await;
        if !decision.is_approved() {
            warn!("pairing code denied, closing connection");
            channel.close().await;
            return Err(EstablishError::Rejected);
        }

        let ready = tokio::time::timeout(config.greeting_deadline(), exchange_identity(channel, local))
            .await
            .map_err(|_| EstablishError::Timeout { stage: "greeting" })??;

        info!(remote_device_id = %ready.remote().device_id, "connection ready");
        Ok(ready)
    }
    .instrument(span)
    .await
}
