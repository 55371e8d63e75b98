use sl_core::{ConnectionId, RemoteDeviceInfo};
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::debug;

use crate::channel::HandshakeRole;
use crate::establish::{establish, EstablishConfig, EstablishError};
use crate::gate::ConnectionGate;
use crate::listener::TcpReadyChannel;

/// Active role: dial a discovered peer and establish a ready channel.
#[derive(Clone)]
pub struct ShardConnector {
    config: EstablishConfig,
    gate: Arc<dyn ConnectionGate>,
    local: RemoteDeviceInfo,
}

impl ShardConnector {
    pub fn new(config: EstablishConfig, gate: Arc<dyn ConnectionGate>, local: RemoteDeviceInfo) -> Self {
        Self { config, gate, local }
    }

    pub fn local(&self) -> &RemoteDeviceInfo {
        &self.local
    }

    pub async fn connect(&self, addr: &str) -> Result<TcpReadyChannel, EstablishError> {
        let stream = tokio::time::timeout(self.config.handshake_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| EstablishError::Timeout { stage: "connect" })?
            .map_err(EstablishError::Connect)?;
        if let Err(err) = stream.set_nodelay(true) {
            debug!(error = %err, "set_nodelay failed");
        }

        establish(
            stream,
            HandshakeRole::Active,
            ConnectionId::new(),
            &self.config,
            self.gate.as_ref(),
            &self.local,
        )
        .await
    }
}
