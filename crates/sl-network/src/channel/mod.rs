//! Secure channel
//!
//! ```text
//! FramedStream ──handshake──▶ SecureChannel ──greet──▶ ReadyChannel
//!  (plaintext)               (authenticated)          (remote device known)
//! ```
//!
//! Only a [`ReadyChannel`] is handed to orchestrators; an authenticated but
//! ungreeted channel never leaves this crate's establish flow.

mod cipher;
pub mod keys;

use sl_core::{ConnectionId, PairingCode, RemoteDeviceInfo, ShardMessage};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::framing::{FrameError, FramedStream};

pub use cipher::DirectionalCipher;
pub use keys::{derive_session_keys, DirectionKey, HandshakeRole, SessionKeys};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("message encoding failed: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("channel closed by peer")]
    Closed,
}

/// An authenticated channel: both directional ciphers are installed.
pub struct SecureChannel<S> {
    connection_id: ConnectionId,
    role: HandshakeRole,
    framed: FramedStream<S>,
    outbound: DirectionalCipher,
    inbound: DirectionalCipher,
    pairing_code: PairingCode,
}

impl<S> SecureChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(
        connection_id: ConnectionId,
        role: HandshakeRole,
        framed: FramedStream<S>,
        keys: SessionKeys,
        pairing_code: PairingCode,
    ) -> Self {
        Self {
            connection_id,
            role,
            framed,
            outbound: DirectionalCipher::new(&keys.outbound),
            inbound: DirectionalCipher::new(&keys.inbound),
            pairing_code,
        }
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    pub fn role(&self) -> HandshakeRole {
        self.role
    }

    pub fn pairing_code(&self) -> &PairingCode {
        &self.pairing_code
    }

    /// Encrypt and send one message.
    pub async fn secure_write(&mut self, plaintext: &[u8]) -> Result<(), ChannelError> {
        let mut buf = plaintext.to_vec();
        self.outbound.apply(&mut buf);
        self.framed.send(buf).await?;
        Ok(())
    }

    /// Receive and decrypt one message. `Ok(None)` means end of stream.
    pub async fn secure_read(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        match self.framed.recv().await? {
            Some(mut buf) => {
                self.inbound.apply(&mut buf);
                Ok(Some(buf))
            }
            None => Ok(None),
        }
    }

    pub async fn close(mut self) {
        if let Err(err) = self.framed.close().await {
            debug!(connection_id = %self.connection_id, error = %err, "close after error");
        }
    }

    pub(crate) fn into_ready(self, remote: RemoteDeviceInfo) -> ReadyChannel<S> {
        ReadyChannel {
            channel: self,
            remote,
        }
    }
}

/// A greeted channel, ready for shard protocol messages.
pub struct ReadyChannel<S> {
    channel: SecureChannel<S>,
    remote: RemoteDeviceInfo,
}

impl<S> ReadyChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn connection_id(&self) -> &ConnectionId {
        self.channel.connection_id()
    }

    pub fn pairing_code(&self) -> &PairingCode {
        self.channel.pairing_code()
    }

    pub fn remote(&self) -> &RemoteDeviceInfo {
        &self.remote
    }

    pub async fn send_message(&mut self, message: &ShardMessage) -> Result<(), ChannelError> {
        let bytes = message.to_bytes()?;
        debug!(
            connection_id = %self.channel.connection_id,
            kind = message.kind(),
            "sending shard message"
        );
        self.channel.secure_write(&bytes).await
    }

    /// Next protocol message. `Ok(None)` means the peer closed the channel.
    pub async fn recv_message(&mut self) -> Result<Option<ShardMessage>, ChannelError> {
        let Some(bytes) = self.channel.secure_read().await? else {
            return Ok(None);
        };
        let message = ShardMessage::from_bytes(&bytes)?;
        debug!(
            connection_id = %self.channel.connection_id,
            kind = message.kind(),
            "received shard message"
        );
        Ok(Some(message))
    }

    /// Like `recv_message`, but a closed channel is an error.
    pub async fn expect_message(&mut self) -> Result<ShardMessage, ChannelError> {
        self.recv_message().await?.ok_or(ChannelError::Closed)
    }

    pub async fn close(self) {
        self.channel.close().await;
    }
}
