//! Identity exchange
//!
//! 握手完成后双方各自发送设备描述，再读取对方的描述；
//! 只有在两步都完成后通道才进入 ready。

use sl_core::RemoteDeviceInfo;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::channel::{ChannelError, ReadyChannel, SecureChannel};

#[derive(Debug, Error)]
pub enum GreetingError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("peer device descriptor is malformed: {0}")]
    Malformed(serde_json::Error),

    #[error("peer closed before sending its device descriptor")]
    Closed,
}

/// Send our descriptor, then wait for the peer's. Both sides write first, so
/// neither blocks the other.
pub async fn exchange_identity<S>(
    mut channel: SecureChannel<S>,
    local: &RemoteDeviceInfo,
) -> Result<ReadyChannel<S>, GreetingError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let descriptor = local.to_json_bytes().map_err(ChannelError::Codec)?;
    channel.secure_write(&descriptor).await?;

    let bytes = channel.secure_read().await?.ok_or(GreetingError::Closed)?;
    let remote = RemoteDeviceInfo::from_json_bytes(&bytes).map_err(GreetingError::Malformed)?;

    debug!(
        connection_id = %channel.connection_id(),
        remote_device_id = %remote.device_id,
        remote_name = %remote.name,
        "identity exchange complete, channel ready"
    );
    Ok(channel.into_ready(remote))
}
