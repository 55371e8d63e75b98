use async_trait::async_trait;
use thiserror::Error;

use crate::ids::SessionId;
use crate::shard::Shard;

#[derive(Debug, Error)]
pub enum ShardStoreError {
    #[error("shard io failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("shard record is corrupt: {0}")]
    Corrupt(String),
}

/// Durable storage for the shard this device holds, keyed by session.
#[async_trait]
pub trait ShardStorePort: Send + Sync {
    /// Persist a shard, replacing any older version for the same session.
    async fn persist_shard(&self, shard: &Shard) -> Result<(), ShardStoreError>;

    async fn load_shard(&self, session_id: &SessionId) -> Result<Option<Shard>, ShardStoreError>;
}
