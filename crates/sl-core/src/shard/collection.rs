//! M-of-N shard accumulation for aggregation.

use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

use super::Shard;
use crate::ids::{DeviceId, SessionId};
use crate::ports::SharePart;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollectionError {
    #[error("shard belongs to session {offered}, expected {expected}")]
    SessionMismatch {
        expected: SessionId,
        offered: SessionId,
    },

    #[error("shard version {offered} does not match expected version {expected}")]
    VersionMismatch { expected: u64, offered: u64 },

    #[error("shard threshold {offered} does not match expected threshold {expected}")]
    ThresholdMismatch { expected: u8, offered: u8 },

    #[error("shard index {0} already collected")]
    DuplicateIndex(u8),

    #[error("holder {0} already contributed a shard")]
    DuplicateHolder(DeviceId),

    #[error("only {collected} of {required} shards collected")]
    Insufficient { collected: usize, required: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionProgress {
    pub collected: usize,
    pub required: usize,
}

impl CollectionProgress {
    pub fn is_complete(&self) -> bool {
        self.collected >= self.required
    }
}

pub struct ShardCollection {
    session_id: SessionId,
    version: u64,
    threshold: u8,
    shards: BTreeMap<u8, Shard>,
    holders: HashSet<DeviceId>,
}

impl ShardCollection {
    pub fn new(session_id: SessionId, version: u64, threshold: u8) -> Self {
        Self {
            session_id,
            version,
            threshold,
            shards: BTreeMap::new(),
            holders: HashSet::new(),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn progress(&self) -> CollectionProgress {
        CollectionProgress {
            collected: self.shards.len(),
            required: usize::from(self.threshold),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.progress().is_complete()
    }

    /// Accept a shard if it matches this collection's session and version and is
    /// not a duplicate of one already held.
    pub fn offer(&mut self, shard: Shard) -> Result<CollectionProgress, CollectionError> {
        if shard.session_id != self.session_id {
            return Err(CollectionError::SessionMismatch {
                expected: self.session_id.clone(),
                offered: shard.session_id.clone(),
            });
        }
        if shard.version != self.version {
            return Err(CollectionError::VersionMismatch {
                expected: self.version,
                offered: shard.version,
            });
        }
        if shard.threshold != self.threshold {
            return Err(CollectionError::ThresholdMismatch {
                expected: self.threshold,
                offered: shard.threshold,
            });
        }
        if self.shards.contains_key(&shard.index) {
            return Err(CollectionError::DuplicateIndex(shard.index));
        }
        if self.holders.contains(&shard.holder_device_id) {
            return Err(CollectionError::DuplicateHolder(
                shard.holder_device_id.clone(),
            ));
        }

        self.holders.insert(shard.holder_device_id.clone());
        self.shards.insert(shard.index, shard);
        Ok(self.progress())
    }

    /// Exactly `threshold` share parts, lowest indices first.
    pub fn share_parts(&self) -> Result<Vec<SharePart>, CollectionError> {
        let progress = self.progress();
        if !progress.is_complete() {
            return Err(CollectionError::Insufficient {
                collected: progress.collected,
                required: progress.required,
            });
        }
        Ok(self
            .shards
            .values()
            .take(progress.required)
            .map(Shard::to_share_part)
            .collect())
    }
}
