use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use zeroize::Zeroize;

use super::serde_b64;
use crate::crypto::ShardDigest;
use crate::ids::{DeviceId, SessionId};
use crate::shard::Shard;

/// Value of the `protocol` advertisement attribute.
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShardMessage {
    /// Distributor → receiver: the receiver's shard after sealing.
    Shard(ShardEnvelope),

    /// Receiver → distributor: outcome of persisting the shard.
    Ack { session_id: SessionId, saved: bool },

    /// Aggregator → holder: request the holder's shard for a session version.
    ShardRequest { session_id: SessionId, version: u64 },

    /// Holder → aggregator.
    ShardResponse(ShardEnvelope),

    /// Holder → aggregator: no matching shard.
    ShardUnavailable { reason: String },

    /// Either side: the flow refuses this connection (e.g. session sealed).
    Reject { reason: String },
}

impl ShardMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ShardMessage::Shard(_) => "shard",
            ShardMessage::Ack { .. } => "ack",
            ShardMessage::ShardRequest { .. } => "shard_request",
            ShardMessage::ShardResponse(_) => "shard_response",
            ShardMessage::ShardUnavailable { .. } => "shard_unavailable",
            ShardMessage::Reject { .. } => "reject",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("shard digest mismatch")]
    DigestMismatch,

    #[error("shard index 0 is reserved")]
    ReservedIndex,

    #[error("invalid threshold {threshold} of {total}")]
    InvalidThreshold { threshold: u8, total: u8 },
}

/// Wire form of a [`Shard`] with its integrity digest.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardEnvelope {
    pub session_id: SessionId,
    pub version: u64,
    pub index: u8,
    pub threshold: u8,
    pub total: u8,
    pub holder_device_id: DeviceId,
    #[serde(with = "serde_b64")]
    pub payload: Vec<u8>,
    pub digest: ShardDigest,
}

impl ShardEnvelope {
    pub fn from_shard(shard: &Shard) -> Self {
        Self {
            session_id: shard.session_id.clone(),
            version: shard.version,
            index: shard.index,
            threshold: shard.threshold,
            total: shard.total,
            holder_device_id: shard.holder_device_id.clone(),
            payload: shard.payload.clone(),
            digest: shard.digest(),
        }
    }

    /// Check the payload against `expected` (supplied out of band) or, when
    /// absent, against the digest carried in the envelope.
    pub fn open(mut self, expected: Option<&ShardDigest>) -> Result<Shard, EnvelopeError> {
        if self.index == 0 {
            return Err(EnvelopeError::ReservedIndex);
        }
        if self.threshold < 2 || self.threshold > self.total || self.index > self.total {
            return Err(EnvelopeError::InvalidThreshold {
                threshold: self.threshold,
                total: self.total,
            });
        }

        let shard = Shard {
            session_id: self.session_id.clone(),
            version: self.version,
            index: self.index,
            threshold: self.threshold,
            total: self.total,
            holder_device_id: self.holder_device_id.clone(),
            payload: std::mem::take(&mut self.payload),
        };

        let reference = expected.unwrap_or(&self.digest);
        if !shard.digest().matches(reference) {
            return Err(EnvelopeError::DigestMismatch);
        }
        Ok(shard)
    }
}

impl fmt::Debug for ShardEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardEnvelope")
            .field("session_id", &self.session_id)
            .field("version", &self.version)
            .field("index", &self.index)
            .field("threshold", &self.threshold)
            .field("total", &self.total)
            .field("holder_device_id", &self.holder_device_id)
            .field("payload", &"[redacted]")
            .field("digest", &self.digest)
            .finish()
    }
}

impl Drop for ShardEnvelope {
    fn drop(&mut self) {
        self.payload.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shard() -> Shard {
        Shard {
            session_id: SessionId::from("s-1"),
            version: 2,
            index: 2,
            threshold: 2,
            total: 3,
            holder_device_id: DeviceId::from("holder"),
            payload: vec![7, 8, 9],
        }
    }

    #[test]
    fn envelope_opens_with_embedded_digest() {
        let original = shard();
        let opened = ShardEnvelope::from_shard(&original).open(None).unwrap();
        assert_eq!(opened, original);
    }

    #[test]
    fn tampered_payload_fails_digest() {
        let mut envelope = ShardEnvelope::from_shard(&shard());
        envelope.payload[0] ^= 0xFF;
        assert_eq!(envelope.open(None), Err(EnvelopeError::DigestMismatch));
    }

    #[test]
    fn out_of_band_digest_takes_precedence() {
        let envelope = ShardEnvelope::from_shard(&shard());
        let unrelated = ShardDigest::compute(&SessionId::from("x"), 1, 1, b"x");
        assert_eq!(
            envelope.open(Some(&unrelated)),
            Err(EnvelopeError::DigestMismatch)
        );
    }

    #[test]
    fn message_json_is_tagged() {
        let msg = ShardMessage::ShardRequest {
            session_id: SessionId::from("s-1"),
            version: 4,
        };
        let json = String::from_utf8(msg.to_bytes().unwrap()).unwrap();
        assert!(json.contains("\"type\":\"shard_request\""));
        assert_eq!(ShardMessage::from_bytes(json.as_bytes()).unwrap(), msg);
    }

    #[test]
    fn envelope_payload_is_base64_on_the_wire() {
        let msg = ShardMessage::Shard(ShardEnvelope::from_shard(&shard()));
        let json = String::from_utf8(msg.to_bytes().unwrap()).unwrap();
        assert!(json.contains("\"payload\":\"BwgJ\""));
    }
}
