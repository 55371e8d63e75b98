use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

use crate::crypto::ShardDigest;
use crate::ids::{DeviceId, SessionId};
use crate::ports::SharePart;
use crate::protocol::serde_b64;

/// One fragment of the wallet secret, bound to exactly one holder device.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    pub session_id: SessionId,
    pub version: u64,
    /// x-coordinate of the share (1-based).
    pub index: u8,
    pub threshold: u8,
    pub total: u8,
    pub holder_device_id: DeviceId,
    #[serde(with = "serde_b64")]
    pub payload: Vec<u8>,
}

impl Shard {
    pub fn digest(&self) -> ShardDigest {
        ShardDigest::compute(&self.session_id, self.version, self.index, &self.payload)
    }

    pub fn to_share_part(&self) -> SharePart {
        SharePart::new(self.index, self.payload.clone())
    }
}

impl fmt::Debug for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shard")
            .field("session_id", &self.session_id)
            .field("version", &self.version)
            .field("index", &self.index)
            .field("threshold", &self.threshold)
            .field("total", &self.total)
            .field("holder_device_id", &self.holder_device_id)
            .field("payload", &"[redacted]")
            .finish()
    }
}

impl Drop for Shard {
    fn drop(&mut self) {
        self.payload.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_payload() {
        let shard = Shard {
            session_id: SessionId::from("s"),
            version: 1,
            index: 2,
            threshold: 2,
            total: 3,
            holder_device_id: DeviceId::from("d"),
            payload: vec![0xAB; 4],
        };
        let rendered = format!("{shard:?}");
        assert!(rendered.contains("[redacted]"));
        assert!(!rendered.contains("171"));
    }
}
