use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::ids::SessionId;

/// Integrity digest of a shard, hex encoded.
///
/// `SHA-256(session_id || version_be || index || payload)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardDigest(String);

impl ShardDigest {
    pub fn compute(session_id: &SessionId, version: u64, index: u8, payload: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(session_id.as_str().as_bytes());
        hasher.update(version.to_be_bytes());
        hasher.update([index]);
        hasher.update(payload);
        Self(hex::encode(hasher.finalize()))
    }

    pub fn from_hex(value: impl Into<String>) -> Self {
        Self(value.into().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, other: &ShardDigest) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}
