use std::fmt;

use thiserror::Error;
use zeroize::Zeroize;

use crate::security::SecretBytes;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecretSharingError {
    #[error("invalid threshold {threshold} for {total} shares")]
    InvalidThreshold { threshold: u8, total: u8 },

    #[error("secret is empty")]
    EmptySecret,

    #[error("need at least {required} shares, got {provided}")]
    NotEnoughShares { required: usize, provided: usize },

    #[error("shares have inconsistent lengths")]
    InconsistentShares,

    #[error("duplicate or zero share index {0}")]
    BadIndex(u8),
}

/// A single (x, f(x)) share. Index 0 is reserved.
#[derive(Clone, PartialEq, Eq)]
pub struct SharePart {
    index: u8,
    data: Vec<u8>,
}

impl SharePart {
    pub fn new(index: u8, data: Vec<u8>) -> Self {
        Self { index, data }
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Move the share bytes out, leaving this part empty.
    pub fn take_data(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }
}

impl fmt::Debug for SharePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharePart")
            .field("index", &self.index)
            .field("len", &self.data.len())
            .finish()
    }
}

impl Drop for SharePart {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

/// Threshold secret sharing: any `threshold` of `total` parts rebuild the secret.
pub trait SecretSharingPort: Send + Sync {
    fn split(&self, secret: &[u8], threshold: u8, total: u8)
        -> Result<Vec<SharePart>, SecretSharingError>;

    fn reconstruct(&self, parts: &[SharePart]) -> Result<SecretBytes, SecretSharingError>;
}
