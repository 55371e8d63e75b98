//! Directional key schedule
//!
//! One ECDH result yields two keys so the two directions never share a
//! keystream:
//!
//! ```text
//! passive → active : key = SHA-256(shared), iv = passive nonce
//! active  → passive: key = shared,          iv = active nonce
//! ```

use sha2::{Digest, Sha256};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const NONCE_LEN: usize = 16;
pub const KEY_LEN: usize = 32;

/// Which end of the exchange this side is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeRole {
    /// Accepted the socket; writes the first negotiation frame.
    Passive,
    /// Dialed the socket; replies to the first negotiation frame.
    Active,
}

impl HandshakeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandshakeRole::Passive => "passive",
            HandshakeRole::Active => "active",
        }
    }
}

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DirectionKey {
    key: [u8; KEY_LEN],
    iv: [u8; NONCE_LEN],
}

impl DirectionKey {
    pub fn new(key: [u8; KEY_LEN], iv: [u8; NONCE_LEN]) -> Self {
        Self { key, iv }
    }

    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; NONCE_LEN] {
        &self.iv
    }
}

impl PartialEq for DirectionKey {
    fn eq(&self, other: &Self) -> bool {
        (self.key.ct_eq(&other.key) & self.iv.ct_eq(&other.iv)).into()
    }
}

impl Eq for DirectionKey {}

impl fmt::Debug for DirectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DirectionKey([REDACTED])")
    }
}

/// The two keys a channel installs: one for writing, one for reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeys {
    pub outbound: DirectionKey,
    pub inbound: DirectionKey,
}

pub fn derive_session_keys(
    role: HandshakeRole,
    shared_secret: &[u8; KEY_LEN],
    local_nonce: &[u8; NONCE_LEN],
    remote_nonce: &[u8; NONCE_LEN],
) -> SessionKeys {
    let mut digest: [u8; KEY_LEN] = Sha256::digest(shared_secret).into();

    let keys = match role {
        HandshakeRole::Passive => SessionKeys {
            outbound: DirectionKey::new(digest, *local_nonce),
            inbound: DirectionKey::new(*shared_secret, *remote_nonce),
        },
        HandshakeRole::Active => SessionKeys {
            outbound: DirectionKey::new(*shared_secret, *local_nonce),
            inbound: DirectionKey::new(digest, *remote_nonce),
        },
    };
    digest.zeroize();
    keys
}
