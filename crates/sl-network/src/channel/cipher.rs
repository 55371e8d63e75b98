use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;

use super::keys::DirectionKey;

/// AES-256-CTR keystream for one direction.
///
/// The counter keeps running across frames, so both ends must process frames
/// in the same order they were written.
pub struct DirectionalCipher {
    inner: Ctr128BE<Aes256>,
}

impl DirectionalCipher {
    pub fn new(key: &DirectionKey) -> Self {
        Self {
            inner: Ctr128BE::<Aes256>::new(key.key().into(), key.iv().into()),
        }
    }

    pub fn apply(&mut self, buf: &mut [u8]) {
        self.inner.apply_keystream(buf);
    }
}
