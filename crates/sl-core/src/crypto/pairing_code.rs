//! Short authentication string derived from the key-agreement result.
//!
//! ```text
//! shared_secret bytes  b0 b1 ... b31
//!        │  product, zero byte counted as 1
//!        ▼
//! decimal rendering    "1234567890123..."
//!        │  chars [6, 10)
//!        ▼
//! pairing code         "7890"
//! ```
//!
//! Both devices display the code; the operator compares them visually. This is
//! the only defense against a man-in-the-middle on the unauthenticated exchange.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt;

const CODE_OFFSET: usize = 6;
const CODE_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PairingCode(String);

impl PairingCode {
    pub fn derive(shared_secret: &[u8]) -> Self {
        let product = shared_secret
            .iter()
            .fold(BigUint::from(1u32), |acc, &byte| acc * u32::from(byte.max(1)));
        let code = product
            .to_str_radix(10)
            .chars()
            .skip(CODE_OFFSET)
            .take(CODE_LEN)
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PairingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
