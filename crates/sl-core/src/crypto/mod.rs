//! Protocol-level cryptographic helpers.
//!
//! Channel crypto (ECDH, stream cipher) lives in `sl-network`; this module holds
//! what both ends of a flow must agree on independently of transport.

mod digest;
mod pairing_code;
mod witness;

pub use digest::ShardDigest;
pub use pairing_code::PairingCode;
pub use witness::{
    RedistributionWitness, WalletSigningKey, WalletVerifyingKey, WitnessError, WitnessVerifier,
    ATTR_WITNESS_SIG, ATTR_WITNESS_TS,
};
