//! Redistribution witness
//!
//! A device that starts a redistribution signs `"<timestamp_ms>_<version>"` with
//! the wallet's long-term key. Devices evaluating the offer check the signature
//! against a key they already trust, the timestamp against a freshness window,
//! and that the signature has not been seen before.

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::Signature;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

pub type WalletSigningKey = k256::ecdsa::SigningKey;
pub type WalletVerifyingKey = k256::ecdsa::VerifyingKey;

pub const ATTR_WITNESS_TS: &str = "witness_ts";
pub const ATTR_WITNESS_SIG: &str = "witness_sig";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WitnessError {
    #[error("witness missing or malformed: {0}")]
    Malformed(String),

    #[error("witness signature does not verify against the trusted wallet key")]
    BadSignature,

    #[error("witness is stale: {age_ms} ms old, window {window_ms} ms")]
    Stale { age_ms: i64, window_ms: i64 },

    #[error("witness timestamp is {ahead_ms} ms in the future")]
    FromFuture { ahead_ms: i64 },

    #[error("witness already used")]
    Replayed,

    #[error("offered version {offered} is not newer than held version {held}")]
    VersionNotNewer { offered: u64, held: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedistributionWitness {
    pub timestamp_ms: i64,
    pub version: u64,
    /// 64-byte compact ECDSA signature.
    pub signature: Vec<u8>,
}

impl RedistributionWitness {
    pub fn message(timestamp_ms: i64, version: u64) -> Vec<u8> {
        format!("{timestamp_ms}_{version}").into_bytes()
    }

    pub fn sign(key: &WalletSigningKey, timestamp_ms: i64, version: u64) -> Self {
        let signature: Signature = key.sign(&Self::message(timestamp_ms, version));
        Self {
            timestamp_ms,
            version,
            signature: signature.to_bytes().to_vec(),
        }
    }

    pub fn verify_signature(&self, key: &WalletVerifyingKey) -> Result<(), WitnessError> {
        let signature = Signature::from_slice(&self.signature)
            .map_err(|_| WitnessError::Malformed("signature encoding".to_string()))?;
        key.verify(&Self::message(self.timestamp_ms, self.version), &signature)
            .map_err(|_| WitnessError::BadSignature)
    }

    /// Advertisement attributes carrying this witness. The version travels in
    /// the advertisement's own `version` attribute.
    pub fn to_attributes(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (ATTR_WITNESS_TS.to_string(), self.timestamp_ms.to_string()),
            (ATTR_WITNESS_SIG.to_string(), hex::encode(&self.signature)),
        ])
    }

    pub fn from_attributes(
        attributes: &BTreeMap<String, String>,
        version: u64,
    ) -> Result<Self, WitnessError> {
        let timestamp_ms = attributes
            .get(ATTR_WITNESS_TS)
            .ok_or_else(|| WitnessError::Malformed("missing timestamp".to_string()))?
            .parse::<i64>()
            .map_err(|_| WitnessError::Malformed("timestamp is not an integer".to_string()))?;
        let signature = attributes
            .get(ATTR_WITNESS_SIG)
            .ok_or_else(|| WitnessError::Malformed("missing signature".to_string()))
            .and_then(|sig| {
                hex::decode(sig)
                    .map_err(|_| WitnessError::Malformed("signature is not hex".to_string()))
            })?;
        Ok(Self {
            timestamp_ms,
            version,
            signature,
        })
    }
}

/// Stateful verifier held by a device that already trusts the wallet key.
pub struct WitnessVerifier {
    trusted_key: WalletVerifyingKey,
    freshness_window_ms: i64,
    max_clock_skew_ms: i64,
    held_version: Option<u64>,
    seen_signatures: HashSet<Vec<u8>>,
}

impl WitnessVerifier {
    pub fn new(
        trusted_key: WalletVerifyingKey,
        freshness_window_ms: i64,
        max_clock_skew_ms: i64,
    ) -> Self {
        Self {
            trusted_key,
            freshness_window_ms,
            max_clock_skew_ms,
            held_version: None,
            seen_signatures: HashSet::new(),
        }
    }

    /// Version of the shard this device currently holds; offers must exceed it.
    pub fn with_held_version(mut self, version: u64) -> Self {
        self.held_version = Some(version);
        self
    }

    pub fn verify(
        &mut self,
        witness: &RedistributionWitness,
        now_ms: i64,
    ) -> Result<(), WitnessError> {
        witness.verify_signature(&self.trusted_key)?;

        let age_ms = now_ms - witness.timestamp_ms;
        if age_ms > self.freshness_window_ms {
            return Err(WitnessError::Stale {
                age_ms,
                window_ms: self.freshness_window_ms,
            });
        }
        if -age_ms > self.max_clock_skew_ms {
            return Err(WitnessError::FromFuture { ahead_ms: -age_ms });
        }

        if self.seen_signatures.contains(&witness.signature) {
            return Err(WitnessError::Replayed);
        }

        if let Some(held) = self.held_version {
            if witness.version <= held {
                return Err(WitnessError::VersionNotNewer {
                    offered: witness.version,
                    held,
                });
            }
        }

        self.seen_signatures.insert(witness.signature.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    const NOW: i64 = 1_700_000_000_000;

    fn verifier_for(key: &WalletSigningKey) -> WitnessVerifier {
        WitnessVerifier::new(key.verifying_key().clone(), 60_000, 5_000)
    }

    #[test]
    fn message_uses_underscore_separator() {
        assert_eq!(RedistributionWitness::message(42, 7), b"42_7".to_vec());
    }

    #[test]
    fn fresh_witness_is_accepted_once() {
        let key = WalletSigningKey::random(&mut OsRng);
        let mut verifier = verifier_for(&key);
        let witness = RedistributionWitness::sign(&key, NOW - 1_000, 3);

        assert_eq!(verifier.verify(&witness, NOW), Ok(()));
        assert_eq!(verifier.verify(&witness, NOW), Err(WitnessError::Replayed));
    }

    #[test]
    fn stale_witness_is_rejected_even_with_high_version() {
        let key = WalletSigningKey::random(&mut OsRng);
        let mut verifier = verifier_for(&key).with_held_version(1);
        let witness = RedistributionWitness::sign(&key, NOW - 61_000, u64::MAX);

        assert!(matches!(
            verifier.verify(&witness, NOW),
            Err(WitnessError::Stale { .. })
        ));
    }

    #[test]
    fn foreign_key_signature_is_rejected() {
        let trusted = WalletSigningKey::random(&mut OsRng);
        let attacker = WalletSigningKey::random(&mut OsRng);
        let mut verifier = verifier_for(&trusted);
        let witness = RedistributionWitness::sign(&attacker, NOW, 99);

        assert_eq!(verifier.verify(&witness, NOW), Err(WitnessError::BadSignature));
    }

    #[test]
    fn tampered_version_breaks_signature() {
        let key = WalletSigningKey::random(&mut OsRng);
        let mut verifier = verifier_for(&key);
        let mut witness = RedistributionWitness::sign(&key, NOW, 2);
        witness.version = 3;

        assert_eq!(verifier.verify(&witness, NOW), Err(WitnessError::BadSignature));
    }

    #[test]
    fn future_timestamp_beyond_skew_is_rejected() {
        let key = WalletSigningKey::random(&mut OsRng);
        let mut verifier = verifier_for(&key);
        let witness = RedistributionWitness::sign(&key, NOW + 10_000, 2);

        assert_eq!(
            verifier.verify(&witness, NOW),
            Err(WitnessError::FromFuture { ahead_ms: 10_000 })
        );
    }

    #[test]
    fn version_must_exceed_held_version() {
        let key = WalletSigningKey::random(&mut OsRng);
        let mut verifier = verifier_for(&key).with_held_version(4);
        let witness = RedistributionWitness::sign(&key, NOW, 4);

        assert_eq!(
            verifier.verify(&witness, NOW),
            Err(WitnessError::VersionNotNewer { offered: 4, held: 4 })
        );
    }

    #[test]
    fn attributes_carry_timestamp_and_signature() {
        let key = WalletSigningKey::random(&mut OsRng);
        let witness = RedistributionWitness::sign(&key, NOW, 5);
        let attrs = witness.to_attributes();

        let parsed = RedistributionWitness::from_attributes(&attrs, 5).unwrap();
        assert_eq!(parsed, witness);

        let mut broken = attrs.clone();
        broken.insert(ATTR_WITNESS_SIG.to_string(), "zz".to_string());
        assert!(matches!(
            RedistributionWitness::from_attributes(&broken, 5),
            Err(WitnessError::Malformed(_))
        ));
    }
}
