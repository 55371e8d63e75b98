//! Shamir secret sharing over GF(2^8).
//!
//! Each secret byte gets its own random polynomial of degree `threshold - 1`
//! whose constant term is that byte. Share `i` carries the evaluations at
//! `x = i`, so every share is exactly as long as the secret.

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use sl_core::ports::{SecretSharingError, SecretSharingPort, SharePart};
use sl_core::security::SecretBytes;
use zeroize::Zeroize;

use super::gf256::Gf256;

#[derive(Debug, Default, Clone, Copy)]
pub struct ShamirSecretSharing;

impl ShamirSecretSharing {
    pub fn new() -> Self {
        Self
    }

    pub(crate) fn split_with_rng<R: RngCore + CryptoRng>(
        rng: &mut R,
        secret: &[u8],
        threshold: u8,
        total: u8,
    ) -> Result<Vec<SharePart>, SecretSharingError> {
        if threshold == 0 || total == 0 || threshold > total {
            return Err(SecretSharingError::InvalidThreshold { threshold, total });
        }
        if secret.is_empty() {
            return Err(SecretSharingError::EmptySecret);
        }

        let mut columns: Vec<Vec<u8>> = (0..total)
            .map(|_| Vec::with_capacity(secret.len()))
            .collect();
        let mut coefficients = vec![Gf256::ZERO; usize::from(threshold)];

        for &byte in secret {
            coefficients[0] = Gf256(byte);
            for coefficient in coefficients.iter_mut().skip(1) {
                *coefficient = Gf256((rng.next_u32() & 0xFF) as u8);
            }
            for (column, x) in columns.iter_mut().zip(1..=total) {
                column.push(evaluate(&coefficients, Gf256(x)).0);
            }
        }
        coefficients.zeroize();

        Ok(columns
            .into_iter()
            .zip(1..=total)
            .map(|(data, index)| SharePart::new(index, data))
            .collect())
    }
}

impl SecretSharingPort for ShamirSecretSharing {
    fn split(
        &self,
        secret: &[u8],
        threshold: u8,
        total: u8,
    ) -> Result<Vec<SharePart>, SecretSharingError> {
        Self::split_with_rng(&mut OsRng, secret, threshold, total)
    }

    fn reconstruct(&self, parts: &[SharePart]) -> Result<SecretBytes, SecretSharingError> {
        let Some(first) = parts.first() else {
            return Err(SecretSharingError::NotEnoughShares {
                required: 1,
                provided: 0,
            });
        };

        let mut seen = [false; 256];
        for part in parts {
            let slot = usize::from(part.index());
            if part.index() == 0 || seen[slot] {
                return Err(SecretSharingError::BadIndex(part.index()));
            }
            seen[slot] = true;
        }

        let len = first.data().len();
        if parts.iter().any(|part| part.data().len() != len) {
            return Err(SecretSharingError::InconsistentShares);
        }

        let weights = lagrange_weights_at_zero(parts);
        let secret = (0..len)
            .map(|offset| {
                parts
                    .iter()
                    .zip(&weights)
                    .fold(Gf256::ZERO, |acc, (part, weight)| {
                        acc.add(Gf256(part.data()[offset]).mul(*weight))
                    })
                    .0
            })
            .collect();

        Ok(SecretBytes::new(secret))
    }
}

/// Horner evaluation of `c0 + c1·x + … + ck·x^k`.
fn evaluate(coefficients: &[Gf256], x: Gf256) -> Gf256 {
    coefficients
        .iter()
        .rev()
        .fold(Gf256::ZERO, |acc, coefficient| acc.mul(x).add(*coefficient))
}

/// L_i(0) = Π_{j≠i} x_j / (x_i + x_j); subtraction is XOR in this field.
fn lagrange_weights_at_zero(parts: &[SharePart]) -> Vec<Gf256> {
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            let x_i = Gf256(part.index());
            parts
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .fold(Gf256::ONE, |acc, (_, other)| {
                    let x_j = Gf256(other.index());
                    acc.mul(x_j.div(x_i.add(x_j)))
                })
        })
        .collect()
}
