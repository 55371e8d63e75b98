use async_trait::async_trait;
use thiserror::Error;

use crate::crypto::WalletSigningKey;
use crate::security::SecretString;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("wrong pin")]
    WrongPin,

    #[error("signing key unavailable: {0}")]
    Unavailable(String),
}

/// Unlocks the wallet signing key used to sign redistribution witnesses.
#[async_trait]
pub trait AuthenticatorPort: Send + Sync {
    async fn request_signing_key(&self, pin: &SecretString) -> Result<WalletSigningKey, AuthError>;
}
