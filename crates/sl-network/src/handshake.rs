//! Handshake coordinator
//!
//! Unauthenticated secp256k1 ECDH over one negotiation frame per side. The
//! passive side always writes first:
//!
//! ```text
//! passive                                  active
//!   │── nonce(16) ‖ pubkey(65) ───────────▶│
//!   │◀─────────── nonce(16) ‖ pubkey(65) ──│
//!   ▼                                      ▼
//! shared = ECDH x-coordinate (32 bytes) on both sides
//! ```
//!
//! The handshake proves nothing about who the peer is. The pairing code it
//! yields must be compared by the operator before the channel is trusted.

use k256::ecdh::EphemeralSecret;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::PublicKey;
use rand::rngs::OsRng;
use rand::RngCore;
use sl_core::{ConnectionId, PairingCode};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};
use zeroize::Zeroize;

use crate::channel::keys::{KEY_LEN, NONCE_LEN};
use crate::channel::{derive_session_keys, HandshakeRole, SecureChannel};
use crate::framing::{FrameError, FramedStream};

const COMPRESSED_POINT_LEN: usize = 33;
const UNCOMPRESSED_POINT_LEN: usize = 65;

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("peer closed the socket during handshake")]
    Closed,

    #[error("negotiation frame has invalid length {0}")]
    MalformedLength(usize),

    #[error("peer public key is not a valid curve point")]
    InvalidPoint,
}

struct NegotiationFrame {
    nonce: [u8; NONCE_LEN],
    public_key: PublicKey,
}

impl NegotiationFrame {
    fn encode(nonce: &[u8; NONCE_LEN], public_key: &PublicKey) -> Vec<u8> {
        let point = public_key.to_encoded_point(false);
        let mut frame = Vec::with_capacity(NONCE_LEN + UNCOMPRESSED_POINT_LEN);
        frame.extend_from_slice(nonce);
        frame.extend_from_slice(point.as_bytes());
        frame
    }

    fn decode(frame: &[u8]) -> Result<Self, HandshakeError> {
        let key_len = frame.len().saturating_sub(NONCE_LEN);
        if frame.len() <= NONCE_LEN
            || (key_len != COMPRESSED_POINT_LEN && key_len != UNCOMPRESSED_POINT_LEN)
        {
            return Err(HandshakeError::MalformedLength(frame.len()));
        }
        let (nonce_bytes, key_bytes) = frame.split_at(NONCE_LEN);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(nonce_bytes);
        let public_key =
            PublicKey::from_sec1_bytes(key_bytes).map_err(|_| HandshakeError::InvalidPoint)?;
        Ok(Self { nonce, public_key })
    }
}

async fn read_negotiation<S>(framed: &mut FramedStream<S>) -> Result<NegotiationFrame, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = framed.recv().await?.ok_or(HandshakeError::Closed)?;
    NegotiationFrame::decode(&frame)
}

/// Run the key agreement in `role` and install the directional ciphers.
///
/// On any failure the socket is dropped with the error; no key material
/// outlives this call except inside the returned channel.
pub async fn perform_handshake<S>(
    mut framed: FramedStream<S>,
    role: HandshakeRole,
    connection_id: ConnectionId,
) -> Result<SecureChannel<S>, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let local_secret = EphemeralSecret::random(&mut OsRng);
    let mut local_nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut local_nonce);
    let local_frame = NegotiationFrame::encode(&local_nonce, &local_secret.public_key());

    let remote = match role {
        HandshakeRole::Passive => {
            framed.send(local_frame).await?;
            read_negotiation(&mut framed).await
        }
        HandshakeRole::Active => {
            let remote = read_negotiation(&mut framed).await;
            if remote.is_ok() {
                framed.send(local_frame).await?;
            }
            remote
        }
    }
    .map_err(|err| {
        warn!(%connection_id, role = role.as_str(), error = %err, "handshake aborted");
        err
    })?;

    let shared = local_secret.diffie_hellman(&remote.public_key);
    let mut shared_secret = [0u8; KEY_LEN];
    shared_secret.copy_from_slice(shared.raw_secret_bytes());

    let pairing_code = PairingCode::derive(&shared_secret);
    let keys = derive_session_keys(role, &shared_secret, &local_nonce, &remote.nonce);
    shared_secret.zeroize();
    local_nonce.zeroize();

    debug!(%connection_id, role = role.as_str(), "handshake complete, channel authenticated");
    Ok(SecureChannel::new(connection_id, role, framed, keys, pairing_code))
}
