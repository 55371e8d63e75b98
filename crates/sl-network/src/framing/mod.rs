//! Length-delimited framing for raw pairing sockets.
//!
//! Every message on the wire, handshake or encrypted, is one frame:
//! a 4-byte big-endian length followed by the payload.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{trace, warn};

/// Default maximum frame size (64 KiB).
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame exceeds max: {len} > {max}")]
    TooLarge { len: usize, max: usize },

    #[error("frame io failed: {0}")]
    Io(#[from] io::Error),
}

/// A raw socket carrying length-prefixed frames.
///
/// `recv` is cancel-safe: a partially received frame stays buffered until the
/// next call, so it can be raced inside `tokio::select!`.
pub struct FramedStream<S> {
    inner: Framed<S, LengthDelimitedCodec>,
    max_frame_bytes: usize,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, max_frame_bytes: usize) -> Self {
        let codec = LengthDelimitedCodec::builder()
            .big_endian()
            .length_field_length(4)
            .max_frame_length(max_frame_bytes)
            .new_codec();
        Self {
            inner: Framed::new(stream, codec),
            max_frame_bytes,
        }
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// Write one frame and flush it.
    pub async fn send(&mut self, payload: Vec<u8>) -> Result<(), FrameError> {
        let len = payload.len();
        if len > self.max_frame_bytes {
            return Err(FrameError::TooLarge {
                len,
                max: self.max_frame_bytes,
            });
        }

        trace!(stage = "write_frame", len = len, "writing frame");
        self.inner.send(Bytes::from(payload)).await.map_err(|e| {
            warn!(stage = "write_frame", error = %e, expected = len, "frame write failed");
            FrameError::Io(e)
        })
    }

    /// Read one frame.
    ///
    /// Returns `Ok(None)` if the stream ends cleanly between frames.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        trace!(stage = "read_frame", "reading frame");
        match self.inner.next().await {
            Some(Ok(frame)) => {
                trace!(stage = "read_frame", len = frame.len(), "frame received");
                Ok(Some(frame.to_vec()))
            }
            Some(Err(e)) if e.kind() == io::ErrorKind::InvalidData => {
                warn!(stage = "read_frame", error = %e, max = self.max_frame_bytes, "oversize frame");
                Err(FrameError::TooLarge {
                    len: self.max_frame_bytes + 1,
                    max: self.max_frame_bytes,
                })
            }
            Some(Err(e)) => {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    warn!(stage = "read_frame", error = %e, "unexpected eof inside frame");
                }
                Err(FrameError::Io(e))
            }
            None => Ok(None),
        }
    }

    /// Flush and shut down the write half.
    pub async fn close(&mut self) -> Result<(), FrameError> {
        SinkExt::<Bytes>::close(&mut self.inner).await?;
        Ok(())
    }
}

#[cfg(test)]
mod framing_test;
