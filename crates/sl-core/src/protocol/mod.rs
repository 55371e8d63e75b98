//! Application messages exchanged over a ready secure channel.
//!
//! One JSON-encoded [`ShardMessage`] per secure frame.

mod message;
pub(crate) mod serde_b64;

pub use message::{EnvelopeError, ShardEnvelope, ShardMessage, PROTOCOL_VERSION};
