//! # sl-network
//!
//! Transport layer for shardlink:
//! - Length-delimited framing over raw TCP
//! - ECDH handshake with directional AES-256-CTR keys and a pairing code
//! - Operator-gated identity exchange producing ready channels
//! - Listener (passive) and connector (active) roles
//! - Discovery adapters (mDNS and in-process)

pub mod channel;
pub mod config;
pub mod connector;
pub mod discovery;
pub mod establish;
pub mod framing;
pub mod gate;
pub mod greeting;
pub mod handshake;
pub mod listener;

#[cfg(test)]
pub(crate) mod test_support;

pub use channel::{ChannelError, HandshakeRole, ReadyChannel, SecureChannel};
pub use config::ListenerConfig;
pub use connector::ShardConnector;
pub use discovery::{InMemoryDiscovery, InMemoryDiscoveryHub, MdnsDiscovery};
pub use establish::{establish, EstablishConfig, EstablishError};
pub use gate::{ConnectionGate, OperatorGate};
pub use listener::{ListenerError, ShardListener, TcpReadyChannel};
