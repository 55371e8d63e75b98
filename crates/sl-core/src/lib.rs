//! # sl-core
//!
//! Core domain models and protocol rules for shardlink.
//!
//! This crate contains pure protocol logic without any socket or storage
//! dependencies: threshold session rules, the receiver state machine, pairing
//! code derivation, redistribution witnesses and the port traits implemented
//! by `sl-network` and `sl-infra`.

pub mod crypto;
pub mod device;
pub mod discovery;
pub mod distribution;
pub mod events;
pub mod ids;
pub mod ports;
pub mod protocol;
pub mod security;
pub mod settings;
pub mod shard;

// Re-export commonly used types at the crate root
pub use crypto::{PairingCode, RedistributionWitness, ShardDigest};
pub use device::{Platform, RemoteDeviceInfo};
pub use discovery::{DiscoveryEvent, ResolvedService, ServiceAdvertisement, ServiceFunction};
pub use distribution::{DistributionSession, SessionPhase};
pub use events::ShardEvent;
pub use ids::{ConnectionId, DeviceId, SessionId};
pub use protocol::{ShardEnvelope, ShardMessage};
pub use security::SecretString;
pub use settings::Settings;
pub use shard::{Shard, ShardCollection, ShardPersistentState};
