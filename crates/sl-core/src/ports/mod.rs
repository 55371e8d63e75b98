//! Port interfaces for the orchestration layer
//!
//! Ports are implemented by `sl-network` (discovery, operator gate adapters)
//! and `sl-infra` (storage, secret sharing, clock). Orchestrators depend on
//! these traits only, which keeps them testable with in-memory doubles.

mod authenticator;
mod clock;
mod discovery;
mod event_sink;
mod operator;
mod secret_sharing;
mod shard_store;

pub use authenticator::{AuthError, AuthenticatorPort};
pub use clock::ClockPort;
pub use discovery::{DiscoveryError, DiscoveryPort};
pub use event_sink::EventSinkPort;
pub use operator::{OperatorDecision, OperatorPort};
pub use secret_sharing::{SecretSharingError, SecretSharingPort, SharePart};
pub use shard_store::{ShardStoreError, ShardStorePort};
