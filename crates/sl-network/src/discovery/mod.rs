//! Discovery adapters for [`sl_core::ports::DiscoveryPort`].
//!
//! - `mdns`: real multicast DNS on the local network
//! - `memory`: in-process hub, one per test or embedding process

mod mdns;
mod memory;

pub use mdns::MdnsDiscovery;
pub use memory::{InMemoryDiscovery, InMemoryDiscoveryHub};
