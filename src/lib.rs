//! # shardlink
//!
//! Pair nearby devices over the LAN and spread a wallet secret across them as
//! M-of-N shards: distribute, aggregate back, and redistribute under a new
//! version.
//!
//! ```ignore
//! let settings = shardlink::bootstrap::config::load_settings_or_default(path)?;
//! shardlink::bootstrap::init_tracing_subscriber(&settings.logging)?;
//! let link = shardlink::ShardLink::new(settings, ports)?;
//! let distributor = link.distribute(secret).await?;
//! ```

pub mod bootstrap;
mod node;

pub use node::{ShardLink, INITIAL_VERSION};
pub use sl_app as app;
pub use sl_core as core;
pub use sl_network as network;
