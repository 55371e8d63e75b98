mod collection;
mod shard;
mod state;

pub use collection::{CollectionError, CollectionProgress, ShardCollection};
pub use shard::Shard;
pub use state::ShardPersistentState;
