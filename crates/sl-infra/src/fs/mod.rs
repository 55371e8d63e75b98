mod shard_store;

pub use shard_store::FileShardStore;
