mod holder;
mod receiver;

pub use holder::{HolderError, HolderOutcome, ShardHolder};
pub use receiver::{ReceiverError, ShardReceiver};
