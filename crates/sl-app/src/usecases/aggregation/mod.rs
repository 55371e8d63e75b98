mod aggregator;

pub use aggregator::{AggregationError, ReconstructedSecret, ShardAggregator};
