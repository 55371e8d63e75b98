pub mod aggregation;
pub mod distribution;
pub mod lookup;
pub mod receiving;
pub mod redistribution;
