mod distributor;
mod participant;

pub use distributor::{DistributionError, DistributorOptions, SealReport, ShardDistributor};
pub use participant::DeliveryOutcome;
