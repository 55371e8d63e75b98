//! shardlink Application Orchestration Layer
//!
//! Use cases that drive the network and core crates: distributing a secret,
//! receiving and serving shards, aggregating them back and redistributing
//! under a new version.

pub mod deps;
pub mod event;
pub mod usecases;

pub use deps::AppDeps;
pub use event::EventHub;
pub use usecases::aggregation::{AggregationError, ReconstructedSecret, ShardAggregator};
pub use usecases::distribution::{
    DeliveryOutcome, DistributionError, DistributorOptions, SealReport, ShardDistributor,
};
pub use usecases::lookup::{find_service, LookupError, ServiceQuery};
pub use usecases::receiving::{
    HolderError, HolderOutcome, ReceiverError, ShardHolder, ShardReceiver,
};
pub use usecases::redistribution::{RedistributionController, RedistributionError};
