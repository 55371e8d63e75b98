pub mod defaults;
pub mod model;

pub use model::{
    AggregationSettings, DeviceSettings, DistributionSettings, LoggingSettings, NetworkSettings,
    RedistributionSettings, Settings, StorageSettings, CURRENT_SCHEMA_VERSION,
};
