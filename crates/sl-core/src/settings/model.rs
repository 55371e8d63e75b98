use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::{Platform, RemoteDeviceInfo};
use crate::ids::DeviceId;

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Stable id of this device. Generated on first load when absent.
    pub device_id: Option<DeviceId>,
    pub name: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub service_type: String,
    pub bind_host: String,
    pub port_range_start: u16,
    pub port_range_end: u16,
    pub bind_attempts: u32,
    pub max_frame_bytes: usize,
    pub handshake_timeout_ms: u64,
    pub greeting_timeout_ms: u64,
    pub operator_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionSettings {
    pub default_threshold: u8,
    pub max_shares: u8,
    pub ack_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationSettings {
    pub deadline_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedistributionSettings {
    pub witness_freshness_ms: i64,
    pub max_clock_skew_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory holding one JSON record per session. Unset means the
    /// platform data directory.
    pub shard_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingSettings {
    /// Overrides the build-dependent default level when set.
    pub level: Option<String>,
    /// When set, logs are also written to a daily rolling file here.
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "super::defaults::schema_version")]
    pub schema_version: u32,

    #[serde(default)]
    pub device: DeviceSettings,

    #[serde(default)]
    pub network: NetworkSettings,

    #[serde(default)]
    pub distribution: DistributionSettings,

    #[serde(default)]
    pub aggregation: AggregationSettings,

    #[serde(default)]
    pub redistribution: RedistributionSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl NetworkSettings {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn greeting_timeout(&self) -> Duration {
        Duration::from_millis(self.greeting_timeout_ms)
    }

    pub fn operator_timeout(&self) -> Duration {
        Duration::from_millis(self.operator_timeout_ms)
    }
}

impl DistributionSettings {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

impl AggregationSettings {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

impl Settings {
    /// Descriptor this device sends during identity exchange.
    pub fn local_device_info(&self, device_id: DeviceId, app_version: &str) -> RemoteDeviceInfo {
        RemoteDeviceInfo {
            device_id,
            name: self.device.name.clone(),
            platform: Platform::current(),
            model: self.device.model.clone(),
            app_version: app_version.to_string(),
        }
    }
}
