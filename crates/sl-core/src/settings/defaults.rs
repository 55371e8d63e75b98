use super::model::*;

pub(crate) fn schema_version() -> u32 {
    CURRENT_SCHEMA_VERSION
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            device_id: None,
            name: "shardlink device".to_string(),
            model: "unknown".to_string(),
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            service_type: "_shardlink._tcp.local.".to_string(),
            bind_host: "0.0.0.0".to_string(),
            port_range_start: 10000,
            port_range_end: 60000,
            bind_attempts: 10,
            max_frame_bytes: 64 * 1024,
            handshake_timeout_ms: 15_000,
            greeting_timeout_ms: 15_000,
            operator_timeout_ms: 120_000,
        }
    }
}

impl Default for DistributionSettings {
    fn default() -> Self {
        Self {
            default_threshold: 2,
            max_shares: 10,
            ack_timeout_ms: 30_000,
        }
    }
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self { deadline_ms: 120_000 }
    }
}

impl Default for RedistributionSettings {
    fn default() -> Self {
        Self {
            witness_freshness_ms: 60_000,
            max_clock_skew_ms: 5_000,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            device: DeviceSettings::default(),
            network: NetworkSettings::default(),
            distribution: DistributionSettings::default(),
            aggregation: AggregationSettings::default(),
            redistribution: RedistributionSettings::default(),
            storage: StorageSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}
