use sl_core::settings::NetworkSettings;
use std::ops::RangeInclusive;

use crate::establish::EstablishConfig;

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub bind_host: String,
    pub port_range: RangeInclusive<u16>,
    pub bind_attempts: u32,
    /// Ready connections buffered for the owning orchestrator.
    pub ready_queue_depth: usize,
    pub establish: EstablishConfig,
}

impl From<&NetworkSettings> for ListenerConfig {
    fn from(settings: &NetworkSettings) -> Self {
        Self {
            bind_host: settings.bind_host.clone(),
            port_range: settings.port_range_start..=settings.port_range_end,
            bind_attempts: settings.bind_attempts,
            ready_queue_depth: 16,
            establish: EstablishConfig::from(settings),
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self::from(&NetworkSettings::default())
    }
}
