mod platform;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::ids::DeviceId;

pub use platform::Platform;

/// Device descriptor exchanged during identity exchange.
///
/// Populated once per channel; a channel without one has not been greeted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDeviceInfo {
    pub device_id: DeviceId,
    pub name: String,
    pub platform: Platform,
    pub model: String,
    pub app_version: String,
}

impl RemoteDeviceInfo {
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Base64 of the JSON descriptor, as carried in the `info` advertisement attribute.
    pub fn to_attribute(&self) -> Result<String, serde_json::Error> {
        Ok(STANDARD.encode(self.to_json_bytes()?))
    }

    /// Decode an `info` advertisement attribute. Attributes are untrusted hints,
    /// so any malformed value yields `None`.
    pub fn from_attribute(value: &str) -> Option<Self> {
        let bytes = STANDARD.decode(value).ok()?;
        Self::from_json_bytes(&bytes).ok()
    }
}
