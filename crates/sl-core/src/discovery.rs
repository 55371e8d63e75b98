//! Local network service advertisement model
//!
//! Advertisements carry an instance name, a port and a small attribute map.
//! Attribute values are hints only: nothing read from them is trusted until
//! the handshake and greeting have completed.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::device::RemoteDeviceInfo;
use crate::ids::{DeviceId, SessionId};
use crate::protocol::PROTOCOL_VERSION;

pub const ATTR_ROLE: &str = "role";
pub const ATTR_FUNC: &str = "func";
pub const ATTR_SESSION: &str = "session";
pub const ATTR_VERSION: &str = "version";
pub const ATTR_PROTOCOL: &str = "protocol";
pub const ATTR_REQ_ID: &str = "req_id";
pub const ATTR_INFO: &str = "info";

/// Role value of the device driving a flow.
pub const ROLE_PRIMARY: &str = "primary";

/// What the advertising device is offering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceFunction {
    Distribution,
    Aggregation,
    Redistribution,
}

impl ServiceFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceFunction::Distribution => "distribution",
            ServiceFunction::Aggregation => "aggregation",
            ServiceFunction::Redistribution => "redistribution",
        }
    }

    /// Instance name prefix used on the wire.
    pub fn instance_prefix(&self) -> &'static str {
        match self {
            ServiceFunction::Distribution => "dist",
            ServiceFunction::Aggregation => "aggr",
            ServiceFunction::Redistribution => "resd",
        }
    }

    /// Functions a receiver joins to obtain a new shard.
    pub fn hands_out_shards(&self) -> bool {
        matches!(
            self,
            ServiceFunction::Distribution | ServiceFunction::Redistribution
        )
    }
}

impl fmt::Display for ServiceFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "distribution" => Ok(ServiceFunction::Distribution),
            "aggregation" => Ok(ServiceFunction::Aggregation),
            "redistribution" => Ok(ServiceFunction::Redistribution),
            other => Err(format!("unknown service function: {other}")),
        }
    }
}

/// `<prefix>-<device id, first 12 chars>-<session id>`
pub fn instance_name(function: ServiceFunction, device_id: &DeviceId, session_id: &SessionId) -> String {
    format!(
        "{}-{}-{}",
        function.instance_prefix(),
        device_id.short(12),
        session_id
    )
}

/// What a device publishes on the local network while hosting a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAdvertisement {
    pub instance_name: String,
    pub port: u16,
    pub attributes: BTreeMap<String, String>,
}

impl ServiceAdvertisement {
    pub fn new(
        function: ServiceFunction,
        local: &RemoteDeviceInfo,
        session_id: &SessionId,
        version: u64,
        port: u16,
    ) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(ATTR_ROLE.to_string(), ROLE_PRIMARY.to_string());
        attributes.insert(ATTR_FUNC.to_string(), function.as_str().to_string());
        attributes.insert(ATTR_SESSION.to_string(), session_id.to_string());
        attributes.insert(ATTR_VERSION.to_string(), version.to_string());
        attributes.insert(ATTR_PROTOCOL.to_string(), PROTOCOL_VERSION.to_string());
        attributes.insert(
            ATTR_REQ_ID.to_string(),
            hex::encode(rand::random::<[u8; 8]>()),
        );
        if let Ok(info) = local.to_attribute() {
            attributes.insert(ATTR_INFO.to_string(), info);
        }
        Self {
            instance_name: instance_name(function, &local.device_id, session_id),
            port,
            attributes,
        }
    }

    pub fn with_attributes(mut self, extra: BTreeMap<String, String>) -> Self {
        self.attributes.extend(extra);
        self
    }
}

/// Browse notifications. A `Lost` only names the instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    Found(ResolvedService),
    Lost { instance_name: String },
}

/// An advertisement seen on the network, with its address resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedService {
    pub instance_name: String,
    pub host: String,
    pub port: u16,
    pub attributes: BTreeMap<String, String>,
}

impl ResolvedService {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn function(&self) -> Option<ServiceFunction> {
        self.attribute(ATTR_FUNC)?.parse().ok()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.attribute(ATTR_SESSION).map(SessionId::from)
    }

    pub fn version(&self) -> Option<u64> {
        self.attribute(ATTR_VERSION)?.parse().ok()
    }

    pub fn protocol(&self) -> Option<u32> {
        self.attribute(ATTR_PROTOCOL)?.parse().ok()
    }

    pub fn is_primary(&self) -> bool {
        self.attribute(ATTR_ROLE) == Some(ROLE_PRIMARY)
    }

    /// Advertised device descriptor, unverified.
    pub fn device_hint(&self) -> Option<RemoteDeviceInfo> {
        RemoteDeviceInfo::from_attribute(self.attribute(ATTR_INFO)?)
    }

    pub fn socket_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}
