use async_trait::async_trait;
use sl_core::ports::OperatorDecision;
use sl_core::{ConnectionId, DeviceId, PairingCode, Platform, RemoteDeviceInfo};

use crate::gate::ConnectionGate;

pub(crate) fn device(name: &str) -> RemoteDeviceInfo {
    RemoteDeviceInfo {
        device_id: DeviceId::from(format!("{name}-device")),
        name: name.to_string(),
        platform: Platform::Linux,
        model: "test".to_string(),
        app_version: "0.1.0".to_string(),
    }
}

pub(crate) struct ScriptedGate(pub OperatorDecision);

#[async_trait]
impl ConnectionGate for ScriptedGate {
    async fn admit(&self, _connection_id: &ConnectionId, _code: &PairingCode) -> OperatorDecision {
        self.0
    }
}
