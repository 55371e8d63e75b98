use serde::{Deserialize, Serialize};

use crate::crypto::PairingCode;
use crate::device::RemoteDeviceInfo;
use crate::ids::{ConnectionId, DeviceId, SessionId};
use crate::shard::ShardPersistentState;

/// Events surfaced to the embedding UI.
///
/// 由编排器发出，供界面订阅展示；不包含任何秘密材料。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShardEvent {
    /// Both sides of a connection derived the same code; the operator should compare.
    PairingCodeReady {
        connection_id: ConnectionId,
        code: PairingCode,
    },
    ParticipantJoined {
        session_id: SessionId,
        device: RemoteDeviceInfo,
    },
    ParticipantLeft {
        session_id: SessionId,
        device_id: DeviceId,
    },
    ThresholdChanged {
        session_id: SessionId,
        threshold: u8,
        max: u8,
    },
    DistributionSealed {
        session_id: SessionId,
        threshold: u8,
        total: u8,
    },
    ShardDelivered {
        session_id: SessionId,
        device_id: DeviceId,
        saved: bool,
    },
    ShardStateChanged {
        session_id: SessionId,
        state: ShardPersistentState,
    },
    DataVerified {
        session_id: SessionId,
    },
    DataVerifyFailed {
        session_id: SessionId,
        reason: String,
    },
    AggregationProgress {
        session_id: SessionId,
        collected: usize,
        required: usize,
    },
    AggregationComplete {
        session_id: SessionId,
    },
    AggregationFailed {
        session_id: SessionId,
        reason: String,
    },
}
