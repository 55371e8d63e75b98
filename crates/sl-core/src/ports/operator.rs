use async_trait::async_trait;

use crate::crypto::PairingCode;
use crate::ids::ConnectionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorDecision {
    Approved,
    Denied,
}

impl OperatorDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, OperatorDecision::Approved)
    }
}

/// Human-in-the-loop confirmation of the pairing code shown on both devices.
#[async_trait]
pub trait OperatorPort: Send + Sync {
    async fn confirm_pairing_code(
        &self,
        connection_id: &ConnectionId,
        code: &PairingCode,
    ) -> OperatorDecision;
}
