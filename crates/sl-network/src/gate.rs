use async_trait::async_trait;
use sl_core::ports::{EventSinkPort, OperatorDecision, OperatorPort};
use sl_core::{ConnectionId, PairingCode, ShardEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Decides whether an authenticated connection may proceed to identity exchange.
#[async_trait]
pub trait ConnectionGate: Send + Sync {
    async fn admit(&self, connection_id: &ConnectionId, code: &PairingCode) -> OperatorDecision;
}

/// Shows the pairing code to the operator and waits for a verdict.
///
/// No answer within `timeout` counts as a denial.
pub struct OperatorGate {
    operator: Arc<dyn OperatorPort>,
    events: Arc<dyn EventSinkPort>,
    timeout: Duration,
}

impl OperatorGate {
    pub fn new(
        operator: Arc<dyn OperatorPort>,
        events: Arc<dyn EventSinkPort>,
        timeout: Duration,
    ) -> Self {
        Self {
            operator,
            events,
            timeout,
        }
    }
}

#[async_trait]
impl ConnectionGate for OperatorGate {
    async fn admit(&self, connection_id: &ConnectionId, code: &PairingCode) -> OperatorDecision {
        self.events
            .emit(ShardEvent::PairingCodeReady {
                connection_id: connection_id.clone(),
                code: code.clone(),
            })
            .await;

        match tokio::time::timeout(
            self.timeout,
            self.operator.confirm_pairing_code(connection_id, code),
        )
        .await
        {
            Ok(decision) => {
                info!(%connection_id, approved = decision.is_approved(), "operator answered pairing code");
                decision
            }
            Err(_) => {
                warn!(%connection_id, timeout_ms = self.timeout.as_millis() as u64, "operator confirmation timed out");
                OperatorDecision::Denied
            }
        }
    }
}
