//! Find a host advertisement on the local network.

use sl_core::discovery::{DiscoveryEvent, ResolvedService, ServiceFunction};
use sl_core::ports::{DiscoveryError, DiscoveryPort};
use sl_core::protocol::PROTOCOL_VERSION;
use sl_core::{DeviceId, SessionId};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("no matching {function} service seen within {waited_ms} ms")]
    NotFound {
        function: ServiceFunction,
        waited_ms: u64,
    },
}

/// What a caller is looking for. Attributes are hints, so a match here only
/// decides whom to dial; trust comes from the handshake and pairing code.
#[derive(Debug, Clone)]
pub struct ServiceQuery {
    pub function: ServiceFunction,
    pub session_id: Option<SessionId>,
    /// Usually the local device, so a host never dials itself.
    pub exclude_device: Option<DeviceId>,
}

impl ServiceQuery {
    pub fn new(function: ServiceFunction) -> Self {
        Self {
            function,
            session_id: None,
            exclude_device: None,
        }
    }

    pub fn session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn excluding(mut self, device_id: DeviceId) -> Self {
        self.exclude_device = Some(device_id);
        self
    }

    pub fn matches(&self, service: &ResolvedService) -> bool {
        if !service.is_primary() || service.function() != Some(self.function) {
            return false;
        }
        if service.protocol() != Some(PROTOCOL_VERSION) {
            return false;
        }
        if let Some(session_id) = &self.session_id {
            if service.session_id().as_ref() != Some(session_id) {
                return false;
            }
        }
        if let (Some(excluded), Some(hint)) = (&self.exclude_device, service.device_hint()) {
            if &hint.device_id == excluded {
                return false;
            }
        }
        true
    }
}

/// Browse until a matching service is found or `timeout` elapses.
pub async fn find_service(
    discovery: &dyn DiscoveryPort,
    query: &ServiceQuery,
    timeout: Duration,
) -> Result<ResolvedService, LookupError> {
    let mut events = discovery.browse().await?;
    let search = async {
        while let Some(event) = events.recv().await {
            if let DiscoveryEvent::Found(service) = event {
                if query.matches(&service) {
                    return Some(service);
                }
                debug!(instance = %service.instance_name, "skipping non-matching service");
            }
        }
        None
    };

    match tokio::time::timeout(timeout, search).await {
        Ok(Some(service)) => Ok(service),
        _ => Err(LookupError::NotFound {
            function: query.function,
            waited_ms: timeout.as_millis() as u64,
        }),
    }
}
