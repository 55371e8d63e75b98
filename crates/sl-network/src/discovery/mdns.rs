use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use sl_core::discovery::{DiscoveryEvent, ResolvedService, ServiceAdvertisement};
use sl_core::ports::{DiscoveryError, DiscoveryPort};
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

const BROWSE_QUEUE_DEPTH: usize = 64;

/// mDNS-SD backed discovery. Attributes travel as TXT records.
pub struct MdnsDiscovery {
    daemon: ServiceDaemon,
    service_type: String,
    /// instance name -> full service name
    advertised: AsyncMutex<HashMap<String, String>>,
    resolved: Arc<AsyncMutex<HashMap<String, ResolvedService>>>,
}

impl MdnsDiscovery {
    pub fn new(service_type: impl Into<String>) -> Result<Self, DiscoveryError> {
        let daemon = ServiceDaemon::new().map_err(|e| DiscoveryError::Unavailable(e.to_string()))?;
        Ok(Self {
            daemon,
            service_type: service_type.into(),
            advertised: AsyncMutex::new(HashMap::new()),
            resolved: Arc::new(AsyncMutex::new(HashMap::new())),
        })
    }

    pub fn shutdown(&self) {
        if let Err(err) = self.daemon.shutdown() {
            warn!(error = %err, "mdns daemon shutdown failed");
        }
    }

    fn instance_from_fullname(fullname: &str, service_type: &str) -> String {
        fullname
            .strip_suffix(service_type)
            .map(|name| name.trim_end_matches('.'))
            .unwrap_or(fullname)
            .to_string()
    }

    fn to_resolved(info: &ServiceInfo, service_type: &str) -> Option<ResolvedService> {
        let addresses = info.get_addresses();
        let host = addresses
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addresses.iter().next())
            .map(IpAddr::to_string)?;

        let attributes: BTreeMap<String, String> = info
            .get_properties()
            .iter()
            .map(|prop| (prop.key().to_string(), prop.val_str().to_string()))
            .collect();

        Some(ResolvedService {
            instance_name: Self::instance_from_fullname(info.get_fullname(), service_type),
            host,
            port: info.get_port(),
            attributes,
        })
    }
}

#[async_trait]
impl DiscoveryPort for MdnsDiscovery {
    async fn advertise(&self, advertisement: ServiceAdvertisement) -> Result<(), DiscoveryError> {
        let host_name = format!("{}.local.", advertisement.instance_name);
        let properties: HashMap<String, String> = advertisement.attributes.into_iter().collect();
        let info = ServiceInfo::new(
            &self.service_type,
            &advertisement.instance_name,
            &host_name,
            "",
            advertisement.port,
            properties,
        )
        .map_err(|e| DiscoveryError::Advertise(e.to_string()))?
        .enable_addr_auto();

        let fullname = info.get_fullname().to_string();
        self.daemon
            .register(info)
            .map_err(|e| DiscoveryError::Advertise(e.to_string()))?;

        info!(
            instance = %advertisement.instance_name,
            port = advertisement.port,
            "service advertised"
        );
        self.advertised
            .lock()
            .await
            .insert(advertisement.instance_name, fullname);
        Ok(())
    }

    async fn withdraw(&self, instance_name: &str) -> Result<(), DiscoveryError> {
        let Some(fullname) = self.advertised.lock().await.remove(instance_name) else {
            return Ok(());
        };
        self.daemon
            .unregister(&fullname)
            .map_err(|e| DiscoveryError::Advertise(e.to_string()))?;
        info!(instance = %instance_name, "service withdrawn");
        Ok(())
    }

    async fn browse(&self) -> Result<mpsc::Receiver<DiscoveryEvent>, DiscoveryError> {
        let receiver = self
            .daemon
            .browse(&self.service_type)
            .map_err(|e| DiscoveryError::Browse(e.to_string()))?;
        let (tx, rx) = mpsc::channel(BROWSE_QUEUE_DEPTH);
        let resolved = self.resolved.clone();
        let service_type = self.service_type.clone();
        let daemon = self.daemon.clone();

        tokio::spawn(async move {
            while let Ok(event) = receiver.recv_async().await {
                let forwarded = match event {
                    ServiceEvent::ServiceResolved(info) => {
                        let Some(service) = Self::to_resolved(&info, &service_type) else {
                            debug!(fullname = %info.get_fullname(), "resolved service without address");
                            continue;
                        };
                        resolved
                            .lock()
                            .await
                            .insert(service.instance_name.clone(), service.clone());
                        DiscoveryEvent::Found(service)
                    }
                    ServiceEvent::ServiceRemoved(_, fullname) => {
                        let instance_name = Self::instance_from_fullname(&fullname, &service_type);
                        resolved.lock().await.remove(&instance_name);
                        DiscoveryEvent::Lost { instance_name }
                    }
                    _ => continue,
                };
                if tx.send(forwarded).await.is_err() {
                    break;
                }
            }
            if let Err(err) = daemon.stop_browse(&service_type) {
                debug!(error = %err, "stop_browse failed");
            }
        });

        Ok(rx)
    }

    async fn resolve(&self, instance_name: &str) -> Result<Option<ResolvedService>, DiscoveryError> {
        Ok(self.resolved.lock().await.get(instance_name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_name_is_stripped_from_fullname() {
        assert_eq!(
            MdnsDiscovery::instance_from_fullname(
                "dist-0123456789ab-s1._shardlink._tcp.local.",
                "_shardlink._tcp.local."
            ),
            "dist-0123456789ab-s1"
        );
        assert_eq!(
            MdnsDiscovery::instance_from_fullname("other", "_shardlink._tcp.local."),
            "other"
        );
    }
}
