use async_trait::async_trait;
use sl_core::discovery::{DiscoveryEvent, ResolvedService, ServiceAdvertisement};
use sl_core::ports::{DiscoveryError, DiscoveryPort};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::warn;

const BROWSE_QUEUE_DEPTH: usize = 64;

#[derive(Default)]
struct HubState {
    services: BTreeMap<String, ResolvedService>,
    subscribers: Vec<mpsc::Sender<DiscoveryEvent>>,
}

impl HubState {
    fn broadcast(&mut self, event: DiscoveryEvent) {
        self.subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("discovery subscriber lagging, event dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

/// Shared "network" for in-process discovery. Every handle created from the
/// same hub sees the others' advertisements.
#[derive(Clone, Default)]
pub struct InMemoryDiscoveryHub {
    state: Arc<Mutex<HubState>>,
}

impl InMemoryDiscoveryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle whose advertisements resolve to `host`.
    pub fn handle(&self, host: impl Into<String>) -> InMemoryDiscovery {
        InMemoryDiscovery {
            hub: self.clone(),
            host: host.into(),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut HubState) -> T) -> Result<T, DiscoveryError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| DiscoveryError::Unavailable("discovery hub poisoned".to_string()))?;
        Ok(f(&mut state))
    }
}

#[derive(Clone)]
pub struct InMemoryDiscovery {
    hub: InMemoryDiscoveryHub,
    host: String,
}

#[async_trait]
impl DiscoveryPort for InMemoryDiscovery {
    async fn advertise(&self, advertisement: ServiceAdvertisement) -> Result<(), DiscoveryError> {
        let service = ResolvedService {
            instance_name: advertisement.instance_name,
            host: self.host.clone(),
            port: advertisement.port,
            attributes: advertisement.attributes,
        };
        self.hub.with_state(|state| {
            state
                .services
                .insert(service.instance_name.clone(), service.clone());
            state.broadcast(DiscoveryEvent::Found(service));
        })
    }

    async fn withdraw(&self, instance_name: &str) -> Result<(), DiscoveryError> {
        self.hub.with_state(|state| {
            if state.services.remove(instance_name).is_some() {
                state.broadcast(DiscoveryEvent::Lost {
                    instance_name: instance_name.to_string(),
                });
            }
        })
    }

    async fn browse(&self) -> Result<mpsc::Receiver<DiscoveryEvent>, DiscoveryError> {
        let (tx, rx) = mpsc::channel(BROWSE_QUEUE_DEPTH);
        self.hub.with_state(|state| {
            for service in state.services.values() {
                let _ = tx.try_send(DiscoveryEvent::Found(service.clone()));
            }
            state.subscribers.push(tx);
        })?;
        Ok(rx)
    }

    async fn resolve(&self, instance_name: &str) -> Result<Option<ResolvedService>, DiscoveryError> {
        self.hub
            .with_state(|state| state.services.get(instance_name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advertisement(name: &str) -> ServiceAdvertisement {
        ServiceAdvertisement {
            instance_name: name.to_string(),
            port: 4000,
            attributes: BTreeMap::from([("func".to_string(), "distribution".to_string())]),
        }
    }

    #[tokio::test]
    async fn browse_sees_existing_and_new_services() {
        let hub = InMemoryDiscoveryHub::new();
        let host = hub.handle("127.0.0.1");
        let peer = hub.handle("127.0.0.1");

        host.advertise(advertisement("dist-a")).await.unwrap();
        let mut events = peer.browse().await.unwrap();
        host.advertise(advertisement("dist-b")).await.unwrap();

        let names: Vec<String> = [events.recv().await.unwrap(), events.recv().await.unwrap()]
            .into_iter()
            .map(|event| match event {
                DiscoveryEvent::Found(service) => service.instance_name,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(names, vec!["dist-a", "dist-b"]);
    }

    #[tokio::test]
    async fn withdraw_emits_lost_and_stops_resolving() {
        let hub = InMemoryDiscoveryHub::new();
        let host = hub.handle("127.0.0.1");
        host.advertise(advertisement("dist-a")).await.unwrap();
        let mut events = host.browse().await.unwrap();
        let _ = events.recv().await;

        let resolved = host.resolve("dist-a").await.unwrap().unwrap();
        assert_eq!(resolved.port, 4000);
        assert_eq!(resolved.host, "127.0.0.1");

        host.withdraw("dist-a").await.unwrap();
        assert_eq!(
            events.recv().await,
            Some(DiscoveryEvent::Lost {
                instance_name: "dist-a".to_string()
            })
        );
        assert_eq!(host.resolve("dist-a").await.unwrap(), None);
        host.withdraw("dist-a").await.unwrap();
    }
}
