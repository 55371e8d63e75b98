use async_trait::async_trait;
use sl_core::ports::EventSinkPort;
use sl_core::ShardEvent;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

const SUBSCRIBER_QUEUE_DEPTH: usize = 256;

/// Fans presentation events out to every subscriber.
///
/// Publishing never waits on a slow subscriber: a full queue drops the event
/// for that subscriber only. 订阅者断开后会在下一次发送时被移除。
#[derive(Clone, Default)]
pub struct EventHub {
    senders: Arc<Mutex<Vec<mpsc::Sender<ShardEvent>>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self) -> mpsc::Receiver<ShardEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        self.senders.lock().await.push(tx);
        rx
    }

    pub async fn publish(&self, event: ShardEvent) {
        let mut senders = self.senders.lock().await;
        senders.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("shard event subscriber lagging, event dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("shard event receiver dropped");
                false
            }
        });
    }
}

#[async_trait]
impl EventSinkPort for EventHub {
    async fn emit(&self, event: ShardEvent) {
        self.publish(event).await;
    }
}
