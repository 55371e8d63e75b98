use crate::events::ShardEvent;

#[async_trait::async_trait]
pub trait EventSinkPort: Send + Sync {
    async fn emit(&self, event: ShardEvent);
}
