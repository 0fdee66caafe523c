use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::hub::HubHandle;

/// Source of quote responses drained by the bridge. Implemented by the
/// broker subscriber; tests drive the bridge from an in-memory queue.
#[async_trait]
pub trait ResponseSource: Send + 'static {
    /// Next payload, or `None` once the source is exhausted.
    async fn next(&mut self) -> Option<String>;
}

#[async_trait]
impl ResponseSource for stockchat_broker::ResponseSubscriber {
    async fn next(&mut self) -> Option<String> {
        stockchat_broker::ResponseSubscriber::next(self).await
    }
}

/// Forward every payload from `source` verbatim into the hub's broadcast
/// path. Responses are not chat records; they fan out but are never stored
/// in history. Runs for the life of the source.
pub fn start<S: ResponseSource>(mut source: S, hub: HubHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(payload) = source.next().await {
            tracing::info!(payload = %payload, "stock response received");
            hub.broadcast_text(payload).await;
        }
        tracing::info!("response bridge stopped");
    })
}
