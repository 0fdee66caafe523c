use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use stockchat_core::ChatMessage;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::hub::{ClientId, HubHandle, Outbound};

/// Largest inbound text frame accepted from a participant, in bytes.
pub const MAX_FRAME_SIZE: usize = 280;

/// How long a peer may stay silent (no pong) before it is considered dead.
const PONG_WAIT: Duration = Duration::from_secs(60);
/// Ping cadence: 9/10 of the pong deadline, so a probe always goes out
/// comfortably before the peer-side deadline can expire.
const PING_PERIOD: Duration = Duration::from_secs(54);
/// Cap on any single outbound write.
const WRITE_WAIT: Duration = Duration::from_secs(10);

const STOCK_COMMAND_PREFIX: &str = "/stock=";

/// Sink for stock-quote commands parsed out of inbound frames. Seam between
/// the read pump and the broker so the routing logic is testable in-memory.
#[async_trait]
pub trait CommandPublisher: Send + Sync {
    async fn publish(&self, stock_code: &str) -> anyhow::Result<()>;
}

#[async_trait]
impl CommandPublisher for stockchat_broker::StockPublisher {
    async fn publish(&self, stock_code: &str) -> anyhow::Result<()> {
        Ok(stockchat_broker::StockPublisher::publish(self, stock_code).await?)
    }
}

fn parse_stock_command(text: &str) -> Option<&str> {
    text.strip_prefix(STOCK_COMMAND_PREFIX)
}

/// Route one inbound text frame: a `/stock=` command is handed to the
/// publisher and acknowledged with a broadcast confirmation; anything else
/// is chat. Publish failures are logged and the command dropped.
async fn handle_frame(
    text: &str,
    nickname: &str,
    hub: &HubHandle,
    publisher: &dyn CommandPublisher,
) {
    if let Some(stock_code) = parse_stock_command(text) {
        if let Err(error) = publisher.publish(stock_code).await {
            tracing::warn!(stock_code = %stock_code, error = %error, "publishing stock command failed");
        }

        let confirmation = format!("Processing command for stock code: {stock_code}");
        let record = ChatMessage::new(nickname, confirmation.clone());
        let payload = format!("[{}] {}", record.timestamp.format("%H:%M:%S"), confirmation);
        hub.broadcast(Outbound {
            payload,
            record: Some(record),
        })
        .await;
        return;
    }

    hub.broadcast_chat(ChatMessage::new(nickname, text)).await;
}

/// Pull frames off the socket until cancellation, a read failure, a Close
/// frame, or 60 seconds of silence. Oversized frames surface as read errors
/// because the limit is enforced at the upgrade.
async fn read_pump(
    mut ws_rx: SplitStream<WebSocket>,
    nickname: String,
    hub: HubHandle,
    publisher: Arc<dyn CommandPublisher>,
    cancel: CancellationToken,
) {
    let mut deadline = Instant::now() + PONG_WAIT;

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return,
            frame = tokio::time::timeout_at(deadline, ws_rx.next()) => frame,
        };

        let message = match frame {
            Err(_) => {
                tracing::debug!("liveness deadline expired");
                return;
            }
            Ok(None) => return,
            Ok(Some(Err(error))) => {
                tracing::debug!(error = %error, "websocket read failed");
                return;
            }
            Ok(Some(Ok(message))) => message,
        };

        match message {
            WsMessage::Text(text) => {
                handle_frame(text.as_str(), &nickname, &hub, publisher.as_ref()).await;
            }
            WsMessage::Pong(_) => {
                deadline = Instant::now() + PONG_WAIT;
            }
            WsMessage::Close(_) => return,
            // axum answers pings on our behalf.
            _ => {}
        }
    }
}

/// Drain the mailbox onto the socket, pinging when idle. Payloads already
/// queued when one is pulled are coalesced into a single newline-separated
/// write. A closed-and-drained mailbox means the hub let go of this session;
/// the peer gets a Close frame.
async fn write_pump(
    mut ws_tx: SplitSink<WebSocket, WsMessage>,
    mut mailbox: mpsc::Receiver<String>,
    cancel: CancellationToken,
) {
    let mut ping = tokio::time::interval(PING_PERIOD);
    ping.tick().await; // consume first immediate tick

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            payload = mailbox.recv() => match payload {
                Some(first) => {
                    let mut batch = first;
                    while let Ok(next) = mailbox.try_recv() {
                        batch.push('\n');
                        batch.push_str(&next);
                    }
                    if !send_frame(&mut ws_tx, WsMessage::Text(batch.into())).await {
                        break;
                    }
                }
                None => {
                    let _ = send_frame(&mut ws_tx, WsMessage::Close(None)).await;
                    break;
                }
            },
            _ = ping.tick() => {
                if !send_frame(&mut ws_tx, WsMessage::Ping(Vec::new().into())).await {
                    break;
                }
            }
        }
    }

    let _ = ws_tx.close().await;
}

async fn send_frame(ws_tx: &mut SplitSink<WebSocket, WsMessage>, frame: WsMessage) -> bool {
    matches!(
        tokio::time::timeout(WRITE_WAIT, ws_tx.send(frame)).await,
        Ok(Ok(()))
    )
}

/// Run both pumps for an accepted connection and tear the session down once
/// either exits. Two triggers end a session: a local read/write failure, or
/// the hub closing the mailbox (unregister or backpressure eviction). Both
/// paths leave the socket closed and the session unregistered.
pub async fn handle_connection(
    socket: WebSocket,
    id: ClientId,
    nickname: String,
    hub: HubHandle,
    publisher: Arc<dyn CommandPublisher>,
    mailbox: mpsc::Receiver<String>,
) {
    let (ws_tx, ws_rx) = socket.split();
    let cancel = CancellationToken::new();

    let mut writer = tokio::spawn(write_pump(ws_tx, mailbox, cancel.clone()));
    let mut reader = tokio::spawn(read_pump(
        ws_rx,
        nickname,
        hub.clone(),
        publisher,
        cancel.clone(),
    ));

    tokio::select! {
        _ = &mut reader => {
            // Unregistering closes the mailbox; the writer drains what is
            // left, sends the close frame and exits on its own.
            hub.unregister(id.clone()).await;
            let _ = writer.await;
        }
        _ = &mut writer => {
            cancel.cancel();
            hub.unregister(id.clone()).await;
            let _ = reader.await;
        }
    }

    tracing::info!(client_id = %id, "connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::ClientSession;
    use std::sync::Mutex;

    struct RecordingPublisher {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingPublisher {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CommandPublisher for RecordingPublisher {
        async fn publish(&self, stock_code: &str) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(stock_code.to_string());
            Ok(())
        }
    }

    struct FailingPublisher;

    #[async_trait]
    impl CommandPublisher for FailingPublisher {
        async fn publish(&self, _stock_code: &str) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("broker unavailable"))
        }
    }

    async fn register_observer(hub: &HubHandle) -> (ClientId, mpsc::Receiver<String>) {
        let id = ClientId::new();
        let (tx, rx) = mpsc::channel(8);
        hub.register(ClientSession {
            id: id.clone(),
            nickname: "observer".into(),
            mailbox: tx,
        })
        .await;
        (id, rx)
    }

    #[test]
    fn stock_prefix_parsing() {
        assert_eq!(parse_stock_command("/stock=GOOGL.US"), Some("GOOGL.US"));
        assert_eq!(parse_stock_command("/stock="), Some(""));
        assert_eq!(parse_stock_command("Hello"), None);
        assert_eq!(parse_stock_command("stock=GOOGL.US"), None);
    }

    #[tokio::test]
    async fn chat_frame_broadcasts_author_and_content() {
        let (hub, _task) = HubHandle::spawn();
        let (_id, mut rx) = register_observer(&hub).await;
        let publisher = RecordingPublisher::new();

        handle_frame("Hello", "TestUser", &hub, &publisher).await;
        hub.count().await;

        let payload = rx.try_recv().unwrap();
        assert!(payload.contains("TestUser"));
        assert!(payload.contains("Hello"));
        assert!(publisher.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stock_frame_publishes_and_confirms() {
        let (hub, _task) = HubHandle::spawn();
        let (_id, mut rx) = register_observer(&hub).await;
        let publisher = RecordingPublisher::new();

        hub.count().await;
        handle_frame("/stock=GOOGL.US", "TestUser", &hub, &publisher).await;
        hub.count().await;

        assert_eq!(*publisher.calls.lock().unwrap(), vec!["GOOGL.US"]);

        let payload = rx.try_recv().unwrap();
        assert!(payload.contains("Processing command for stock code: GOOGL.US"));
        // The raw command must not be relayed as chat.
        assert!(!payload.contains("/stock="));
    }

    #[tokio::test]
    async fn publish_failure_still_confirms() {
        let (hub, _task) = HubHandle::spawn();
        let (_id, mut rx) = register_observer(&hub).await;

        hub.count().await;
        handle_frame("/stock=AAPL.US", "TestUser", &hub, &FailingPublisher).await;
        hub.count().await;

        let payload = rx.try_recv().unwrap();
        assert!(payload.contains("Processing command for stock code: AAPL.US"));
    }

    #[tokio::test]
    async fn confirmation_lands_in_history() {
        let (hub, _task) = HubHandle::spawn();
        let publisher = RecordingPublisher::new();

        handle_frame("/stock=AAPL.US", "TestUser", &hub, &publisher).await;
        hub.count().await;

        let (_id, mut rx) = register_observer(&hub).await;
        hub.count().await;

        let replayed = rx.try_recv().unwrap();
        assert!(replayed.contains("Processing command for stock code: AAPL.US"));
    }
}
