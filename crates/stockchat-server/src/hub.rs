use std::collections::HashMap;
use std::fmt;

use stockchat_core::{ChatMessage, History};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Unique identifier for a connected chat participant.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    pub fn new() -> Self {
        Self(format!("client_{}", Uuid::now_v7()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered participant as the hub sees it: display name plus the
/// bounded outbound mailbox drained by that connection's write pump.
pub struct ClientSession {
    pub id: ClientId,
    pub nickname: String,
    pub mailbox: mpsc::Sender<String>,
}

/// One payload to fan out. `record` is present for chat content and is
/// appended to history once per broadcast, never per delivery.
pub struct Outbound {
    pub payload: String,
    pub record: Option<ChatMessage>,
}

enum HubCommand {
    Register(ClientSession),
    Unregister(ClientId),
    Broadcast(Outbound),
    Count(oneshot::Sender<usize>),
}

/// Sole owner of the client registry and the history buffer. All mutation
/// happens inside `run`, serialized by the command channel; external access
/// goes through a [`HubHandle`].
struct Hub {
    rx: mpsc::Receiver<HubCommand>,
    clients: HashMap<ClientId, ClientSession>,
    history: History,
}

impl Hub {
    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            match command {
                HubCommand::Register(session) => self.register(session),
                HubCommand::Unregister(id) => self.unregister(&id),
                HubCommand::Broadcast(outbound) => self.broadcast(outbound),
                HubCommand::Count(reply) => {
                    let _ = reply.send(self.clients.len());
                }
            }
        }
        tracing::debug!("hub loop stopped");
    }

    fn register(&mut self, session: ClientSession) {
        // Replay history oldest-first before the session can observe any
        // later broadcast. The mailbox holds 256 and history at most 50, so
        // a fresh mailbox always has room.
        for message in self.history.iter() {
            if session.mailbox.try_send(message.render()).is_err() {
                tracing::warn!(client_id = %session.id, "history replay overflowed mailbox");
                break;
            }
        }
        tracing::info!(
            client_id = %session.id,
            nickname = %session.nickname,
            "participant registered"
        );
        self.clients.insert(session.id.clone(), session);
    }

    fn unregister(&mut self, id: &ClientId) {
        // Removing the session drops the hub's mailbox sender, which is the
        // single close: the write pump drains what is left and shuts down.
        if self.clients.remove(id).is_some() {
            tracing::info!(client_id = %id, "participant unregistered");
        }
    }

    fn broadcast(&mut self, outbound: Outbound) {
        if let Some(record) = outbound.record {
            self.history.push(record);
        }

        let mut evicted = Vec::new();
        for (id, session) in &self.clients {
            match session.mailbox.try_send(outbound.payload.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(client_id = %id, "mailbox full, evicting slow participant");
                    evicted.push(id.clone());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    evicted.push(id.clone());
                }
            }
        }
        for id in evicted {
            self.clients.remove(&id);
        }
    }
}

/// Cloneable channel-backed handle; the only way to reach the hub.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    pub fn spawn() -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(64);
        let hub = Hub {
            rx,
            clients: HashMap::new(),
            history: History::new(),
        };
        let task = tokio::spawn(hub.run());
        (Self { tx }, task)
    }

    pub async fn register(&self, session: ClientSession) {
        let _ = self.tx.send(HubCommand::Register(session)).await;
    }

    pub async fn unregister(&self, id: ClientId) {
        let _ = self.tx.send(HubCommand::Unregister(id)).await;
    }

    pub async fn broadcast(&self, outbound: Outbound) {
        let _ = self.tx.send(HubCommand::Broadcast(outbound)).await;
    }

    /// Fan a chat message out and record it in history.
    pub async fn broadcast_chat(&self, message: ChatMessage) {
        let payload = message.render();
        self.broadcast(Outbound {
            payload,
            record: Some(message),
        })
        .await;
    }

    /// Fan a pre-rendered payload out without recording it.
    pub async fn broadcast_text(&self, payload: String) {
        self.broadcast(Outbound {
            payload,
            record: None,
        })
        .await;
    }

    /// Number of registered participants. Also serves as an ordering
    /// barrier: the reply comes after every previously sent command.
    pub async fn count(&self) -> usize {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self.tx.send(HubCommand::Count(reply_tx)).await;
        reply_rx.await.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &ClientId, capacity: usize) -> (ClientSession, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            ClientSession {
                id: id.clone(),
                nickname: "tester".into(),
                mailbox: tx,
            },
            rx,
        )
    }

    #[test]
    fn client_ids_unique() {
        let a = ClientId::new();
        let b = ClientId::new();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("client_"));
    }

    #[tokio::test]
    async fn register_then_broadcast_delivers() {
        let (hub, _task) = HubHandle::spawn();
        let id = ClientId::new();
        let (session, mut rx) = session(&id, 8);

        hub.register(session).await;
        hub.broadcast_text("hello everyone".into()).await;
        assert_eq!(hub.count().await, 1);

        assert_eq!(rx.try_recv().unwrap(), "hello everyone");
    }

    #[tokio::test]
    async fn unregister_closes_mailbox() {
        let (hub, _task) = HubHandle::spawn();
        let id = ClientId::new();
        let (session, mut rx) = session(&id, 8);

        hub.register(session).await;
        hub.unregister(id).await;
        assert_eq!(hub.count().await, 0);

        // Sender dropped by the hub: the mailbox reads as closed.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn unregister_unknown_is_noop() {
        let (hub, _task) = HubHandle::spawn();
        hub.unregister(ClientId::new()).await;
        assert_eq!(hub.count().await, 0);
    }

    #[tokio::test]
    async fn full_mailbox_evicted_during_broadcast() {
        let (hub, _task) = HubHandle::spawn();
        let slow = ClientId::new();
        let (slow_session, mut slow_rx) = session(&slow, 1);
        let fast = ClientId::new();
        let (fast_session, mut fast_rx) = session(&fast, 8);

        hub.register(slow_session).await;
        hub.register(fast_session).await;

        hub.broadcast_text("one".into()).await;
        // The slow mailbox is now full; this broadcast evicts it.
        hub.broadcast_text("two".into()).await;
        assert_eq!(hub.count().await, 1);

        // The fast participant saw everything.
        assert_eq!(fast_rx.try_recv().unwrap(), "one");
        assert_eq!(fast_rx.try_recv().unwrap(), "two");

        // The slow one got the first payload, then its mailbox was closed.
        assert_eq!(slow_rx.try_recv().unwrap(), "one");
        assert!(slow_rx.recv().await.is_none());

        // Subsequent broadcasts no longer reach it.
        hub.broadcast_text("three".into()).await;
        assert_eq!(hub.count().await, 1);
        assert_eq!(fast_rx.try_recv().unwrap(), "three");
    }

    #[tokio::test]
    async fn join_replays_history_in_order_before_new_broadcasts() {
        let (hub, _task) = HubHandle::spawn();

        hub.broadcast_chat(ChatMessage::new("alice", "first")).await;
        hub.broadcast_chat(ChatMessage::new("bob", "second")).await;

        let id = ClientId::new();
        let (joiner, mut rx) = session(&id, 8);
        hub.register(joiner).await;
        hub.broadcast_text("after join".into()).await;
        assert_eq!(hub.count().await, 1);

        let replayed_first = rx.try_recv().unwrap();
        let replayed_second = rx.try_recv().unwrap();
        assert!(replayed_first.contains("alice: first"));
        assert!(replayed_second.contains("bob: second"));
        assert_eq!(rx.try_recv().unwrap(), "after join");
    }

    #[tokio::test]
    async fn plain_payloads_are_not_recorded() {
        let (hub, _task) = HubHandle::spawn();
        hub.broadcast_text("quote response".into()).await;

        let id = ClientId::new();
        let (joiner, mut rx) = session(&id, 8);
        hub.register(joiner).await;
        assert_eq!(hub.count().await, 1);

        // Nothing was recorded, so nothing is replayed.
        assert!(rx.try_recv().is_err());
    }
}
