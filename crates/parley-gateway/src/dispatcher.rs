use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use parley_types::events::GatewayEvent;

/// Tracks the single live connection owned by each user and pushes targeted
/// events to it. State is scoped to the process lifetime: initialized empty
/// at startup, gone at shutdown.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// user_id -> (conn_id, sender). One entry per user, last writer wins.
    connections: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a user's live connection, replacing any previous one.
    /// Returns (conn_id, receiver).
    pub async fn register(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .connections
            .write()
            .await
            .insert(user_id, (conn_id, tx));
        (conn_id, rx)
    }

    /// Remove the user's entry, but only if `conn_id` still owns it. A stale
    /// disconnect from a connection already superseded by a newer one must
    /// not clobber the newer entry.
    pub async fn unregister(&self, user_id: Uuid, conn_id: Uuid) {
        let mut connections = self.inner.connections.write().await;
        if let Some((stored_conn_id, _)) = connections.get(&user_id) {
            if *stored_conn_id == conn_id {
                connections.remove(&user_id);
            }
        }
    }

    /// Current connection id for a user, if one is registered.
    pub async fn lookup(&self, user_id: Uuid) -> Option<Uuid> {
        self.inner
            .connections
            .read()
            .await
            .get(&user_id)
            .map(|(conn_id, _)| *conn_id)
    }

    /// Best-effort targeted push. No queue, no retry, no ack: an absent or
    /// closed receiver is ignored, and durable storage remains the source
    /// of truth.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) {
        let connections = self.inner.connections.read().await;
        if let Some((_, tx)) = connections.get(&user_id) {
            let _ = tx.send(event);
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
