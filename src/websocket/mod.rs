//! In-process connection registry and realtime event fan-out.
//!
//! Every websocket connection gets an unbounded channel; the socket task
//! drains it. Connections are indexed per user (all of a user's devices)
//! and per room (explicit joins for typing indicators). Dead channels
//! are pruned whenever a send fails.

pub mod events;
pub mod handlers;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;
use uuid::Uuid;

pub type ConnectionId = u64;

#[derive(Default)]
struct RegistryInner {
    senders: HashMap<ConnectionId, UnboundedSender<Message>>,
    users: HashMap<Uuid, Vec<ConnectionId>>,
    rooms: HashMap<String, Vec<ConnectionId>>,
}

impl RegistryInner {
    fn drop_connection(&mut self, conn_id: ConnectionId) {
        self.senders.remove(&conn_id);
        for conns in self.users.values_mut() {
            conns.retain(|c| *c != conn_id);
        }
        self.users.retain(|_, conns| !conns.is_empty());
        for conns in self.rooms.values_mut() {
            conns.retain(|c| *c != conn_id);
        }
        self.rooms.retain(|_, conns| !conns.is_empty());
    }
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<RegistryInner>>,
    next_id: Arc<AtomicU64>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under the user. Returns the connection id,
    /// whether this was the user's first connection, and the receiving
    /// end the socket task must drain. The first-connection flag is
    /// computed under the same lock as the insert, so two devices
    /// racing to connect see exactly one `true` between them.
    pub async fn connect(&self, user_id: Uuid) -> (ConnectionId, bool, UnboundedReceiver<Message>) {
        let (tx, rx) = unbounded_channel();
        let conn_id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut guard = self.inner.write().await;
        guard.senders.insert(conn_id, tx);
        let conns = guard.users.entry(user_id).or_default();
        conns.push(conn_id);
        let was_first = conns.len() == 1;
        (conn_id, was_first, rx)
    }

    /// Remove the connection. Returns `true` when it was the user's last
    /// one, which is the signal to flip presence to offline.
    pub async fn disconnect(&self, user_id: Uuid, conn_id: ConnectionId) -> bool {
        let mut guard = self.inner.write().await;
        guard.drop_connection(conn_id);
        !guard.users.contains_key(&user_id)
    }

    /// Subscribe a live connection to a room channel. Unknown connection
    /// ids are ignored, repeated joins are a no-op.
    pub async fn join_room(&self, room_id: &str, conn_id: ConnectionId) {
        let mut guard = self.inner.write().await;
        if !guard.senders.contains_key(&conn_id) {
            return;
        }
        let conns = guard.rooms.entry(room_id.to_string()).or_default();
        if !conns.contains(&conn_id) {
            conns.push(conn_id);
        }
    }

    pub async fn connection_count(&self, user_id: Uuid) -> usize {
        let guard = self.inner.read().await;
        guard.users.get(&user_id).map(Vec::len).unwrap_or(0)
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.connection_count(user_id).await > 0
    }

    /// Push a frame to every connection of a user. Delivery is
    /// fire-and-forget; a user with no open connections is silently
    /// skipped.
    pub async fn send_to_user(&self, user_id: Uuid, msg: Message) {
        let mut guard = self.inner.write().await;
        let conns = match guard.users.get(&user_id) {
            Some(conns) => conns.clone(),
            None => return,
        };
        let mut dead = Vec::new();
        for conn_id in conns {
            let alive = guard
                .senders
                .get(&conn_id)
                .map(|tx| tx.send(msg.clone()).is_ok())
                .unwrap_or(false);
            if !alive {
                dead.push(conn_id);
            }
        }
        for conn_id in dead {
            guard.drop_connection(conn_id);
        }
    }

    /// Push a frame once to the union of a room's subscribers and a
    /// user's connections. Used for new-message delivery: the room
    /// channel reaches whoever has the chat open, the user channel
    /// reaches the recipient's other devices, and a connection in both
    /// sets still gets a single frame.
    pub async fn send_to_room_and_user(&self, room_id: &str, user_id: Uuid, msg: Message) {
        let mut guard = self.inner.write().await;
        let mut targets: Vec<ConnectionId> = guard
            .rooms
            .get(room_id)
            .map(|conns| conns.clone())
            .unwrap_or_default();
        if let Some(conns) = guard.users.get(&user_id) {
            for conn_id in conns {
                if !targets.contains(conn_id) {
                    targets.push(*conn_id);
                }
            }
        }
        let mut dead = Vec::new();
        for conn_id in targets {
            let alive = guard
                .senders
                .get(&conn_id)
                .map(|tx| tx.send(msg.clone()).is_ok())
                .unwrap_or(false);
            if !alive {
                dead.push(conn_id);
            }
        }
        for conn_id in dead {
            guard.drop_connection(conn_id);
        }
    }

    /// Push a frame to every connection subscribed to a room, optionally
    /// skipping the originating connection.
    pub async fn broadcast_room(
        &self,
        room_id: &str,
        msg: Message,
        except: Option<ConnectionId>,
    ) {
        let mut guard = self.inner.write().await;
        let conns = match guard.rooms.get(room_id) {
            Some(conns) => conns.clone(),
            None => return,
        };
        let mut dead = Vec::new();
        for conn_id in conns {
            if Some(conn_id) == except {
                continue;
            }
            let alive = guard
                .senders
                .get(&conn_id)
                .map(|tx| tx.send(msg.clone()).is_ok())
                .unwrap_or(false);
            if !alive {
                dead.push(conn_id);
            }
        }
        for conn_id in dead {
            guard.drop_connection(conn_id);
        }
    }

    /// Push a frame to every connected user, optionally skipping all of
    /// one user's connections. Used for presence changes.
    pub async fn broadcast_all(&self, msg: Message, except_user: Option<Uuid>) {
        let mut guard = self.inner.write().await;
        let targets: Vec<ConnectionId> = guard
            .users
            .iter()
            .filter(|(user_id, _)| Some(**user_id) != except_user)
            .flat_map(|(_, conns)| conns.iter().copied())
            .collect();
        let mut dead = Vec::new();
        for conn_id in targets {
            let alive = guard
                .senders
                .get(&conn_id)
                .map(|tx| tx.send(msg.clone()).is_ok())
                .unwrap_or(false);
            if !alive {
                dead.push(conn_id);
            }
        }
        for conn_id in dead {
            guard.drop_connection(conn_id);
        }
    }
}
