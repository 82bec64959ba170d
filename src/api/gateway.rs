//! Registry of connected WebSocket clients and channel fan-out
//!
//! Each client owns a bounded outbound queue drained by its connection task.
//! Broadcasts serialize the `{type, data}` envelope once and `try_send` it to
//! every subscribed client; a full or closed queue only loses that message
//! for that client. Direct replies (`send_to`) wait for room in the queue,
//! up to [`REPLY_TIMEOUT`].

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, close_code};
use serde::Serialize;
use serde_json::json;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, trace, warn};

use super::types::ServerMessage;

pub type ClientId = u64;

/// Channel carrying `alert-created` / `alert-cleared` messages
pub const ALERTS_CHANNEL: &str = "alerts";

/// Longest a direct reply waits for room in a client's queue
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct ClientConnection {
    subscriptions: HashSet<String>,
    tx: mpsc::Sender<Message>,
}

#[derive(Debug)]
pub struct Gateway {
    clients: RwLock<HashMap<ClientId, ClientConnection>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl Gateway {
    /// Create a gateway whose clients buffer up to `buffer` outbound messages
    pub fn new(buffer: usize) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Add a client with no subscriptions
    ///
    /// The returned receiver yields everything addressed to the client and
    /// ends once the client is unregistered.
    pub async fn register(&self) -> (ClientId, mpsc::Receiver<Message>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);

        self.clients.write().await.insert(
            id,
            ClientConnection {
                subscriptions: HashSet::new(),
                tx,
            },
        );

        debug!("registered client {id}");
        (id, rx)
    }

    /// Remove a client, closing its outbound queue
    pub async fn unregister(&self, id: ClientId) -> bool {
        let removed = self.clients.write().await.remove(&id).is_some();
        if removed {
            debug!("unregistered client {id}");
        }
        removed
    }

    /// Add channels to a client's subscriptions
    pub async fn subscribe(&self, id: ClientId, channels: &[String]) -> bool {
        let mut clients = self.clients.write().await;
        let Some(client) = clients.get_mut(&id) else {
            return false;
        };

        client.subscriptions.extend(channels.iter().cloned());
        trace!("client {id} subscriptions: {:?}", client.subscriptions);
        true
    }

    pub async fn unsubscribe(&self, id: ClientId, channels: &[String]) -> bool {
        let mut clients = self.clients.write().await;
        let Some(client) = clients.get_mut(&id) else {
            return false;
        };

        for channel in channels {
            client.subscriptions.remove(channel);
        }
        trace!("client {id} subscriptions: {:?}", client.subscriptions);
        true
    }

    /// Channels a client is subscribed to, sorted
    pub async fn subscriptions(&self, id: ClientId) -> Option<Vec<String>> {
        let clients = self.clients.read().await;
        let client = clients.get(&id)?;

        let mut channels: Vec<String> = client.subscriptions.iter().cloned().collect();
        channels.sort();
        Some(channels)
    }

    /// Send `{type, data}` to every client subscribed to `channel`
    ///
    /// Returns the number of clients the message was queued for.
    pub async fn broadcast(
        &self,
        message_type: &str,
        payload: &impl Serialize,
        channel: &str,
    ) -> usize {
        let text = match serde_json::to_string(&json!({
            "type": message_type,
            "data": payload,
        })) {
            Ok(text) => text,
            Err(e) => {
                warn!("failed to serialize {message_type} broadcast: {e}");
                return 0;
            }
        };

        let clients = self.clients.read().await;
        let mut delivered = 0;

        for (id, client) in clients.iter() {
            if !client.subscriptions.contains(channel) {
                continue;
            }

            match client.tx.try_send(Message::Text(text.clone())) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!("client {id} queue full, dropping {message_type}");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    trace!("client {id} queue closed, skipping {message_type}");
                }
            }
        }

        trace!("broadcast {message_type} on {channel} to {delivered} clients");
        delivered
    }

    /// Queue a message for one client
    ///
    /// Unlike broadcasts, a full queue is waited on rather than skipped.
    pub async fn send_to(&self, id: ClientId, message: &ServerMessage) -> bool {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                warn!("failed to serialize message for client {id}: {e}");
                return false;
            }
        };

        let tx = match self.clients.read().await.get(&id) {
            Some(client) => client.tx.clone(),
            None => return false,
        };

        match tokio::time::timeout(REPLY_TIMEOUT, tx.send(Message::Text(text))).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => {
                trace!("client {id} queue closed, reply not sent");
                false
            }
            Err(_) => {
                warn!("client {id} queue stayed full for {REPLY_TIMEOUT:?}, reply not sent");
                false
            }
        }
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Remove every client, sending each a close frame
    ///
    /// Returns the number of clients that were connected.
    pub async fn close_all(&self) -> usize {
        let clients: Vec<(ClientId, ClientConnection)> =
            self.clients.write().await.drain().collect();

        for (id, client) in &clients {
            let frame = CloseFrame {
                code: close_code::AWAY,
                reason: "dashboard shutting down".into(),
            };
            if client.tx.try_send(Message::Close(Some(frame))).is_err() {
                trace!("client {id} did not accept close frame");
            }
        }

        debug!("closed {} client connections", clients.len());
        clients.len()
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new(256)
    }
}
