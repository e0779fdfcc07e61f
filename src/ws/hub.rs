//! Client hub: routes serialised server messages to live connections

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::game::Outbound;

/// Pre-serialised JSON text frame, shared between recipients
pub type Frame = Arc<str>;

/// Frames buffered per connection before new ones are dropped
pub const CONNECTION_BUFFER: usize = 256;

struct ConnectionSink {
    conn_id: u64,
    tx: mpsc::Sender<Frame>,
}

/// Identity -> live connections. One identity may hold several (tabs).
pub struct ClientHub {
    connections: DashMap<Uuid, Vec<ConnectionSink>>,
    next_conn_id: AtomicU64,
}

impl ClientHub {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Register a connection and return its id and outbound frame receiver
    pub fn register(&self, user_id: Uuid) -> (u64, mpsc::Receiver<Frame>) {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER);
        self.connections
            .entry(user_id)
            .or_default()
            .push(ConnectionSink { conn_id, tx });
        (conn_id, rx)
    }

    pub fn unregister(&self, user_id: Uuid, conn_id: u64) {
        let now_empty = match self.connections.get_mut(&user_id) {
            Some(mut sinks) => {
                sinks.retain(|sink| sink.conn_id != conn_id);
                sinks.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.connections.remove_if(&user_id, |_, sinks| sinks.is_empty());
        }
    }

    /// Deliver a frame to every connection of `user_id`. Returns how many accepted it.
    pub fn send_to_user(&self, user_id: Uuid, frame: &Frame) -> usize {
        let Some(mut sinks) = self.connections.get_mut(&user_id) else {
            return 0;
        };

        let mut delivered = 0;
        sinks.retain(|sink| match sink.tx.try_send(frame.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(user_id = %user_id, conn_id = sink.conn_id, "Client lagging, dropping frame");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(user_id = %user_id, conn_id = sink.conn_id, "Pruning closed connection");
                false
            }
        });
        delivered
    }

    /// Serialise each outbound message once and fan it out to its recipients
    pub fn dispatch(&self, outbound: Vec<Outbound>) {
        for Outbound { recipients, msg } in outbound {
            if recipients.is_empty() {
                continue;
            }
            let frame: Frame = match serde_json::to_string(&msg) {
                Ok(json) => json.into(),
                Err(e) => {
                    error!(error = %e, "Failed to serialise server message");
                    continue;
                }
            };
            for user_id in recipients {
                self.send_to_user(user_id, &frame);
            }
        }
    }

    /// Number of identities with at least one live connection
    pub fn connected_users(&self) -> usize {
        self.connections.len()
    }
}

impl Default for ClientHub {
    fn default() -> Self {
        Self::new()
    }
}
