//! Concurrency-safe set of admitted connections.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hubcast_core::ConnectionId;
use metrics::{counter, gauge};
use tracing::{debug, info, warn};

use crate::metrics::{WS_BROADCAST_DROPS_TOTAL, WS_CONNECTIONS_ACTIVE, WS_DISCONNECTIONS_TOTAL};
use crate::websocket::connection::{Connection, SendOutcome};

/// Why a frame did not reach a member's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("send queue full")]
    QueueFull,
    #[error("connection closed")]
    Closed,
    #[error("slow consumer: {dropped} frames dropped")]
    SlowConsumer { dropped: u64 },
}

impl DeliveryError {
    /// Whether the member should leave the registry.
    pub fn is_fatal(self) -> bool {
        !matches!(self, Self::QueueFull)
    }
}

/// Open, authenticated connections keyed by id.
///
/// Membership changes and fan-out may run concurrently from any task.
pub struct ConnectionRegistry {
    members: DashMap<ConnectionId, Arc<Connection>>,
    max_dropped_messages: u64,
}

impl ConnectionRegistry {
    pub fn new(max_dropped_messages: u64) -> Self {
        Self {
            members: DashMap::new(),
            max_dropped_messages: max_dropped_messages.max(1),
        }
    }

    /// Admit a connection. Returns `false` if it was already a member; the
    /// existing entry is kept.
    pub fn add(&self, connection: Arc<Connection>) -> bool {
        let added = match self.members.entry(connection.id().clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let _ = slot.insert(connection);
                true
            }
        };
        if added {
            self.record_size();
        }
        added
    }

    /// Remove and close a member. Returns `false` if it was not present.
    pub fn remove(&self, id: &ConnectionId) -> bool {
        let Some((_, connection)) = self.members.remove(id) else {
            return false;
        };
        connection.close();
        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        self.record_size();
        true
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.members.contains_key(id)
    }

    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.members.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Current members. Later changes are not reflected.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.members
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Enqueue `frame` on one member.
    pub fn deliver(&self, connection: &Connection, frame: Arc<str>) -> Result<(), DeliveryError> {
        match connection.send(frame) {
            SendOutcome::Queued => Ok(()),
            SendOutcome::Closed => Err(DeliveryError::Closed),
            SendOutcome::Full => {
                counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
                let dropped = connection.drop_count();
                if dropped >= self.max_dropped_messages {
                    Err(DeliveryError::SlowConsumer { dropped })
                } else {
                    Err(DeliveryError::QueueFull)
                }
            }
        }
    }

    /// Enqueue `frame` on every member without waiting on any of them.
    ///
    /// Members found closed, or past the drop limit, are evicted once the
    /// pass is over. Returns the number of members the frame was queued for.
    pub fn broadcast(&self, frame: Arc<str>) -> usize {
        let mut delivered = 0;
        let mut evict = Vec::new();

        for entry in &self.members {
            let connection = entry.value();
            match self.deliver(connection, Arc::clone(&frame)) {
                Ok(()) => delivered += 1,
                Err(e) if e.is_fatal() => evict.push((connection.id().clone(), e)),
                Err(e) => {
                    warn!(conn_id = %connection.id(), dropped = connection.drop_count(), error = %e, "dropping frame");
                }
            }
        }

        for (id, reason) in evict {
            if self.remove(&id) {
                match reason {
                    DeliveryError::SlowConsumer { dropped } => {
                        warn!(conn_id = %id, dropped, "evicting slow consumer");
                    }
                    _ => debug!(conn_id = %id, error = %reason, "evicting closed connection"),
                }
            }
        }

        delivered
    }

    /// Signal every member to close and empty the registry.
    pub fn close_all(&self) -> usize {
        let members = self.snapshot();
        for connection in &members {
            let _ = self.remove(connection.id());
        }
        if !members.is_empty() {
            info!(count = members.len(), "closed all connections");
        }
        members.len()
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_size(&self) {
        gauge!(WS_CONNECTIONS_ACTIVE).set(self.members.len() as f64);
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(100)
    }
}
