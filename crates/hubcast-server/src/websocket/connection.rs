//! Admitted client connection state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hubcast_core::{ConnectionId, Principal};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Result of a non-blocking enqueue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Queued,
    /// Queue at capacity; the frame was dropped.
    Full,
    /// Writer gone or connection closing; the frame was dropped.
    Closed,
}

/// An open, authenticated client stream.
///
/// Frames are pushed onto a bounded queue that the connection's own writer
/// drains, so senders never wait on the network.
pub struct Connection {
    id: ConnectionId,
    /// Identity captured at upgrade time. Not re-validated.
    principal: Principal,
    tx: mpsc::Sender<Arc<str>>,
    pub connected_at: Instant,
    /// Set by any inbound frame, cleared by each heartbeat check.
    pub is_alive: AtomicBool,
    pub dropped_messages: AtomicU64,
    closed: CancellationToken,
}

impl Connection {
    pub fn new(principal: Principal, tx: mpsc::Sender<Arc<str>>, closed: CancellationToken) -> Self {
        Self::with_id(ConnectionId::generate(), principal, tx, closed)
    }

    pub fn with_id(
        id: ConnectionId,
        principal: Principal,
        tx: mpsc::Sender<Arc<str>>,
        closed: CancellationToken,
    ) -> Self {
        Self {
            id,
            principal,
            tx,
            connected_at: Instant::now(),
            is_alive: AtomicBool::new(true),
            dropped_messages: AtomicU64::new(0),
            closed,
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Enqueue a frame without waiting. Drops are counted.
    pub fn send(&self, frame: Arc<str>) -> SendOutcome {
        if self.closed.is_cancelled() {
            return SendOutcome::Closed;
        }
        match self.tx.try_send(frame) {
            Ok(()) => SendOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                SendOutcome::Full
            }
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Returns whether the peer was heard from since the last check, and
    /// resets the flag.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Ask the writer to send a close frame and stop.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }

    pub fn closed_token(&self) -> &CancellationToken {
        &self.closed
    }

    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("subject", &self.principal.subject)
            .field("dropped", &self.drop_count())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
