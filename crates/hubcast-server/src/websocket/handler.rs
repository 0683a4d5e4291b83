//! Upgraded socket lifecycle: registration, writer, reader, heartbeat,
//! removal.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use hubcast_core::Principal;
use metrics::counter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::connection::Connection;
use super::heartbeat::{run_heartbeat, HeartbeatResult};
use crate::metrics::WS_CONNECTIONS_TOTAL;
use crate::registry::ConnectionRegistry;

/// Per-connection limits.
#[derive(Clone, Copy, Debug)]
pub struct ConnectionSettings {
    pub max_send_queue: usize,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
}

/// Why a connection ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disconnect {
    /// Peer closed or the socket errored.
    Peer,
    /// Evicted from the registry or server shutdown.
    Closed,
    HeartbeatTimeout,
}

impl Disconnect {
    fn as_str(self) -> &'static str {
        match self {
            Self::Peer => "peer",
            Self::Closed => "closed",
            Self::HeartbeatTimeout => "heartbeat_timeout",
        }
    }
}

/// Admit an upgraded socket and serve it until it ends.
///
/// `closed` is the connection's own token; cancelling it (directly or via a
/// parent) makes the writer send a close frame and stop.
pub async fn serve_connection(
    socket: WebSocket,
    principal: Principal,
    registry: Arc<ConnectionRegistry>,
    settings: ConnectionSettings,
    closed: CancellationToken,
) -> Disconnect {
    let (tx, rx) = mpsc::channel(settings.max_send_queue.max(1));
    let connection = Arc::new(Connection::new(principal, tx, closed));
    let conn_id = connection.id().clone();

    if !registry.add(Arc::clone(&connection)) {
        debug!(conn_id = %conn_id, "connection already registered");
    }
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    info!(
        conn_id = %conn_id,
        subject = %connection.principal().subject,
        "client connected"
    );

    let reason = run_socket(socket, &connection, rx, settings).await;

    let _ = registry.remove(&conn_id);
    info!(
        conn_id = %conn_id,
        reason = reason.as_str(),
        age_secs = connection.age().as_secs(),
        dropped = connection.drop_count(),
        "client disconnected"
    );
    reason
}

async fn run_socket(
    socket: WebSocket,
    connection: &Arc<Connection>,
    mut rx: mpsc::Receiver<Arc<str>>,
    settings: ConnectionSettings,
) -> Disconnect {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let closed = connection.closed_token().clone();

    let writer = async {
        let mut ping = tokio::time::interval(settings.heartbeat_interval);
        let _ = ping.tick().await;

        loop {
            tokio::select! {
                () = closed.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return Disconnect::Closed;
                }
                frame = rx.recv() => {
                    let Some(frame) = frame else {
                        return Disconnect::Closed;
                    };
                    if ws_tx.send(Message::Text(frame.to_string().into())).await.is_err() {
                        return Disconnect::Peer;
                    }
                }
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        return Disconnect::Peer;
                    }
                    trace!(conn_id = %connection.id(), "sent ping");
                }
            }
        }
    };

    let reader = async {
        while let Some(Ok(msg)) = ws_rx.next().await {
            connection.mark_alive();
            match msg {
                Message::Close(_) => break,
                Message::Text(_) | Message::Binary(_) => {
                    trace!(conn_id = %connection.id(), "ignoring inbound frame");
                }
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
        Disconnect::Peer
    };

    // Not tied to `closed` so the writer gets to send its close frame.
    let heartbeat = run_heartbeat(
        Arc::clone(connection),
        settings.heartbeat_interval,
        settings.heartbeat_timeout,
        CancellationToken::new(),
    );

    tokio::select! {
        reason = writer => reason,
        reason = reader => reason,
        result = heartbeat => match result {
            HeartbeatResult::TimedOut => Disconnect::HeartbeatTimeout,
            HeartbeatResult::Cancelled => Disconnect::Closed,
        },
    }
}
