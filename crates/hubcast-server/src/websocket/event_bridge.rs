//! Event bridge: feeds hub events from the source channel into the
//! [`Broadcaster`].

use std::sync::Arc;

use hubcast_core::HubEvent;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::broadcaster::Broadcaster;

pub struct EventBridge {
    rx: broadcast::Receiver<HubEvent>,
    broadcaster: Arc<Broadcaster>,
    cancel: CancellationToken,
}

impl EventBridge {
    pub fn new(
        rx: broadcast::Receiver<HubEvent>,
        broadcaster: Arc<Broadcaster>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            rx,
            broadcaster,
            cancel,
        }
    }

    /// Run until the source closes or `cancel` fires.
    #[tracing::instrument(skip_all, name = "event_bridge")]
    pub async fn run(mut self) {
        loop {
            let received = tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("event bridge cancelled");
                    break;
                }
                received = self.rx.recv() => received,
            };
            match received {
                Ok(event) => {
                    let _ = self.broadcaster.publish(&event);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "event bridge lagged, events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("event source closed, bridge exiting");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use hubcast_core::events::DeviceContext;
    use hubcast_core::{EventId, InMemoryTaskCatalog, Principal};
    use tokio::sync::mpsc;

    use crate::registry::ConnectionRegistry;
    use crate::websocket::connection::Connection;

    fn device_event(n: u32) -> HubEvent {
        HubEvent::DeviceUnavailable {
            event_id: EventId::from_raw(format!("evt_{n}")),
            timestamp: i64::from(n),
            device: DeviceContext::new("local", "p", "d"),
        }
    }

    fn active_broadcaster() -> (Arc<Broadcaster>, mpsc::Receiver<Arc<str>>) {
        let registry = Arc::new(ConnectionRegistry::default());
        let (tx, rx) = mpsc::channel(16);
        let _ = registry.add(Arc::new(Connection::new(
            Principal::new("r", ["userRead"]),
            tx,
            CancellationToken::new(),
        )));
        let broadcaster = Arc::new(Broadcaster::new(
            registry,
            Arc::new(InMemoryTaskCatalog::new()),
        ));
        broadcaster.activate();
        (broadcaster, rx)
    }

    #[tokio::test]
    async fn forwards_events_in_order() {
        let (broadcaster, mut frames) = active_broadcaster();
        let (tx, rx) = broadcast::channel(16);
        let handle = tokio::spawn(EventBridge::new(rx, broadcaster, CancellationToken::new()).run());

        let _ = tx.send(device_event(1)).unwrap();
        let _ = tx.send(device_event(2)).unwrap();
        for expected in ["evt_1", "evt_2"] {
            let frame = tokio::time::timeout(Duration::from_secs(2), frames.recv())
                .await
                .unwrap()
                .unwrap();
            let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
            assert_eq!(json["id"], expected);
        }

        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn stops_on_cancel() {
        let (broadcaster, _frames) = active_broadcaster();
        let (_tx, rx) = broadcast::channel::<HubEvent>(4);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(EventBridge::new(rx, broadcaster, cancel.clone()).run());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn survives_lag() {
        let (broadcaster, mut frames) = active_broadcaster();
        let (tx, rx) = broadcast::channel(2);
        for n in 0..5 {
            let _ = tx.send(device_event(n)).unwrap();
        }
        let handle = tokio::spawn(EventBridge::new(rx, broadcaster, CancellationToken::new()).run());
        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();

        let mut ids = Vec::new();
        while let Ok(frame) = frames.try_recv() {
            let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
            ids.push(json["id"].as_str().unwrap().to_string());
        }
        assert_eq!(ids, vec!["evt_3", "evt_4"]);
    }
}
