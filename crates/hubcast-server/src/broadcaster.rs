//! Turns hub events into frames and fans them out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hubcast_core::{HubEvent, TaskCatalog};
use metrics::counter;
use tracing::{debug, error, trace};

use crate::metrics::{WS_BROADCAST_EVENTS_TOTAL, WS_TRANSLATION_ERRORS_TOTAL};
use crate::registry::ConnectionRegistry;
use crate::translate::{translate, Envelope};

/// Publishes hub events to every registry member while the endpoint is up.
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    tasks: Arc<dyn TaskCatalog>,
    active: AtomicBool,
}

impl Broadcaster {
    /// Starts inactive; nothing is sent until [`Broadcaster::activate`].
    pub fn new(registry: Arc<ConnectionRegistry>, tasks: Arc<dyn TaskCatalog>) -> Self {
        Self {
            registry,
            tasks,
            active: AtomicBool::new(false),
        }
    }

    pub fn activate(&self) {
        self.active.store(true, Ordering::Release);
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Translate and broadcast one event. Returns the number of members it
    /// was queued for.
    ///
    /// A no-op while inactive. Events that cannot be translated are logged
    /// and dropped.
    pub fn publish(&self, event: &HubEvent) -> usize {
        let event_type = event.event_type();
        if !self.is_active() {
            trace!(event_type, "endpoint not active, skipping event");
            return 0;
        }

        match translate(event, self.tasks.as_ref()) {
            Ok(envelope) => {
                let recipients = self.broadcast(&envelope);
                counter!(WS_BROADCAST_EVENTS_TOTAL, "event_type" => event_type).increment(1);
                debug!(event_type, event_id = %event.event_id(), recipients, "broadcast event");
                recipients
            }
            Err(e) => {
                counter!(WS_TRANSLATION_ERRORS_TOTAL, "event_type" => event_type).increment(1);
                error!(event_type, event_id = %event.event_id(), error = %e, "failed to translate event");
                0
            }
        }
    }

    /// Serialize `envelope` once and queue it on every member. A no-op
    /// while inactive.
    pub fn broadcast(&self, envelope: &Envelope) -> usize {
        if !self.is_active() {
            trace!(envelope_id = envelope.id(), "endpoint not active, skipping envelope");
            return 0;
        }
        match envelope.to_frame() {
            Ok(frame) => self.registry.broadcast(frame),
            Err(e) => {
                error!(envelope_id = envelope.id(), error = %e, "failed to serialize envelope");
                0
            }
        }
    }
}
