use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier assigned by the hub to each event. Echoed as the envelope `id`.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry key for one upgraded socket, minted at upgrade time.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0.simple())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_displays_with_prefix() {
        let id = ConnectionId::generate();
        assert!(id.to_string().starts_with("conn_"), "got: {id}");
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::generate(), ConnectionId::generate());
    }

    #[test]
    fn event_id_keeps_hub_value() {
        let id = EventId::from_raw("a7f1c2");
        assert_eq!(id.as_str(), "a7f1c2");
        assert_eq!(id.to_string(), "a7f1c2");
    }

    #[test]
    fn event_id_serializes_as_plain_string() {
        let id = EventId::from_raw("evt-42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"evt-42\"");
        let back: EventId = serde_json::from_str("\"evt-42\"").unwrap();
        assert_eq!(back, id);
    }
}
