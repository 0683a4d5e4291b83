use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::EventId;

/// Root of every hub resource path.
pub const API_ROOT: &str = "/api/v1/hubs";

/// Identifies a device owned by a locally installed plugin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceContext {
    pub hub_id: String,
    pub plugin_id: String,
    pub device_id: String,
}

impl DeviceContext {
    pub fn new(
        hub_id: impl Into<String>,
        plugin_id: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            hub_id: hub_id.into(),
            plugin_id: plugin_id.into(),
            device_id: device_id.into(),
        }
    }

    /// `/api/v1/hubs/{hub}/plugins/local/{plugin}/devices/{device}`
    pub fn resource_path(&self) -> String {
        format!(
            "{API_ROOT}/{}/plugins/local/{}/devices/{}",
            self.hub_id, self.plugin_id, self.device_id
        )
    }
}

/// Identifies a locally installed plugin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginContext {
    pub hub_id: String,
    pub plugin_id: String,
}

impl PluginContext {
    pub fn new(hub_id: impl Into<String>, plugin_id: impl Into<String>) -> Self {
        Self {
            hub_id: hub_id.into(),
            plugin_id: plugin_id.into(),
        }
    }

    /// `/api/v1/hubs/{hub}/plugins/local/{plugin}`
    pub fn resource_path(&self) -> String {
        format!("{API_ROOT}/{}/plugins/local/{}", self.hub_id, self.plugin_id)
    }
}

/// Identifies a task on a hub.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskContext {
    pub hub_id: String,
    pub task_id: String,
}

impl TaskContext {
    pub fn new(hub_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            hub_id: hub_id.into(),
            task_id: task_id.into(),
        }
    }

    /// `/api/v1/hubs/{hub}/tasks/{task}`
    pub fn resource_path(&self) -> String {
        format!("{API_ROOT}/{}/tasks/{}", self.hub_id, self.task_id)
    }
}

/// A single device variable change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariableUpdate {
    pub device: DeviceContext,
    pub name: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

impl VariableUpdate {
    /// Device path with a trailing `/variables/{name}` segment.
    pub fn resource_path(&self) -> String {
        format!("{}/variables/{}", self.device.resource_path(), self.name)
    }
}

/// An entity whose location is tracked by the hub's presence service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntity {
    pub hub_id: String,
    pub entity_id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PluginStatusCode {
    Initializing,
    Running,
    NotConfigured,
    Failed,
    Stopped,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginStatus {
    pub code: PluginStatusCode,
    pub message: Option<String>,
}

/// Events published by the hub that the relay forwards to its clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HubEvent {
    #[serde(rename = "variables_update")]
    VariablesUpdate {
        event_id: EventId,
        timestamp: i64,
        updates: Vec<VariableUpdate>,
    },

    #[serde(rename = "device_unavailable")]
    DeviceUnavailable {
        event_id: EventId,
        timestamp: i64,
        device: DeviceContext,
    },

    #[serde(rename = "device_available")]
    DeviceAvailable {
        event_id: EventId,
        timestamp: i64,
        device: DeviceContext,
    },

    #[serde(rename = "plugin_status_change")]
    PluginStatusChange {
        event_id: EventId,
        timestamp: i64,
        plugin: PluginContext,
        status: PluginStatus,
    },

    #[serde(rename = "presence_update")]
    PresenceUpdate {
        event_id: EventId,
        timestamp: i64,
        entity: PresenceEntity,
        old_location: Option<String>,
        new_location: Option<String>,
    },

    #[serde(rename = "task_execution")]
    TaskExecution {
        event_id: EventId,
        timestamp: i64,
        task: TaskContext,
    },

    #[serde(rename = "task_updated")]
    TaskUpdated {
        event_id: EventId,
        timestamp: i64,
        task: TaskContext,
    },

    #[serde(rename = "hub_configuration_update")]
    HubConfigurationUpdate {
        event_id: EventId,
        timestamp: i64,
        configuration: Map<String, Value>,
    },
}

impl HubEvent {
    pub fn event_id(&self) -> &EventId {
        match self {
            Self::VariablesUpdate { event_id, .. }
            | Self::DeviceUnavailable { event_id, .. }
            | Self::DeviceAvailable { event_id, .. }
            | Self::PluginStatusChange { event_id, .. }
            | Self::PresenceUpdate { event_id, .. }
            | Self::TaskExecution { event_id, .. }
            | Self::TaskUpdated { event_id, .. }
            | Self::HubConfigurationUpdate { event_id, .. } => event_id,
        }
    }

    /// Epoch milliseconds at which the hub produced the event.
    pub fn timestamp(&self) -> i64 {
        match self {
            Self::VariablesUpdate { timestamp, .. }
            | Self::DeviceUnavailable { timestamp, .. }
            | Self::DeviceAvailable { timestamp, .. }
            | Self::PluginStatusChange { timestamp, .. }
            | Self::PresenceUpdate { timestamp, .. }
            | Self::TaskExecution { timestamp, .. }
            | Self::TaskUpdated { timestamp, .. }
            | Self::HubConfigurationUpdate { timestamp, .. } => *timestamp,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::VariablesUpdate { .. } => "variables_update",
            Self::DeviceUnavailable { .. } => "device_unavailable",
            Self::DeviceAvailable { .. } => "device_available",
            Self::PluginStatusChange { .. } => "plugin_status_change",
            Self::PresenceUpdate { .. } => "presence_update",
            Self::TaskExecution { .. } => "task_execution",
            Self::TaskUpdated { .. } => "task_updated",
            Self::HubConfigurationUpdate { .. } => "hub_configuration_update",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_resource_path() {
        let device = DeviceContext::new("local", "com.example.zwave", "switch-1");
        assert_eq!(
            device.resource_path(),
            "/api/v1/hubs/local/plugins/local/com.example.zwave/devices/switch-1"
        );
    }

    #[test]
    fn variable_resource_path_extends_device_path() {
        let update = VariableUpdate {
            device: DeviceContext::new("local", "p", "d"),
            name: "on".into(),
            old_value: None,
            new_value: Some(Value::Bool(true)),
        };
        assert_eq!(
            update.resource_path(),
            "/api/v1/hubs/local/plugins/local/p/devices/d/variables/on"
        );
    }

    #[test]
    fn plugin_and_task_resource_paths() {
        assert_eq!(
            PluginContext::new("local", "p").resource_path(),
            "/api/v1/hubs/local/plugins/local/p"
        );
        assert_eq!(
            TaskContext::new("local", "t-9").resource_path(),
            "/api/v1/hubs/local/tasks/t-9"
        );
    }

    #[test]
    fn accessors_cover_every_variant() {
        let event = HubEvent::TaskExecution {
            event_id: EventId::from_raw("e1"),
            timestamp: 1_700_000_000_000,
            task: TaskContext::new("local", "t"),
        };
        assert_eq!(event.event_id().as_str(), "e1");
        assert_eq!(event.timestamp(), 1_700_000_000_000);
        assert_eq!(event.event_type(), "task_execution");
    }

    #[test]
    fn event_type_matches_serde_tag() {
        let event = HubEvent::DeviceAvailable {
            event_id: EventId::from_raw("e2"),
            timestamp: 1_700_000_000_500,
            device: DeviceContext::new("local", "p", "d"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
    }

    #[test]
    fn plugin_status_code_wire_names() {
        let json = serde_json::to_string(&PluginStatusCode::NotConfigured).unwrap();
        assert_eq!(json, "\"NOT_CONFIGURED\"");
    }
}
