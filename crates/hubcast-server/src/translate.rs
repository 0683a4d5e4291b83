//! Hub event to wire envelope.
//!
//! Every envelope is a JSON object carrying the event's `id` and `timestamp`
//! next to a single body key: `properties` for most events, `configuration`
//! for hub configuration changes. Absent optional values are left out of the
//! object rather than sent as `null`.

use std::sync::Arc;

use hubcast_core::events::{
    DeviceContext, PluginContext, PluginStatus, PresenceEntity, TaskContext, VariableUpdate,
};
use hubcast_core::{HubEvent, TaskCatalog};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslationError {
    #[error("task {task_id} on hub {hub_id} no longer exists")]
    TaskNotFound { hub_id: String, task_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EnvelopeBody {
    Properties(Map<String, Value>),
    Configuration(Map<String, Value>),
}

/// The JSON record sent to clients for one hub event. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    id: String,
    timestamp: i64,
    #[serde(flatten)]
    body: EnvelopeBody,
}

impl Envelope {
    pub fn new(id: impl Into<String>, timestamp: i64, body: EnvelopeBody) -> Self {
        Self {
            id: id.into(),
            timestamp,
            body,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn body(&self) -> &EnvelopeBody {
        &self.body
    }

    pub fn properties(&self) -> Option<&Map<String, Value>> {
        match &self.body {
            EnvelopeBody::Properties(map) => Some(map),
            EnvelopeBody::Configuration(_) => None,
        }
    }

    /// Serialize to the shared text frame handed to every connection.
    pub fn to_frame(&self) -> Result<Arc<str>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::from)
    }
}

/// Build the envelope for `event`. Task events consult `tasks` for the
/// task's current state.
pub fn translate(event: &HubEvent, tasks: &dyn TaskCatalog) -> Result<Envelope, TranslationError> {
    let body = match event {
        HubEvent::VariablesUpdate { updates, .. } => variables_update(updates),
        HubEvent::DeviceUnavailable { device, .. } | HubEvent::DeviceAvailable { device, .. } => {
            device_availability(device)
        }
        HubEvent::PluginStatusChange { plugin, status, .. } => plugin_status(plugin, status),
        HubEvent::PresenceUpdate {
            entity,
            old_location,
            new_location,
            ..
        } => presence_update(entity, old_location.as_deref(), new_location.as_deref()),
        HubEvent::TaskExecution { task, .. } => task_execution(task, tasks)?,
        HubEvent::TaskUpdated { task, .. } => task_updated(task, tasks)?,
        HubEvent::HubConfigurationUpdate { configuration, .. } => {
            EnvelopeBody::Configuration(without_nulls(configuration))
        }
    };
    Ok(Envelope::new(event.event_id().as_str(), event.timestamp(), body))
}

fn variables_update(updates: &[VariableUpdate]) -> EnvelopeBody {
    let entries = updates
        .iter()
        .map(|u| {
            let mut entry = Map::new();
            put(&mut entry, "id", u.resource_path());
            put(&mut entry, "name", u.name.as_str());
            put_opt(&mut entry, "oldValue", u.old_value.clone());
            put_opt(&mut entry, "newValue", u.new_value.clone());
            put(&mut entry, "hubId", u.device.hub_id.as_str());
            put(&mut entry, "pluginId", u.device.plugin_id.as_str());
            put(&mut entry, "deviceId", u.device.device_id.as_str());
            Value::Object(entry)
        })
        .collect::<Vec<_>>();

    let mut props = Map::new();
    put(&mut props, "updates", entries);
    EnvelopeBody::Properties(props)
}

fn device_availability(device: &DeviceContext) -> EnvelopeBody {
    let mut props = Map::new();
    put(&mut props, "id", device.resource_path());
    EnvelopeBody::Properties(props)
}

fn plugin_status(plugin: &PluginContext, status: &PluginStatus) -> EnvelopeBody {
    let mut status_obj = Map::new();
    put(&mut status_obj, "code", serde_json::to_value(status.code).unwrap_or(Value::Null));
    put_opt(&mut status_obj, "message", status.message.as_deref());

    let mut props = Map::new();
    put(&mut props, "id", plugin.resource_path());
    put(&mut props, "pluginId", plugin.plugin_id.as_str());
    put(&mut props, "status", status_obj);
    EnvelopeBody::Properties(props)
}

fn presence_update(
    entity: &PresenceEntity,
    old_location: Option<&str>,
    new_location: Option<&str>,
) -> EnvelopeBody {
    let mut props = Map::new();
    put(&mut props, "hubId", entity.hub_id.as_str());
    put(&mut props, "entityId", entity.entity_id.as_str());
    put_opt(&mut props, "oldLocation", old_location);
    put_opt(&mut props, "newLocation", new_location);
    EnvelopeBody::Properties(props)
}

fn task_execution(
    task: &TaskContext,
    tasks: &dyn TaskCatalog,
) -> Result<EnvelopeBody, TranslationError> {
    let snapshot = tasks.task(task).ok_or_else(|| task_not_found(task))?;

    let mut props = Map::new();
    put(&mut props, "id", task.resource_path());
    put(&mut props, "name", snapshot.name);
    Ok(EnvelopeBody::Properties(props))
}

fn task_updated(
    task: &TaskContext,
    tasks: &dyn TaskCatalog,
) -> Result<EnvelopeBody, TranslationError> {
    let snapshot = tasks.task(task).ok_or_else(|| task_not_found(task))?;
    let task_properties = snapshot.has_properties().then(|| without_nulls(&snapshot.properties));

    let mut props = Map::new();
    put(&mut props, "id", task.resource_path());
    put(&mut props, "name", snapshot.name);
    put_opt(&mut props, "description", snapshot.description);
    put(&mut props, "enabled", snapshot.enabled);
    put_opt(&mut props, "taskProperties", task_properties);
    Ok(EnvelopeBody::Properties(props))
}

fn task_not_found(task: &TaskContext) -> TranslationError {
    TranslationError::TaskNotFound {
        hub_id: task.hub_id.clone(),
        task_id: task.task_id.clone(),
    }
}

fn put(map: &mut Map<String, Value>, key: &str, value: impl Into<Value>) {
    let _ = map.insert(key.to_string(), value.into());
}

/// Copy of `map` without its `null` entries; a null value means the key is unset.
fn without_nulls(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn put_opt<V: Into<Value>>(map: &mut Map<String, Value>, key: &str, value: Option<V>) {
    if let Some(v) = value {
        put(map, key, v);
    }
}
