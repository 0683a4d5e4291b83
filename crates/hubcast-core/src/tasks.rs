use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::events::TaskContext;

/// The parts of a hub task that clients are told about.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl TaskSnapshot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            enabled: true,
            properties: Map::new(),
        }
    }

    pub fn has_properties(&self) -> bool {
        !self.properties.is_empty()
    }
}

/// Read access to the hub's current tasks.
pub trait TaskCatalog: Send + Sync {
    /// Current state of a task, or `None` if it no longer exists.
    fn task(&self, ctx: &TaskContext) -> Option<TaskSnapshot>;
}

/// Task catalog held in memory.
#[derive(Default)]
pub struct InMemoryTaskCatalog {
    tasks: RwLock<HashMap<TaskContext, TaskSnapshot>>,
}

impl InMemoryTaskCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, ctx: TaskContext, task: TaskSnapshot) {
        let _ = self.tasks.write().insert(ctx, task);
    }

    pub fn remove(&self, ctx: &TaskContext) -> Option<TaskSnapshot> {
        self.tasks.write().remove(ctx)
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}

impl TaskCatalog for InMemoryTaskCatalog {
    fn task(&self, ctx: &TaskContext) -> Option<TaskSnapshot> {
        self.tasks.read().get(ctx).cloned()
    }
}
