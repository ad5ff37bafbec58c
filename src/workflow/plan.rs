//! Plan files: task lists with local keys.
//!
//! A plan names each task with a short key and refers to dependencies by
//! key. Loading converts it into tasks with real ids. TOML and JSON are
//! both accepted; the format follows the file extension.
//!
//! ```toml
//! [[tasks]]
//! key = "photos"
//! agent = "visual_foundry"
//! priority = "high"
//! payload = { sku = "SR-100" }
//!
//! [[tasks]]
//! key = "listing"
//! agent = "growth_stack"
//! depends_on = ["photos"]
//! ```

use crate::agent::AgentKind;
use crate::core::task::{Priority, Task, TaskId};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub key: String,
    /// Display name; defaults to the key.
    #[serde(default)]
    pub name: Option<String>,
    pub agent: AgentKind,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Plan {
    #[serde(default)]
    pub tasks: Vec<PlanEntry>,
}

/// Tasks built from a plan, plus the key each one came from.
#[derive(Debug, Clone)]
pub struct PlannedTasks {
    pub tasks: Vec<Task>,
    pub keys: HashMap<String, TaskId>,
}

impl PlannedTasks {
    pub fn id(&self, key: &str) -> Option<TaskId> {
        self.keys.get(key).copied()
    }

    /// Reverse lookup from task id to plan key.
    pub fn key_of(&self, id: &TaskId) -> Option<&str> {
        self.keys
            .iter()
            .find(|(_, v)| *v == id)
            .map(|(k, _)| k.as_str())
    }
}

impl Plan {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_toml(&content)
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Build tasks, resolving `depends_on` keys to ids.
    ///
    /// # Errors
    /// `Validation` for an empty or duplicate key, or a `depends_on` key
    /// that no entry defines.
    pub fn into_tasks(self) -> Result<PlannedTasks> {
        let mut keys = HashMap::with_capacity(self.tasks.len());
        let mut tasks = Vec::with_capacity(self.tasks.len());

        for entry in &self.tasks {
            if entry.key.trim().is_empty() {
                return Err(Error::Validation("plan task with empty key".to_string()));
            }
            let name = entry.name.as_deref().unwrap_or(&entry.key);
            let task = Task::new(name, entry.agent, entry.payload.clone())
                .with_priority(entry.priority);
            if keys.insert(entry.key.clone(), task.id).is_some() {
                return Err(Error::Validation(format!(
                    "duplicate plan key '{}'",
                    entry.key
                )));
            }
            tasks.push(task);
        }

        let mut dependencies = Vec::with_capacity(self.tasks.len());
        for entry in &self.tasks {
            let ids = entry
                .depends_on
                .iter()
                .map(|dep| {
                    keys.get(dep).copied().ok_or_else(|| {
                        Error::Validation(format!(
                            "task '{}' depends on unknown key '{}'",
                            entry.key, dep
                        ))
                    })
                })
                .collect::<Result<Vec<TaskId>>>()?;
            dependencies.push(ids);
        }

        let tasks = tasks
            .into_iter()
            .zip(dependencies)
            .map(|(task, deps)| task.with_dependencies(deps))
            .collect();

        Ok(PlannedTasks { tasks, keys })
    }
}
