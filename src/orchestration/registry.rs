//! In-memory task registry.
//!
//! The registry owns every submitted task record and remembers submission
//! order, which the resolver and scheduler use to break ties.

use crate::core::dag::TaskGraph;
use crate::core::task::{Task, TaskId, TaskStatus};
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Owns the task records of one orchestrator instance.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: HashMap<TaskId, Task>,
    order: Vec<TaskId>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task. Returns its id.
    ///
    /// # Errors
    /// `DuplicateTask` if a task with the same id was already submitted.
    /// `Validation` if the task is not `Pending`.
    pub fn submit(&mut self, task: Task) -> Result<TaskId> {
        let id = task.id;
        if self.tasks.contains_key(&id) {
            return Err(Error::DuplicateTask(id));
        }
        if task.status != TaskStatus::Pending {
            return Err(Error::Validation(format!(
                "task {} must be submitted as pending, not {}",
                id, task.status
            )));
        }
        self.order.push(id);
        self.tasks.insert(id, task);
        Ok(id)
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &TaskId) -> Result<&mut Task> {
        self.tasks.get_mut(id).ok_or(Error::TaskNotFound(*id))
    }

    /// Tasks in submission order.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    /// Task ids in submission order.
    pub fn ids(&self) -> &[TaskId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn count_by_status(&self, status: TaskStatus) -> usize {
        self.tasks.values().filter(|t| t.status == status).count()
    }

    /// Tasks that have not reached a terminal status.
    pub fn active_count(&self) -> usize {
        self.tasks.values().filter(|t| !t.is_finished()).count()
    }

    /// Build the dependency graph over every registered task.
    pub fn graph(&self) -> Result<TaskGraph> {
        TaskGraph::build(self.iter())
    }
}
