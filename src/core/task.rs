//! Task data model for the orchestrator.
//!
//! Tasks are the units of work dispatched to agent handlers. Each task
//! tracks its status, priority, dependencies, and the outcome of the
//! handler call.

use crate::agent::AgentKind;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a task.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Create a new unique task identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Dispatch priority of a task.
///
/// Higher priorities are dispatched first among ready tasks. A running
/// task is never preempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Must run first (security, auth).
    #[serde(alias = "critical")]
    Urgent,
    /// Core business work (payments, orders).
    High,
    /// Standard operations (content, analytics).
    #[default]
    Medium,
    /// Background work (learning, optimization).
    Low,
}

impl Priority {
    /// Numeric rank used for ordering; larger dispatches earlier.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Urgent => 3,
            Priority::High => 2,
            Priority::Medium => 1,
            Priority::Low => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "urgent" | "critical" => Ok(Priority::Urgent),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(Error::Validation(format!("Unknown priority: {}", other))),
        }
    }
}

/// Task status in its lifecycle.
///
/// Status only moves forward:
/// `Pending -> Ready -> Running -> Succeeded | Failed`, plus
/// `Pending -> Skipped` when a dependency did not succeed,
/// `Ready -> Failed` when the agent's circuit is open, and
/// `Ready -> Skipped` when the run is cancelled before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task submitted, dependencies not yet satisfied.
    #[default]
    Pending,
    /// All dependencies succeeded, waiting for dispatch.
    Ready,
    /// Handler is executing.
    Running,
    /// Handler returned a result.
    Succeeded,
    /// Handler failed, timed out, or the agent was unavailable.
    Failed,
    /// A dependency did not succeed or the run was cancelled; the handler never ran.
    Skipped,
}

impl TaskStatus {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Skipped
        )
    }

    /// Whether `self -> next` is a legal forward transition.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Ready)
                | (Pending, Skipped)
                | (Ready, Running)
                | (Ready, Failed)
                | (Ready, Skipped)
                | (Running, Succeeded)
                | (Running, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ready => "ready",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single task submitted to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// Human-readable name for the task.
    pub name: String,
    /// Agent whose handler executes this task.
    pub agent: AgentKind,
    /// Opaque input handed to the handler.
    pub payload: serde_json::Value,
    /// Tasks that must succeed before this one may run.
    pub dependencies: Vec<TaskId>,
    /// Dispatch priority among ready tasks.
    pub priority: Priority,
    /// Current execution status.
    pub status: TaskStatus,
    /// Value returned by the handler on success.
    pub result: Option<serde_json::Value>,
    /// Failure message, or the skip reason for skipped tasks.
    pub error: Option<String>,
    /// Number of handler invocations made (retries included).
    #[serde(default)]
    pub attempts: u32,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task started execution.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new pending task with medium priority and no dependencies.
    pub fn new(name: &str, agent: AgentKind, payload: serde_json::Value) -> Self {
        Self {
            id: TaskId::new(),
            name: name.to_string(),
            agent,
            payload,
            dependencies: Vec::new(),
            priority: Priority::default(),
            status: TaskStatus::Pending,
            result: None,
            error: None,
            attempts: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Set the dispatch priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Replace the dependency set. Duplicate IDs are collapsed.
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = TaskId>) -> Self {
        self.dependencies.clear();
        for dep in deps {
            self.add_dependency(dep);
        }
        self
    }

    /// Add a single dependency.
    pub fn depends_on(mut self, dep: TaskId) -> Self {
        self.add_dependency(dep);
        self
    }

    fn add_dependency(&mut self, dep: TaskId) {
        if !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
    }

    fn transition(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Mark the task as ready once every dependency has succeeded.
    pub fn mark_ready(&mut self) -> Result<()> {
        self.transition(TaskStatus::Ready)
    }

    /// Start the task execution.
    pub fn start(&mut self) -> Result<()> {
        self.transition(TaskStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Record a successful result.
    pub fn succeed(&mut self, result: serde_json::Value) -> Result<()> {
        self.transition(TaskStatus::Succeeded)?;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Record a failure with its error message.
    pub fn fail(&mut self, error: &str) -> Result<()> {
        self.transition(TaskStatus::Failed)?;
        self.error = Some(error.to_string());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Skip the task without running it.
    pub fn skip(&mut self, reason: &str) -> Result<()> {
        self.transition(TaskStatus::Skipped)?;
        self.error = Some(reason.to_string());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Check if the task is in a terminal state.
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock time between start and completion.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}
