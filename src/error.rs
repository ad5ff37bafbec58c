use thiserror::Error;

use crate::agent::AgentKind;
use crate::core::task::{TaskId, TaskStatus};

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Cycle detected in task graph involving: {}", .tasks.join(", "))]
    Cycle { tasks: Vec<String> },

    #[error("Task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("Task already submitted: {0}")]
    DuplicateTask(TaskId),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("No handler registered for agent: {0}")]
    MissingHandler(AgentKind),

    #[error("Unknown agent type: {0}")]
    UnknownAgent(String),

    #[error("Agent unavailable: circuit open for {0}")]
    AgentUnavailable(AgentKind),

    #[error("Agent {agent} failed: {message}")]
    AgentExecution { agent: AgentKind, message: String },

    #[error("Dependency {dependency} {status}")]
    DependencyFailed { dependency: String, status: TaskStatus },

    /// Raised by agent handlers to report a domain failure.
    #[error("{0}")]
    Handler(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Worker pool is closed")]
    PoolClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
