//! Core domain models for the orchestrator.
//!
//! This module contains the task record and the dependency graph used
//! to resolve a valid execution order.

pub mod dag;
pub mod task;

pub use dag::TaskGraph;
pub use task::{Priority, Task, TaskId, TaskStatus};
