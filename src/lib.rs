pub mod agent;
pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod util;
pub mod workflow;

pub use agent::{AgentHandler, AgentKind, HandlerRegistry, TaskContext};
pub use error::{Error, Result};
pub use orchestration::{Orchestrator, RunEvent, RunSummary};
