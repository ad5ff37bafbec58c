//! Task orchestration: registry, scheduling, circuit breakers and the
//! execution loop that ties them together.

pub mod breaker;
mod context;
mod engine;
pub mod monitor;
mod pool;
mod registry;
pub mod retry;
mod scheduler;

pub use breaker::{AgentHealth, BreakerConfig, BreakerState};
pub use context::SharedContext;
pub use engine::{Orchestrator, RunEvent, RunSummary, TaskOutcome};
pub use monitor::{AgentMetrics, HealthReport, HealthStatus, OrchestratorMetrics};
pub use pool::{Completion, Dispatch, WorkerPool, WorkerSettings};
pub use registry::TaskRegistry;
pub use retry::RetryPolicy;
pub use scheduler::PriorityScheduler;
