//! Agent metrics, execution history and health reporting.

use crate::agent::AgentKind;
use crate::core::task::{Task, TaskId, TaskStatus};
use crate::orchestration::breaker::{AgentHealth, BreakerBoard, BreakerState};
use crate::orchestration::registry::TaskRegistry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

/// Records kept in the execution history.
pub const HISTORY_LIMIT: usize = 1000;

/// Call statistics for one agent kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    /// Handler dispatches that ran to an outcome.
    pub calls: u64,
    /// Dispatches that ended in failure.
    pub errors: u64,
    /// Dispatches refused by an open circuit.
    pub short_circuited: u64,
    pub total_time_ms: u64,
    pub avg_time_ms: f64,
}

impl AgentMetrics {
    fn record(&mut self, elapsed: Duration, success: bool) {
        self.calls += 1;
        if !success {
            self.errors += 1;
        }
        self.total_time_ms += elapsed.as_millis() as u64;
        self.avg_time_ms = self.total_time_ms as f64 / self.calls as f64;
    }
}

/// One entry of the execution history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub task_id: TaskId,
    pub task_name: String,
    pub agent: AgentKind,
    pub status: TaskStatus,
    pub attempts: u32,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReport {
    #[serde(flatten)]
    pub health: AgentHealth,
    pub metrics: AgentMetrics,
}

/// Overall orchestrator health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// `degraded` when any breaker is not closed.
    pub status: HealthStatus,
    pub agents: Vec<AgentReport>,
    pub active_tasks: usize,
    pub total_tasks: usize,
    pub checked_at: DateTime<Utc>,
}

/// Aggregate execution metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorMetrics {
    pub total_tasks: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Succeeded tasks over submitted tasks; zero with no tasks.
    pub success_rate: f64,
    pub average_execution_ms: f64,
    pub agents: BTreeMap<AgentKind, AgentMetrics>,
}

/// Collects metrics for every dispatch. Owned by the execution loop.
#[derive(Debug, Default)]
pub struct AgentMonitor {
    metrics: HashMap<AgentKind, AgentMetrics>,
    history: VecDeque<ExecutionRecord>,
    executions: u64,
    execution_time_ms: u64,
}

impl AgentMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished handler dispatch for `task`.
    pub fn record_execution(&mut self, task: &Task, elapsed: Duration) {
        let success = task.status == TaskStatus::Succeeded;
        self.metrics
            .entry(task.agent)
            .or_default()
            .record(elapsed, success);
        self.executions += 1;
        self.execution_time_ms += elapsed.as_millis() as u64;

        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(ExecutionRecord {
            task_id: task.id,
            task_name: task.name.clone(),
            agent: task.agent,
            status: task.status,
            attempts: task.attempts,
            duration_ms: elapsed.as_millis() as u64,
            finished_at: task.completed_at.unwrap_or_else(Utc::now),
        });
    }

    /// Count a dispatch refused by an open circuit.
    pub fn record_short_circuit(&mut self, agent: AgentKind) {
        self.metrics.entry(agent).or_default().short_circuited += 1;
    }

    pub fn agent_metrics(&self, agent: AgentKind) -> AgentMetrics {
        self.metrics.get(&agent).cloned().unwrap_or_default()
    }

    /// Most recent executions, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &ExecutionRecord> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn health_report(&self, breakers: &BreakerBoard, registry: &TaskRegistry) -> HealthReport {
        let agents: Vec<AgentReport> = AgentKind::ALL
            .into_iter()
            .map(|agent| AgentReport {
                health: breakers
                    .get(agent)
                    .map(|b| b.health())
                    .unwrap_or(AgentHealth {
                        agent,
                        state: BreakerState::Closed,
                        consecutive_failures: 0,
                        opened_at: None,
                    }),
                metrics: self.agent_metrics(agent),
            })
            .collect();

        let status = if breakers.all_closed() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        HealthReport {
            status,
            agents,
            active_tasks: registry.active_count(),
            total_tasks: registry.len(),
            checked_at: Utc::now(),
        }
    }

    pub fn metrics(&self, registry: &TaskRegistry) -> OrchestratorMetrics {
        let total_tasks = registry.len();
        let succeeded = registry.count_by_status(TaskStatus::Succeeded);
        let success_rate = if total_tasks == 0 {
            0.0
        } else {
            succeeded as f64 / total_tasks as f64
        };
        let average_execution_ms = if self.executions == 0 {
            0.0
        } else {
            self.execution_time_ms as f64 / self.executions as f64
        };

        OrchestratorMetrics {
            total_tasks,
            succeeded,
            failed: registry.count_by_status(TaskStatus::Failed),
            skipped: registry.count_by_status(TaskStatus::Skipped),
            success_rate,
            average_execution_ms,
            agents: self.metrics.iter().map(|(k, v)| (*k, v.clone())).collect(),
        }
    }
}
