//! The orchestrator and its execution loop.
//!
//! `Orchestrator` owns the task registry, the breakers and the metrics.
//! `run` validates the graph, readies tasks whose dependencies have
//! succeeded, and dispatches them by priority to the worker pool until
//! nothing is ready or running. The loop is the only writer of every piece
//! of state, so none of it is locked.

use crate::agent::{AgentKind, HandlerRegistry, TaskContext};
use crate::config::{Config, OrchestratorConfig};
use crate::core::dag::TaskGraph;
use crate::core::task::{Task, TaskId, TaskStatus};
use crate::error::{Error, Result};
use crate::orchestration::breaker::{Admission, BreakerBoard, BreakerConfig, BreakerState, Transition};
use crate::orchestration::context::SharedContext;
use crate::orchestration::monitor::{AgentMonitor, ExecutionRecord, HealthReport, OrchestratorMetrics};
use crate::orchestration::pool::{Completion, Dispatch, WorkerPool, WorkerSettings};
use crate::orchestration::registry::TaskRegistry;
use crate::orchestration::retry::RetryPolicy;
use crate::orchestration::scheduler::PriorityScheduler;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Events published while a run progresses.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    TaskReady {
        task_id: TaskId,
    },
    TaskStarted {
        task_id: TaskId,
        agent: AgentKind,
    },
    TaskSucceeded {
        task_id: TaskId,
    },
    TaskFailed {
        task_id: TaskId,
        error: String,
    },
    TaskSkipped {
        task_id: TaskId,
        reason: String,
    },
    BreakerTransition {
        agent: AgentKind,
        from: BreakerState,
        to: BreakerState,
    },
    RunComplete {
        succeeded: usize,
        failed: usize,
        skipped: usize,
    },
}

/// Terminal record of one task in a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task_id: TaskId,
    pub name: String,
    pub agent: AgentKind,
    pub status: TaskStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub attempts: u32,
}

impl From<&Task> for TaskOutcome {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id,
            name: task.name.clone(),
            agent: task.agent,
            status: task.status,
            result: task.result.clone(),
            error: task.error.clone(),
            attempts: task.attempts,
        }
    }
}

/// Result of a call to [`Orchestrator::run`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Whether the run was stopped through the cancellation token.
    pub cancelled: bool,
    pub duration_ms: u64,
    /// One entry per task in the run, in execution order.
    pub outcomes: Vec<TaskOutcome>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0 && !self.cancelled
    }

    pub fn outcome(&self, id: &TaskId) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.task_id == *id)
    }

    /// Outcomes that did not succeed.
    pub fn failures(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status != TaskStatus::Succeeded)
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} tasks: {} succeeded, {} failed, {} skipped in {}ms",
            self.total, self.succeeded, self.failed, self.skipped, self.duration_ms
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}

/// In-process task orchestrator.
///
/// # Example
///
/// ```ignore
/// use devskyy::agent::{AgentKind, HandlerRegistry};
/// use devskyy::core::Task;
/// use devskyy::orchestration::Orchestrator;
/// use std::time::Duration;
///
/// let mut orchestrator = Orchestrator::new(HandlerRegistry::simulated(Duration::ZERO));
/// let photo = orchestrator.submit(Task::new("photo", AgentKind::VisualFoundry, json!({})))?;
/// orchestrator.submit(Task::new("publish", AgentKind::GrowthStack, json!({})).depends_on(photo))?;
/// let summary = orchestrator.run().await?;
/// ```
pub struct Orchestrator {
    settings: OrchestratorConfig,
    retry: RetryPolicy,
    registry: TaskRegistry,
    handlers: HandlerRegistry,
    breakers: BreakerBoard,
    monitor: AgentMonitor,
    shared: SharedContext,
    subscribers: Vec<mpsc::UnboundedSender<RunEvent>>,
    cancel: CancellationToken,
}

/// Per-run bookkeeping kept outside `Orchestrator` so borrows stay disjoint.
struct RunState {
    graph: TaskGraph,
    scheduler: PriorityScheduler,
    running: HashSet<TaskId>,
    deferred: Vec<TaskId>,
    sequence: HashMap<TaskId, usize>,
}

impl Orchestrator {
    /// Create an orchestrator with default limits.
    pub fn new(handlers: HandlerRegistry) -> Self {
        Self::with_config(&Config::default(), handlers)
    }

    pub fn with_config(config: &Config, handlers: HandlerRegistry) -> Self {
        Self {
            settings: config.orchestrator,
            retry: config.retry,
            registry: TaskRegistry::new(),
            handlers,
            breakers: BreakerBoard::new(config.circuit_breaker),
            monitor: AgentMonitor::new(),
            shared: SharedContext::new(),
            subscribers: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Worker ceiling, at least one.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.settings.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Per-invocation timeout, rounded to whole milliseconds and at least one.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.settings.task_timeout_ms = u64::try_from(timeout.as_millis())
            .unwrap_or(u64::MAX)
            .max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_breaker(mut self, config: BreakerConfig) -> Self {
        self.breakers = BreakerBoard::new(config);
        self
    }

    /// Register a task. It stays pending until the next `run`.
    pub fn submit(&mut self, task: Task) -> Result<TaskId> {
        debug!(
            task_id = %task.id,
            name = %task.name,
            agent = %task.agent,
            priority = %task.priority,
            dependencies = task.dependencies.len(),
            "Task submitted"
        );
        self.registry.submit(task)
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.registry.get(id)
    }

    /// All tasks in submission order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.registry.iter()
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn handlers_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.handlers
    }

    pub fn shared(&self) -> &SharedContext {
        &self.shared
    }

    /// Publish a value to every handler through the shared context.
    pub async fn share_data(&self, key: &str, value: Value, ttl: Option<Duration>) {
        self.shared.put(key, value, ttl).await;
    }

    /// Token that stops the current and any later run when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Receive `RunEvent`s from every subsequent run.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<RunEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn breaker_state(&self, agent: AgentKind) -> BreakerState {
        self.breakers.state(agent)
    }

    pub fn health(&self) -> HealthReport {
        self.monitor.health_report(&self.breakers, &self.registry)
    }

    pub fn metrics(&self) -> OrchestratorMetrics {
        self.monitor.metrics(&self.registry)
    }

    pub fn history(&self) -> impl Iterator<Item = &ExecutionRecord> {
        self.monitor.history()
    }

    /// Resolve the execution order of every registered task.
    ///
    /// # Errors
    /// `UnknownDependency` or `Cycle` for a malformed graph, and
    /// `MissingHandler` when an unfinished task's agent has no handler.
    pub fn execution_order(&self) -> Result<Vec<TaskId>> {
        Ok(self.prepare()?.1)
    }

    fn prepare(&self) -> Result<(TaskGraph, Vec<TaskId>)> {
        let graph = self.registry.graph()?;
        let order = graph.resolve_order()?;
        self.handlers.verify(
            self.registry
                .iter()
                .filter(|t| !t.is_finished())
                .map(|t| t.agent),
        )?;
        Ok((graph, order))
    }

    /// Execute every unfinished task.
    ///
    /// Graph and handler problems are reported before any task starts.
    /// Per-task failures never abort the run; they are recorded in the
    /// returned summary.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let started = Instant::now();
        let (graph, order) = self.prepare()?;

        let run_ids: Vec<TaskId> = order
            .iter()
            .filter(|id| self.registry.get(id).is_some_and(|t| !t.is_finished()))
            .copied()
            .collect();
        let sequence = self
            .registry
            .ids()
            .iter()
            .enumerate()
            .map(|(seq, id)| (*id, seq))
            .collect();

        info!(
            tasks = run_ids.len(),
            max_concurrent = self.settings.max_concurrent,
            "Run starting"
        );

        let mut state = RunState {
            graph,
            scheduler: PriorityScheduler::new(),
            running: HashSet::new(),
            deferred: Vec::new(),
            sequence,
        };

        let settings = WorkerSettings {
            max_concurrent: self.settings.max_concurrent,
            task_timeout: self.settings.task_timeout(),
            retry: self.retry,
        };
        let (pool, mut completions) = WorkerPool::spawn(settings, self.cancel.clone());

        for id in &run_ids {
            self.settle(id, &mut state)?;
        }

        let outcome = self.drive(&mut state, &pool, &mut completions).await;
        pool.shutdown().await;
        outcome?;

        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            self.skip_unstarted(&run_ids)?;
        }

        let summary = self.summarize(&run_ids, cancelled, started.elapsed());
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            cancelled,
            duration_ms = summary.duration_ms,
            "Run complete"
        );
        self.emit(RunEvent::RunComplete {
            succeeded: summary.succeeded,
            failed: summary.failed,
            skipped: summary.skipped,
        });
        Ok(summary)
    }

    async fn drive(
        &mut self,
        state: &mut RunState,
        pool: &WorkerPool,
        completions: &mut mpsc::UnboundedReceiver<Completion>,
    ) -> Result<()> {
        loop {
            if !self.cancel.is_cancelled() {
                self.dispatch_ready(state, pool).await?;
            }

            if state.running.is_empty() {
                return Ok(());
            }

            let completion = completions.recv().await.ok_or(Error::PoolClosed)?;
            state.running.remove(&completion.task_id);
            self.handle_completion(completion, state)?;

            // Held-back tasks get another admission check.
            for id in std::mem::take(&mut state.deferred) {
                self.enqueue(&id, state)?;
            }
        }
    }

    /// Dispatch ready tasks while workers are free.
    async fn dispatch_ready(&mut self, state: &mut RunState, pool: &WorkerPool) -> Result<usize> {
        let mut dispatched = 0;

        while state.running.len() < pool.max_concurrent() {
            let Some(task_id) = state.scheduler.pop() else {
                break;
            };
            let agent = self
                .registry
                .get(&task_id)
                .ok_or(Error::TaskNotFound(task_id))?
                .agent;

            let (admission, transition) = self.breakers.admit(agent);
            if let Some(transition) = transition {
                self.on_breaker_transition(agent, transition);
            }

            match admission {
                Admission::Rejected => {
                    let reason = Error::AgentUnavailable(agent).to_string();
                    warn!(task_id = %task_id, agent = %agent, "Circuit open, failing task");
                    self.monitor.record_short_circuit(agent);
                    self.registry.get_mut(&task_id)?.fail(&reason)?;
                    self.emit(RunEvent::TaskFailed {
                        task_id,
                        error: reason,
                    });
                    self.skip_dependents(&task_id, state)?;
                }
                Admission::Deferred => {
                    debug!(task_id = %task_id, agent = %agent, "Trial in flight, deferring task");
                    state.deferred.push(task_id);
                }
                Admission::Allowed | Admission::Trial => {
                    let handler = self
                        .handlers
                        .get(agent)
                        .ok_or(Error::MissingHandler(agent))?;
                    let task = self.registry.get_mut(&task_id)?;
                    task.start()?;
                    let context = TaskContext {
                        task_id,
                        name: task.name.clone(),
                        payload: task.payload.clone(),
                        attempt: 0,
                        shared: self.shared.clone(),
                    };

                    pool.dispatch(Dispatch {
                        context,
                        agent,
                        handler,
                        trial: admission == Admission::Trial,
                    })
                    .await?;
                    state.running.insert(task_id);
                    dispatched += 1;

                    info!(
                        task_id = %task_id,
                        agent = %agent,
                        status = "running",
                        trial = admission == Admission::Trial,
                        "Task started"
                    );
                    self.emit(RunEvent::TaskStarted { task_id, agent });
                }
            }
        }

        Ok(dispatched)
    }

    fn handle_completion(&mut self, completion: Completion, state: &mut RunState) -> Result<()> {
        let Completion {
            task_id,
            agent,
            outcome,
            attempts,
            elapsed,
            trial,
        } = completion;

        let task = self.registry.get_mut(&task_id)?;
        task.attempts += attempts;

        match outcome {
            Ok(value) => {
                task.succeed(value)?;
                self.monitor.record_execution(task, elapsed);
                info!(
                    task_id = %task_id,
                    agent = %agent,
                    status = "succeeded",
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Task succeeded"
                );
                if let Some(transition) = self.breakers.record_success(agent, trial) {
                    self.on_breaker_transition(agent, transition);
                }
                self.emit(RunEvent::TaskSucceeded { task_id });

                for dependent in state.graph.dependents(&task_id) {
                    self.settle(&dependent, state)?;
                }
            }
            Err(err) => {
                let message = err.to_string();
                task.fail(&message)?;
                self.monitor.record_execution(task, elapsed);

                if matches!(err, Error::Cancelled) {
                    info!(task_id = %task_id, agent = %agent, status = "failed", "Task cancelled");
                    if trial {
                        self.breakers.release_trial(agent);
                    }
                } else {
                    let failure = Error::AgentExecution {
                        agent,
                        message: message.clone(),
                    };
                    error!(
                        task_id = %task_id,
                        status = "failed",
                        attempts,
                        error = %failure,
                        "Task failed"
                    );
                    if let Some(transition) = self.breakers.record_failure(agent, trial) {
                        self.on_breaker_transition(agent, transition);
                    }
                }

                self.emit(RunEvent::TaskFailed {
                    task_id,
                    error: message,
                });
                self.skip_dependents(&task_id, state)?;
            }
        }

        Ok(())
    }

    /// Ready a pending task whose dependencies all succeeded, or skip it
    /// if one of them did not. Otherwise leave it pending.
    fn settle(&mut self, id: &TaskId, state: &mut RunState) -> Result<()> {
        let task = self.registry.get(id).ok_or(Error::TaskNotFound(*id))?;
        if task.status != TaskStatus::Pending {
            return Ok(());
        }

        let mut all_succeeded = true;
        let mut blocked_by = None;
        for dep_id in &task.dependencies {
            let dep = self.registry.get(dep_id).ok_or(Error::TaskNotFound(*dep_id))?;
            match dep.status {
                TaskStatus::Succeeded => {}
                TaskStatus::Failed | TaskStatus::Skipped => {
                    blocked_by = Some(*dep_id);
                    break;
                }
                _ => all_succeeded = false,
            }
        }

        if let Some(dependency) = blocked_by {
            self.skip_task(id, &dependency)?;
            return self.skip_dependents(id, state);
        }

        if all_succeeded {
            self.registry.get_mut(id)?.mark_ready()?;
            debug!(task_id = %id, status = "ready", "Task ready");
            self.emit(RunEvent::TaskReady { task_id: *id });
            self.enqueue(id, state)?;
        }
        Ok(())
    }

    fn enqueue(&self, id: &TaskId, state: &mut RunState) -> Result<()> {
        let task = self.registry.get(id).ok_or(Error::TaskNotFound(*id))?;
        let seq = state.sequence.get(id).copied().unwrap_or(usize::MAX);
        state.scheduler.push(task, seq);
        Ok(())
    }

    /// Skip every pending task downstream of `root`, each with a reason
    /// naming the dependency that did not succeed.
    fn skip_dependents(&mut self, root: &TaskId, state: &RunState) -> Result<()> {
        let mut queue = VecDeque::from([*root]);
        while let Some(current) = queue.pop_front() {
            for dependent in state.graph.dependents(&current) {
                let pending = self
                    .registry
                    .get(&dependent)
                    .is_some_and(|t| t.status == TaskStatus::Pending);
                if pending {
                    self.skip_task(&dependent, &current)?;
                    queue.push_back(dependent);
                }
            }
        }
        Ok(())
    }

    fn skip_task(&mut self, id: &TaskId, dependency: &TaskId) -> Result<()> {
        let dep = self
            .registry
            .get(dependency)
            .ok_or(Error::TaskNotFound(*dependency))?;
        let reason = Error::DependencyFailed {
            dependency: format!("{} ({})", dep.name, dep.id.short()),
            status: dep.status,
        }
        .to_string();

        self.registry.get_mut(id)?.skip(&reason)?;
        info!(task_id = %id, status = "skipped", reason = %reason, "Task skipped");
        self.emit(RunEvent::TaskSkipped {
            task_id: *id,
            reason,
        });
        Ok(())
    }

    /// Skip every task of the run that never started.
    fn skip_unstarted(&mut self, run_ids: &[TaskId]) -> Result<()> {
        let reason = Error::Cancelled.to_string();
        for id in run_ids {
            let task = self.registry.get_mut(id)?;
            if matches!(task.status, TaskStatus::Pending | TaskStatus::Ready) {
                task.skip(&reason)?;
                info!(task_id = %id, status = "skipped", reason = %reason, "Task skipped");
                self.emit(RunEvent::TaskSkipped {
                    task_id: *id,
                    reason: reason.clone(),
                });
            }
        }
        Ok(())
    }

    fn on_breaker_transition(&mut self, agent: AgentKind, transition: Transition) {
        let Transition { from, to } = transition;
        match to {
            BreakerState::Open => warn!(agent = %agent, from = %from, to = %to, "Circuit opened"),
            _ => info!(agent = %agent, from = %from, to = %to, "Circuit state changed"),
        }
        self.emit(RunEvent::BreakerTransition { agent, from, to });
    }

    fn emit(&mut self, event: RunEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn summarize(&self, run_ids: &[TaskId], cancelled: bool, elapsed: Duration) -> RunSummary {
        let outcomes: Vec<TaskOutcome> = run_ids
            .iter()
            .filter_map(|id| self.registry.get(id))
            .map(TaskOutcome::from)
            .collect();
        let count = |status: TaskStatus| outcomes.iter().filter(|o| o.status == status).count();

        RunSummary {
            total: outcomes.len(),
            succeeded: count(TaskStatus::Succeeded),
            failed: count(TaskStatus::Failed),
            skipped: count(TaskStatus::Skipped),
            cancelled,
            duration_ms: elapsed.as_millis() as u64,
            outcomes,
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("tasks", &self.registry.len())
            .field("handlers", &self.handlers)
            .field("max_concurrent", &self.settings.max_concurrent)
            .finish()
    }
}
