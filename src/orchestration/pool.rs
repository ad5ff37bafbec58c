//! Bounded worker pool for handler invocations.
//!
//! The execution loop sends `Dispatch` items over a ready channel drained
//! by a fixed set of workers. Each worker runs the handler on its own task
//! (see [`crate::util::run_isolated`]) and reports a `Completion` on a
//! second channel. Retries happen inside the worker, so the loop sees one
//! outcome per dispatch.

use crate::agent::{AgentHandler, AgentKind, TaskContext};
use crate::core::task::TaskId;
use crate::error::{Error, Result};
use crate::orchestration::retry::{is_retryable, RetryPolicy};
use crate::util::run_isolated;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Work item for one task.
pub struct Dispatch {
    pub context: TaskContext,
    pub agent: AgentKind,
    pub handler: Arc<dyn AgentHandler>,
    /// Admitted as the half-open breaker's single trial.
    pub trial: bool,
}

/// Outcome of one dispatch, retries included.
#[derive(Debug)]
pub struct Completion {
    pub task_id: TaskId,
    pub agent: AgentKind,
    pub outcome: Result<Value>,
    /// Handler invocations made.
    pub attempts: u32,
    pub elapsed: Duration,
    pub trial: bool,
}

/// Limits applied to every invocation.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub max_concurrent: usize,
    pub task_timeout: Duration,
    pub retry: RetryPolicy,
}

/// Fixed set of workers sharing one ready channel.
pub struct WorkerPool {
    ready_tx: Option<mpsc::Sender<Dispatch>>,
    workers: Vec<JoinHandle<()>>,
    max_concurrent: usize,
}

impl WorkerPool {
    /// Start `settings.max_concurrent` workers.
    ///
    /// Returns the pool and the receiving end of the completion channel.
    pub fn spawn(
        settings: WorkerSettings,
        cancel: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let size = settings.max_concurrent.max(1);
        let (ready_tx, ready_rx) = mpsc::channel::<Dispatch>(size);
        let ready_rx = Arc::new(Mutex::new(ready_rx));
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        let workers = (0..size)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&ready_rx),
                    done_tx.clone(),
                    settings,
                    cancel.clone(),
                ))
            })
            .collect();

        let pool = Self {
            ready_tx: Some(ready_tx),
            workers,
            max_concurrent: size,
        };
        (pool, done_rx)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Hand a task to the next free worker.
    pub async fn dispatch(&self, dispatch: Dispatch) -> Result<()> {
        let tx = self.ready_tx.as_ref().ok_or(Error::PoolClosed)?;
        tx.send(dispatch).await.map_err(|_| Error::PoolClosed)
    }

    /// Close the ready channel and wait for every worker to exit.
    pub async fn shutdown(mut self) {
        self.ready_tx.take();
        for joined in futures::future::join_all(self.workers.drain(..)).await {
            if let Err(e) = joined {
                warn!(error = %e, "Worker exited abnormally");
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    ready_rx: Arc<Mutex<mpsc::Receiver<Dispatch>>>,
    done_tx: mpsc::UnboundedSender<Completion>,
    settings: WorkerSettings,
    cancel: CancellationToken,
) {
    loop {
        let next = {
            let mut rx = ready_rx.lock().await;
            rx.recv().await
        };
        let Some(dispatch) = next else {
            break;
        };

        debug!(
            worker = worker_id,
            task_id = %dispatch.context.task_id,
            agent = %dispatch.agent,
            "Worker picked up task"
        );
        let completion = execute(dispatch, &settings, &cancel).await;
        if done_tx.send(completion).is_err() {
            break;
        }
    }
}

/// Invoke the handler, retrying per the policy.
async fn execute(
    dispatch: Dispatch,
    settings: &WorkerSettings,
    cancel: &CancellationToken,
) -> Completion {
    let Dispatch {
        context,
        agent,
        handler,
        trial,
    } = dispatch;
    let task_id = context.task_id;
    let started = Instant::now();
    let max_attempts = settings.retry.max_attempts();
    let mut attempt = 0;

    let outcome = loop {
        let mut ctx = context.clone();
        ctx.attempt = attempt;
        let handler = Arc::clone(&handler);
        let result = run_isolated(
            async move { handler.handle(ctx).await },
            settings.task_timeout,
            cancel,
        )
        .await;
        attempt += 1;

        match result {
            Ok(value) => break Ok(value),
            Err(err) if attempt < max_attempts && is_retryable(&err) => {
                let delay = settings.retry.backoff(attempt - 1);
                warn!(
                    task_id = %task_id,
                    agent = %agent,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Handler failed, retrying"
                );
                tokio::select! {
                    _ = cancel.cancelled() => break Err(Error::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(err) => break Err(err),
        }
    };

    Completion {
        task_id,
        agent,
        outcome,
        attempts: attempt,
        elapsed: started.elapsed(),
        trial,
    }
}
