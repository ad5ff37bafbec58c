//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Handlers that record calls, fail, flake, stall, or follow a script
//! - Building orchestrators with small limits
//! - Draining run events

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use devskyy::agent::{AgentHandler, AgentKind, HandlerRegistry, TaskContext};
use devskyy::config::Config;
use devskyy::core::Task;
use devskyy::orchestration::{BreakerConfig, Orchestrator, RunEvent};
use devskyy::{Error, Result};

/// Echoes the payload and records call order and concurrency.
#[derive(Default)]
pub struct RecordingHandler {
    /// Task names in the order their handler started.
    pub started: Mutex<Vec<String>>,
    /// `start:<name>` and `end:<name>` entries in the order they happened.
    pub timeline: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    /// Highest number of concurrent invocations observed.
    pub peak: AtomicUsize,
    /// Time each invocation takes.
    pub delay: Duration,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn timeline(&self) -> Vec<String> {
        self.timeline.lock().unwrap().clone()
    }

    /// Position of `entry` in the timeline.
    pub fn position(&self, entry: &str) -> usize {
        self.timeline()
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("{} not in timeline", entry))
    }

    pub fn calls(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentHandler for RecordingHandler {
    async fn handle(&self, ctx: TaskContext) -> Result<Value> {
        self.started.lock().unwrap().push(ctx.name.clone());
        self.timeline.lock().unwrap().push(format!("start:{}", ctx.name));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        } else {
            tokio::task::yield_now().await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.timeline.lock().unwrap().push(format!("end:{}", ctx.name));
        Ok(json!({ "task": ctx.name, "payload": ctx.payload }))
    }
}

/// Fails every call with a fixed message.
pub struct FailingHandler {
    pub message: String,
    pub calls: AtomicU32,
}

impl FailingHandler {
    pub fn new(message: &str) -> Arc<Self> {
        Arc::new(Self {
            message: message.to_string(),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentHandler for FailingHandler {
    async fn handle(&self, _ctx: TaskContext) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::Handler(self.message.clone()))
    }
}

/// Fails the first `failures` calls, then succeeds.
pub struct FlakyHandler {
    pub failures: u32,
    pub calls: AtomicU32,
}

impl FlakyHandler {
    pub fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentHandler for FlakyHandler {
    async fn handle(&self, ctx: TaskContext) -> Result<Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(Error::Handler(format!("transient failure {}", call + 1)));
        }
        Ok(json!({ "task": ctx.name, "attempt": ctx.attempt }))
    }
}

/// Fails while `failing` is set, succeeds otherwise.
pub struct SwitchHandler {
    pub failing: AtomicBool,
    pub calls: AtomicU32,
}

impl SwitchHandler {
    pub fn new(failing: bool) -> Arc<Self> {
        Arc::new(Self {
            failing: AtomicBool::new(failing),
            calls: AtomicU32::new(0),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentHandler for SwitchHandler {
    async fn handle(&self, ctx: TaskContext) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err(Error::Handler("upstream unavailable".to_string()))
        } else {
            Ok(json!({ "task": ctx.name }))
        }
    }
}

/// Sleeps and then succeeds or fails according to a per-task script.
/// Tasks missing from the script succeed at once.
#[derive(Default)]
pub struct ScriptedHandler {
    script: HashMap<String, (Duration, bool)>,
    /// `start:<name>` and `end:<name>` entries in the order they happened.
    pub timeline: Mutex<Vec<String>>,
}

impl ScriptedHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `name` take `delay` and then fail when `fails` is set.
    pub fn step(mut self, name: &str, delay: Duration, fails: bool) -> Self {
        self.script.insert(name.to_string(), (delay, fails));
        self
    }

    pub fn position(&self, entry: &str) -> usize {
        self.timeline
            .lock()
            .unwrap()
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("{} not in timeline", entry))
    }
}

#[async_trait]
impl AgentHandler for ScriptedHandler {
    async fn handle(&self, ctx: TaskContext) -> Result<Value> {
        self.timeline.lock().unwrap().push(format!("start:{}", ctx.name));
        let (delay, fails) = self
            .script
            .get(&ctx.name)
            .copied()
            .unwrap_or((Duration::ZERO, false));
        tokio::time::sleep(delay).await;
        self.timeline.lock().unwrap().push(format!("end:{}", ctx.name));

        if fails {
            Err(Error::Handler(format!("{} failed", ctx.name)))
        } else {
            Ok(json!({ "task": ctx.name }))
        }
    }
}

/// Never finishes on its own.
pub struct StalledHandler;

#[async_trait]
impl AgentHandler for StalledHandler {
    async fn handle(&self, _ctx: TaskContext) -> Result<Value> {
        std::future::pending::<()>().await;
        Ok(Value::Null)
    }
}

/// Panics on every call.
pub struct PanickingHandler;

#[async_trait]
impl AgentHandler for PanickingHandler {
    async fn handle(&self, ctx: TaskContext) -> Result<Value> {
        if ctx.attempt < u32::MAX {
            panic!("renderer crashed on {}", ctx.name);
        }
        Ok(Value::Null)
    }
}

/// Registry with `handler` registered for every agent kind.
pub fn registry_for_all(handler: Arc<dyn AgentHandler>) -> HandlerRegistry {
    let mut handlers = HandlerRegistry::new();
    for kind in AgentKind::ALL {
        handlers.register(kind, Arc::clone(&handler));
    }
    handlers
}

/// Config with a small pool and a breaker that opens after `threshold`
/// failures.
pub fn test_config(max_concurrent: usize, threshold: u32, cooldown: Duration) -> Config {
    let mut config = Config::default();
    config.orchestrator.max_concurrent = max_concurrent;
    config.circuit_breaker = BreakerConfig {
        failure_threshold: threshold,
        cooldown_ms: cooldown.as_millis() as u64,
    };
    config
}

pub fn orchestrator(config: &Config, handlers: HandlerRegistry) -> Orchestrator {
    Orchestrator::with_config(config, handlers)
}

/// Create a task for `agent` whose payload carries its name.
pub fn task(name: &str, agent: AgentKind) -> Task {
    Task::new(name, agent, json!({ "name": name }))
}

/// Drain every event published so far.
pub fn drain_events(rx: &mut mpsc::UnboundedReceiver<RunEvent>) -> Vec<RunEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
