//! Agent kinds, the handler trait, and the handler registry.
//!
//! Agents are in-process async handlers. The set of agent kinds is closed,
//! so a plan can be checked up front for kinds with no registered handler.
//! Each kind may also carry an [`AgentProfile`] from the `[agents.<kind>]`
//! config sections, describing what it can do.

use crate::core::task::{Priority, TaskId};
use crate::error::{Error, Result};
use crate::orchestration::SharedContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// The agents known to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Coordination and bookkeeping work.
    Orchestrator,
    /// Code review, analysis and generation.
    #[serde(rename = "professors_of_code")]
    ProfessorsOfCode,
    /// Marketing, SEO and commerce publishing.
    GrowthStack,
    /// Document processing, RAG and analytics.
    DataReasoning,
    /// Product imagery and 3D asset generation.
    VisualFoundry,
    /// Voice synthesis and video production.
    #[serde(rename = "voice_media_video_elite")]
    VoiceMediaVideo,
}

impl AgentKind {
    pub const ALL: [AgentKind; 6] = [
        AgentKind::Orchestrator,
        AgentKind::ProfessorsOfCode,
        AgentKind::GrowthStack,
        AgentKind::DataReasoning,
        AgentKind::VisualFoundry,
        AgentKind::VoiceMediaVideo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Orchestrator => "orchestrator",
            AgentKind::ProfessorsOfCode => "professors_of_code",
            AgentKind::GrowthStack => "growth_stack",
            AgentKind::DataReasoning => "data_reasoning",
            AgentKind::VisualFoundry => "visual_foundry",
            AgentKind::VoiceMediaVideo => "voice_media_video_elite",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        AgentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::UnknownAgent(s.to_string()))
    }
}

/// Everything a handler gets for one invocation.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: TaskId,
    pub name: String,
    pub payload: Value,
    /// Zero-based attempt number; non-zero only when retries are enabled.
    pub attempt: u32,
    pub shared: SharedContext,
}

/// An async unit of domain work, selected by `AgentKind`.
///
/// Returning `Err` marks the task failed with the error's message.
#[async_trait]
pub trait AgentHandler: Send + Sync {
    async fn handle(&self, ctx: TaskContext) -> Result<Value>;
}

/// Adapter turning an async closure into an `AgentHandler`.
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure as a shareable handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn AgentHandler>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

#[async_trait]
impl<F, Fut> AgentHandler for FnHandler<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn handle(&self, ctx: TaskContext) -> Result<Value> {
        (self.f)(ctx).await
    }
}

/// Stand-in handler that echoes its input after a short delay.
///
/// A payload carrying a `simulate_failure` string fails with that message.
pub struct SimulatedAgent {
    kind: AgentKind,
    delay: Duration,
}

impl SimulatedAgent {
    pub fn new(kind: AgentKind, delay: Duration) -> Self {
        Self { kind, delay }
    }
}

#[async_trait]
impl AgentHandler for SimulatedAgent {
    async fn handle(&self, ctx: TaskContext) -> Result<Value> {
        tokio::time::sleep(self.delay).await;

        if let Some(message) = ctx.payload.get("simulate_failure").and_then(Value::as_str) {
            return Err(Error::Handler(message.to_string()));
        }

        Ok(json!({
            "success": true,
            "agent": self.kind.as_str(),
            "task": ctx.name,
            "tool": ctx.payload.get("tool").cloned().unwrap_or(Value::Null),
            "input": ctx.payload,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }))
    }
}

/// What an agent kind offers, as declared in `[agents.<kind>]`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentProfile {
    /// Human-readable name, e.g. "Professors of Code".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub capabilities: Vec<String>,
    pub tools: Vec<String>,
    /// Preference among agents offering the same capabilities.
    pub priority: Priority,
}

impl AgentProfile {
    pub fn has_capabilities(&self, required: &[&str]) -> bool {
        required
            .iter()
            .all(|cap| self.capabilities.iter().any(|c| c == cap))
    }
}

/// Maps each agent kind to its handler and, optionally, its profile.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<AgentKind, Arc<dyn AgentHandler>>,
    profiles: HashMap<AgentKind, AgentProfile>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with a `SimulatedAgent` for every kind.
    pub fn simulated(delay: Duration) -> Self {
        let mut registry = Self::new();
        for kind in AgentKind::ALL {
            registry.register(kind, Arc::new(SimulatedAgent::new(kind, delay)));
        }
        registry
    }

    /// Register a handler, replacing any previous one for `kind`.
    pub fn register(&mut self, kind: AgentKind, handler: Arc<dyn AgentHandler>) -> &mut Self {
        self.handlers.insert(kind, handler);
        self
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, kind: AgentKind, handler: Arc<dyn AgentHandler>) -> Self {
        self.register(kind, handler);
        self
    }

    pub fn get(&self, kind: AgentKind) -> Option<Arc<dyn AgentHandler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn contains(&self, kind: AgentKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered kinds in declaration order.
    pub fn kinds(&self) -> Vec<AgentKind> {
        let mut kinds: Vec<AgentKind> = self.handlers.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Attach a profile to `kind`, replacing any previous one.
    pub fn set_profile(&mut self, kind: AgentKind, profile: AgentProfile) -> &mut Self {
        self.profiles.insert(kind, profile);
        self
    }

    /// Builder form of [`set_profile`](Self::set_profile) for many kinds.
    pub fn with_profiles<I>(mut self, profiles: I) -> Self
    where
        I: IntoIterator<Item = (AgentKind, AgentProfile)>,
    {
        self.profiles.extend(profiles);
        self
    }

    pub fn profile(&self, kind: AgentKind) -> Option<&AgentProfile> {
        self.profiles.get(&kind)
    }

    /// Declared capabilities of `kind`; empty without a profile.
    pub fn capabilities(&self, kind: AgentKind) -> &[String] {
        self.profile(kind)
            .map(|p| p.capabilities.as_slice())
            .unwrap_or_default()
    }

    /// Declared tools of `kind`; empty without a profile.
    pub fn tools(&self, kind: AgentKind) -> &[String] {
        self.profile(kind)
            .map(|p| p.tools.as_slice())
            .unwrap_or_default()
    }

    /// Registered kinds whose profile declares every capability in
    /// `required`, highest profile priority first. Ties keep declaration
    /// order. Kinds without a handler are never returned.
    pub fn agents_with_capabilities(&self, required: &[&str]) -> Vec<AgentKind> {
        let mut matches: Vec<(AgentKind, Priority)> = self
            .kinds()
            .into_iter()
            .filter_map(|kind| {
                let profile = self.profiles.get(&kind)?;
                profile
                    .has_capabilities(required)
                    .then_some((kind, profile.priority))
            })
            .collect();
        matches.sort_by_key(|(_, priority)| std::cmp::Reverse(priority.rank()));
        matches.into_iter().map(|(kind, _)| kind).collect()
    }

    /// Fail with `MissingHandler` for the first kind that has no handler.
    pub fn verify<I>(&self, kinds: I) -> Result<()>
    where
        I: IntoIterator<Item = AgentKind>,
    {
        for kind in kinds {
            if !self.contains(kind) {
                return Err(Error::MissingHandler(kind));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.kinds())
            .field("profiles", &self.profiles.len())
            .finish()
    }
}
