use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::agent::{AgentKind, AgentProfile};
use crate::orchestration::{BreakerConfig, RetryPolicy};
use crate::workflow::WorkflowDef;
use crate::{Error, Result};

/// Execution limits for the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Upper bound on handlers running at once.
    pub max_concurrent: usize,
    /// Per-invocation handler timeout.
    pub task_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 50,
            task_timeout_ms: 300_000,
        }
    }
}

impl OrchestratorConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub circuit_breaker: BreakerConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Capability profiles, one `[agents.<kind>]` section per agent.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub agents: BTreeMap<AgentKind, AgentProfile>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub workflows: BTreeMap<String, WorkflowDef>,
}

impl Config {
    pub fn devskyy_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".devskyy"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::devskyy_dir()?.join("devskyy.toml"))
    }

    pub fn log_path() -> Result<PathBuf> {
        Ok(Self::devskyy_dir()?.join("devskyy.log"))
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load_from(path: &Path) -> Result<Self> {
        let path = expand_tilde(&path.to_string_lossy());
        debug!(path = %path.display(), "Loading config");
        if !path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        config.validate()?;
        debug!(
            max_concurrent = config.orchestrator.max_concurrent,
            failure_threshold = config.circuit_breaker.failure_threshold,
            max_retries = config.retry.max_retries,
            agents = config.agents.len(),
            workflows = config.workflows.len(),
            "Config loaded"
        );
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!(dir = %parent.display(), "Creating config directory");
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "Config saved");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.max_concurrent == 0 {
            return Err(Error::Validation(
                "orchestrator.max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.orchestrator.task_timeout_ms == 0 {
            return Err(Error::Validation(
                "orchestrator.task_timeout_ms must be positive".to_string(),
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(Error::Validation(
                "circuit_breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        for (name, workflow) in &self.workflows {
            workflow
                .validate()
                .map_err(|e| Error::Validation(format!("workflow '{}': {}", name, e)))?;
        }
        Ok(())
    }

    pub fn workflow(&self, name: &str) -> Result<&WorkflowDef> {
        self.workflows
            .get(name)
            .ok_or_else(|| Error::WorkflowNotFound(name.to_string()))
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
