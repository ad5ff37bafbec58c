use crate::agent::AgentKind;
use crate::core::task::Priority;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// One step of a named workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Step number, used in the generated task name.
    pub step: u32,
    pub agent: AgentKind,
    /// Tool the agent should run; passed to the handler as `tool`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Input template, resolved against the caller's context.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub input: Value,
    /// Key under which the step's result is reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default)]
    pub priority: Priority,
}

/// A multi-step workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorkflowDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Run every step at once instead of chaining them.
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowDef {
    /// Check that the workflow has steps with distinct numbers and
    /// distinct output keys.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.steps.is_empty() {
            return Err("workflow has no steps".to_string());
        }

        let mut numbers = HashSet::new();
        let mut outputs = HashSet::new();
        for step in &self.steps {
            if !numbers.insert(step.step) {
                return Err(format!("duplicate step number {}", step.step));
            }
            if let Some(output) = &step.output {
                if !outputs.insert(output.as_str()) {
                    return Err(format!("duplicate output key '{}'", output));
                }
            }
        }
        Ok(())
    }
}
