//! Named multi-step workflows and plan files.
//!
//! A workflow expands into one task per step. Sequential workflows chain
//! each step on the one before it; parallel workflows leave the steps
//! independent and let the orchestrator run them side by side.

mod input;
mod plan;
mod types;

pub use input::resolve_input;
pub use plan::{Plan, PlanEntry, PlannedTasks};
pub use types::{WorkflowDef, WorkflowStep};

use crate::core::task::{Task, TaskId};
use crate::error::{Error, Result};
use crate::orchestration::{Orchestrator, RunSummary};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

/// Tasks generated from a workflow, with the output key of each step.
#[derive(Debug, Clone)]
pub struct ExpandedWorkflow {
    pub tasks: Vec<Task>,
    /// `(output key, task)` for every step that declares an output.
    pub outputs: Vec<(String, TaskId)>,
}

/// Outcome of [`run_workflow`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub workflow: String,
    pub summary: RunSummary,
    /// Results of succeeded steps, keyed by output name.
    pub outputs: Map<String, Value>,
}

/// Build the tasks for `def`, resolving step inputs against `context`.
pub fn expand(name: &str, def: &WorkflowDef, context: &Value) -> Result<ExpandedWorkflow> {
    def.validate()
        .map_err(|e| Error::Validation(format!("workflow '{}': {}", name, e)))?;

    let mut tasks: Vec<Task> = Vec::with_capacity(def.steps.len());
    let mut outputs = Vec::new();

    for step in &def.steps {
        let payload = step_payload(step, context);
        let mut task = Task::new(&format!("{}_step_{}", name, step.step), step.agent, payload)
            .with_priority(step.priority);
        if !def.parallel {
            if let Some(previous) = tasks.last() {
                task = task.depends_on(previous.id);
            }
        }
        if let Some(output) = &step.output {
            outputs.push((output.clone(), task.id));
        }
        tasks.push(task);
    }

    Ok(ExpandedWorkflow { tasks, outputs })
}

/// Resolved input, with the step's tool added under `tool`.
fn step_payload(step: &WorkflowStep, context: &Value) -> Value {
    let resolved = resolve_input(&step.input, context);
    let Some(tool) = &step.tool else {
        return resolved;
    };
    match resolved {
        Value::Object(mut fields) => {
            fields.insert("tool".to_string(), json!(tool));
            Value::Object(fields)
        }
        other => json!({ "tool": tool, "input": other }),
    }
}

/// Expand `def`, run it on `orchestrator` and collect step outputs.
pub async fn run_workflow(
    orchestrator: &mut Orchestrator,
    name: &str,
    def: &WorkflowDef,
    context: &Value,
) -> Result<WorkflowRun> {
    let expanded = expand(name, def, context)?;
    info!(
        workflow = name,
        steps = expanded.tasks.len(),
        parallel = def.parallel,
        "Executing workflow"
    );

    for task in expanded.tasks {
        orchestrator.submit(task)?;
    }
    let summary = orchestrator.run().await?;

    let mut outputs = Map::new();
    for (key, id) in expanded.outputs {
        if let Some(result) = orchestrator.task(&id).and_then(|t| t.result.clone()) {
            outputs.insert(key, result);
        }
    }

    info!(workflow = name, summary = %summary, "Workflow completed");
    Ok(WorkflowRun {
        workflow: name.to_string(),
        summary,
        outputs,
    })
}
