//! End-to-end workflow tests.
//!
//! Verify the full path from configuration to results: workflows defined
//! in a config file and plan files on disk are expanded into tasks, run
//! on the simulated agents, and reported back by output key.

use std::fs;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use devskyy::agent::{AgentKind, HandlerRegistry};
use devskyy::config::Config;
use devskyy::core::{Priority, TaskStatus};
use devskyy::orchestration::Orchestrator;
use devskyy::workflow::{run_workflow, Plan};
use devskyy::Error;

const CONFIG: &str = r#"
[orchestrator]
max_concurrent = 4

[circuit_breaker]
failure_threshold = 3

[agents.data_reasoning]
name = "Data Reasoning Engine"
capabilities = ["trend_analysis", "reporting"]
priority = "medium"

[agents.growth_stack]
name = "Growth Stack"
capabilities = ["publish_listing", "reporting"]
tools = ["woocommerce"]
priority = "high"

[workflows.product_launch]
description = "Research, shoot and list a new product"

[[workflows.product_launch.steps]]
step = 1
agent = "data_reasoning"
tool = "trend_analysis"
input = "${product}"
output = "trends"

[[workflows.product_launch.steps]]
step = 2
agent = "visual_foundry"
tool = "photo_enhance"
input = ["${product}", { style = "studio" }]
output = "photos"

[[workflows.product_launch.steps]]
step = 3
agent = "growth_stack"
tool = "publish_listing"
input = "launch day"
output = "listing"
priority = "high"

[workflows.daily_report]
parallel = true

[[workflows.daily_report.steps]]
step = 1
agent = "data_reasoning"
input = { report = "sales" }
output = "sales"

[[workflows.daily_report.steps]]
step = 2
agent = "growth_stack"
input = { simulate_failure = "ads API unreachable" }
output = "ads"

[[workflows.daily_report.steps]]
step = 3
agent = "professors_of_code"
input = { report = "errors" }
output = "errors"
"#;

fn load_config(dir: &TempDir) -> Config {
    let path = dir.path().join("devskyy.toml");
    fs::write(&path, CONFIG).unwrap();
    Config::load_from(&path).unwrap()
}

fn simulated(config: &Config) -> Orchestrator {
    Orchestrator::with_config(config, HandlerRegistry::simulated(Duration::from_millis(100)))
}

/// Test: a sequential workflow from the config file runs step by step.
///
/// Given the product_launch workflow and a product in the caller context
/// When the workflow runs on simulated agents
/// Then every step succeeds in order, each output key carries its step's
/// result, and step inputs were resolved from the context
#[tokio::test(start_paused = true)]
async fn test_config_workflow_runs_sequentially() {
    let dir = TempDir::new().unwrap();
    let config = load_config(&dir);
    assert_eq!(config.orchestrator.max_concurrent, 4);
    assert_eq!(config.circuit_breaker.failure_threshold, 3);

    let def = config.workflow("product_launch").unwrap().clone();
    let context = json!({ "product": { "sku": "SR-100", "name": "Rose Hoodie" } });
    let mut orchestrator = simulated(&config);

    let run = run_workflow(&mut orchestrator, "product_launch", &def, &context)
        .await
        .unwrap();

    assert!(run.summary.is_success());
    assert_eq!(run.summary.succeeded, 3);
    assert_eq!(run.workflow, "product_launch");

    let keys: Vec<&str> = run.outputs.keys().map(String::as_str).collect();
    assert_eq!(keys.len(), 3);
    for key in ["trends", "photos", "listing"] {
        assert!(keys.contains(&key));
    }

    let trends = &run.outputs["trends"];
    assert_eq!(trends["agent"], "data_reasoning");
    assert_eq!(trends["task"], "product_launch_step_1");
    assert_eq!(trends["tool"], "trend_analysis");
    assert_eq!(trends["input"]["sku"], "SR-100");

    let photos = &run.outputs["photos"];
    assert_eq!(photos["input"]["name"], "Rose Hoodie");
    assert_eq!(photos["input"]["style"], "studio");

    let listing = &run.outputs["listing"];
    assert_eq!(listing["input"]["input"], "launch day");
    assert_eq!(listing["tool"], "publish_listing");

    // Chained steps never overlap.
    let mut steps: Vec<_> = orchestrator.tasks().collect();
    steps.sort_by(|a, b| a.name.cmp(&b.name));
    for pair in steps.windows(2) {
        assert!(pair[0].completed_at.unwrap() <= pair[1].started_at.unwrap());
    }
    assert_eq!(steps[2].priority, Priority::High);
}

/// Test: a parallel workflow isolates a failing step.
///
/// Given the daily_report workflow where the ads step fails
/// When the workflow runs
/// Then the other steps still succeed and only their outputs are reported
#[tokio::test(start_paused = true)]
async fn test_parallel_workflow_partial_failure() {
    let dir = TempDir::new().unwrap();
    let config = load_config(&dir);
    let def = config.workflow("daily_report").unwrap().clone();
    let mut orchestrator = simulated(&config);

    let run = run_workflow(&mut orchestrator, "daily_report", &def, &json!({}))
        .await
        .unwrap();

    assert_eq!(run.summary.succeeded, 2);
    assert_eq!(run.summary.failed, 1);
    assert_eq!(run.summary.skipped, 0);
    assert!(run.outputs.contains_key("sales"));
    assert!(run.outputs.contains_key("errors"));
    assert!(!run.outputs.contains_key("ads"));

    let failure = run.summary.failures().next().unwrap();
    assert_eq!(failure.name, "daily_report_step_2");
    assert_eq!(failure.error.as_deref(), Some("ads API unreachable"));
}

/// Test: a failing step in a sequential workflow skips the rest.
///
/// Given a three-step sequential workflow whose second step fails
/// When the workflow runs
/// Then the third step is skipped and only the first output is reported
#[tokio::test(start_paused = true)]
async fn test_sequential_workflow_stops_at_failure() {
    let def: devskyy::workflow::WorkflowDef = toml::from_str(
        r#"
[[steps]]
step = 1
agent = "professors_of_code"
output = "lint"

[[steps]]
step = 2
agent = "professors_of_code"
input = { simulate_failure = "tests failed" }
output = "tests"

[[steps]]
step = 3
agent = "growth_stack"
output = "release"
"#,
    )
    .unwrap();
    let mut orchestrator = simulated(&Config::default());

    let run = run_workflow(&mut orchestrator, "release", &def, &json!({}))
        .await
        .unwrap();

    assert_eq!(
        (run.summary.succeeded, run.summary.failed, run.summary.skipped),
        (1, 1, 1)
    );
    assert_eq!(run.outputs.len(), 1);
    assert!(run.outputs.contains_key("lint"));

    let release = orchestrator
        .tasks()
        .find(|t| t.name == "release_step_3")
        .unwrap();
    assert_eq!(release.status, TaskStatus::Skipped);
    assert!(release.error.as_deref().unwrap().contains("release_step_2"));
}

/// Test: agent profiles from the config file answer capability lookups.
///
/// Given profiles for data_reasoning and growth_stack that both report
/// When simulated handlers are built with those profiles
/// Then a "reporting" lookup prefers the higher-priority growth_stack, and a
/// capability only data_reasoning declares finds it alone
#[test]
fn test_config_agent_profiles() {
    let dir = TempDir::new().unwrap();
    let config = load_config(&dir);
    let handlers = HandlerRegistry::simulated(Duration::ZERO).with_profiles(config.agents.clone());

    assert_eq!(
        handlers.agents_with_capabilities(&["reporting"]),
        vec![AgentKind::GrowthStack, AgentKind::DataReasoning]
    );
    assert_eq!(
        handlers.agents_with_capabilities(&["trend_analysis"]),
        vec![AgentKind::DataReasoning]
    );
    assert_eq!(handlers.tools(AgentKind::GrowthStack), ["woocommerce"]);
    assert!(handlers.capabilities(AgentKind::VisualFoundry).is_empty());
}

/// Test: an unknown workflow name is reported.
///
/// Given a config without a "checkout" workflow
/// When it is looked up
/// Then WorkflowNotFound is returned
#[test]
fn test_unknown_workflow() {
    let dir = TempDir::new().unwrap();
    let config = load_config(&dir);
    assert!(matches!(
        config.workflow("checkout"),
        Err(Error::WorkflowNotFound(name)) if name == "checkout"
    ));
}

/// Test: a plan file on disk runs with its dependencies intact.
///
/// Given a TOML plan where the listing depends on photos and copy
/// When it is loaded, submitted and run on simulated agents
/// Then all tasks succeed and the listing finishes last
#[tokio::test(start_paused = true)]
async fn test_plan_file_end_to_end() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("launch.toml");
    fs::write(
        &path,
        r#"
[[tasks]]
key = "photos"
agent = "visual_foundry"
priority = "high"
payload = { sku = "SR-100" }

[[tasks]]
key = "copy"
agent = "professors_of_code"
payload = { tone = "playful" }

[[tasks]]
key = "listing"
agent = "growth_stack"
depends_on = ["photos", "copy"]
"#,
    )
    .unwrap();

    let planned = Plan::load(&path).unwrap().into_tasks().unwrap();
    let mut orchestrator = simulated(&Config::default());
    for task in planned.tasks.iter().cloned() {
        orchestrator.submit(task).unwrap();
    }

    let order = orchestrator.execution_order().unwrap();
    assert_eq!(order.last(), planned.id("listing").as_ref());

    let summary = orchestrator.run().await.unwrap();
    assert!(summary.is_success());

    let listing = orchestrator.task(&planned.id("listing").unwrap()).unwrap();
    for key in ["photos", "copy"] {
        let dep = orchestrator.task(&planned.id(key).unwrap()).unwrap();
        assert!(dep.completed_at.unwrap() <= listing.started_at.unwrap());
    }
    assert_eq!(listing.result.as_ref().unwrap()["agent"], "growth_stack");

    let health = orchestrator.health();
    assert_eq!(health.total_tasks, 3);
    assert_eq!(health.active_tasks, 0);
    let metrics = orchestrator.metrics();
    assert_eq!(metrics.success_rate, 1.0);
    assert_eq!(orchestrator.history().count(), 3);
}
