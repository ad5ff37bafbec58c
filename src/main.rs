use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};

use devskyy::agent::HandlerRegistry;
use devskyy::config::Config;
use devskyy::core::TaskStatus;
use devskyy::orchestration::{Orchestrator, RunSummary};
use devskyy::workflow::{run_workflow, Plan, PlannedTasks};
use devskyy::Result;

/// DevSkyy - dependency-aware orchestrator for agent task graphs
#[derive(Parser, Debug)]
#[command(name = "devskyy")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    DEVSKYY_DEBUG=1      Enable debug logging (alternative to --debug)\n    DEVSKYY_LOG=<filter> Log filter directive, e.g. devskyy=trace")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.devskyy/devskyy.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Config file to use instead of ~/.devskyy/devskyy.toml
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Execute a plan file with the built-in simulated agents
    Run {
        /// Plan file (TOML, or JSON by extension)
        plan: PathBuf,

        /// Print the full run summary as JSON
        #[arg(long)]
        report: bool,

        /// Simulated agent latency in milliseconds
        #[arg(long, default_value_t = 100)]
        delay_ms: u64,
    },

    /// Check a plan file and print its execution order
    Validate {
        /// Plan file (TOML, or JSON by extension)
        plan: PathBuf,
    },

    /// Run a workflow defined in the config file
    Workflow {
        /// Workflow name
        name: String,

        /// JSON file with the context used to resolve step inputs
        #[arg(long)]
        context: Option<PathBuf>,

        /// Simulated agent latency in milliseconds
        #[arg(long, default_value_t = 100)]
        delay_ms: u64,
    },

    /// List configured workflows
    Workflows,

    /// List agents and their capabilities
    Agents {
        /// Only agents offering this capability (repeatable)
        #[arg(long = "capability")]
        capabilities: Vec<String>,
    },

    /// Show the effective configuration
    Config {
        /// Write the defaults to the config file if it does not exist
        #[arg(long)]
        init: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on debug flag
    devskyy::log::init_with_debug(cli.debug);

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::config_path()?,
    };

    match cli.command {
        Command::Run {
            plan,
            report,
            delay_ms,
        } => run_plan(&config_path, &plan, report, delay_ms),
        Command::Validate { plan } => validate_plan(&config_path, &plan),
        Command::Workflow {
            name,
            context,
            delay_ms,
        } => run_named_workflow(&config_path, &name, context.as_deref(), delay_ms),
        Command::Workflows => list_workflows(&config_path),
        Command::Agents { capabilities } => list_agents(&config_path, &capabilities),
        Command::Config { init } => show_config(&config_path, init),
    }
}

fn build_handlers(config: &Config, delay_ms: u64) -> HandlerRegistry {
    HandlerRegistry::simulated(Duration::from_millis(delay_ms))
        .with_profiles(config.agents.clone())
}

fn build_orchestrator(config: &Config, delay_ms: u64) -> Orchestrator {
    Orchestrator::with_config(config, build_handlers(config, delay_ms))
}

/// Cancel the orchestrator's runs on Ctrl-C.
fn cancel_on_ctrl_c(orchestrator: &Orchestrator) {
    let token = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            token.cancel();
        }
    });
}

fn load_plan(path: &Path) -> Result<PlannedTasks> {
    info!(plan = %path.display(), "Loading plan");
    Plan::load(path)?.into_tasks()
}

fn run_plan(config_path: &Path, plan_path: &Path, report: bool, delay_ms: u64) -> Result<()> {
    let config = Config::load_from(config_path)?;
    let planned = load_plan(plan_path)?;

    // Create async runtime for the orchestrator
    let rt = tokio::runtime::Runtime::new()?;

    let summary = rt.block_on(async {
        let mut orchestrator = build_orchestrator(&config, delay_ms);
        cancel_on_ctrl_c(&orchestrator);
        for task in planned.tasks.iter().cloned() {
            orchestrator.submit(task)?;
        }
        orchestrator.run().await
    })?;

    if report {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary, |id| planned.key_of(id).map(str::to_string));
    }

    exit_for(&summary);
    Ok(())
}

fn validate_plan(config_path: &Path, plan_path: &Path) -> Result<()> {
    let config = Config::load_from(config_path)?;
    let planned = load_plan(plan_path)?;

    let mut orchestrator = build_orchestrator(&config, 0);
    for task in planned.tasks.iter().cloned() {
        orchestrator.submit(task)?;
    }
    let order = orchestrator.execution_order()?;

    println!("Plan is valid: {} tasks", order.len());
    println!();
    for (position, id) in order.iter().enumerate() {
        let Some(task) = orchestrator.task(id) else {
            continue;
        };
        let key = planned.key_of(id).unwrap_or("?");
        println!(
            "  {:>3}. {:<20} {:<24} {:<8}",
            position + 1,
            key,
            task.agent,
            task.priority
        );
    }
    Ok(())
}

fn run_named_workflow(
    config_path: &Path,
    name: &str,
    context_path: Option<&Path>,
    delay_ms: u64,
) -> Result<()> {
    let config = Config::load_from(config_path)?;
    let def = config.workflow(name)?.clone();
    let context: Value = match context_path {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => Value::Object(Default::default()),
    };

    let rt = tokio::runtime::Runtime::new()?;
    let run = rt.block_on(async {
        let mut orchestrator = build_orchestrator(&config, delay_ms);
        cancel_on_ctrl_c(&orchestrator);
        run_workflow(&mut orchestrator, name, &def, &context).await
    })?;

    println!("{}", serde_json::to_string_pretty(&run.outputs)?);
    eprintln!("{}: {}", run.workflow, run.summary);
    exit_for(&run.summary);
    Ok(())
}

fn list_workflows(config_path: &Path) -> Result<()> {
    let config = Config::load_from(config_path)?;
    if config.workflows.is_empty() {
        println!("No workflows configured in {}", config_path.display());
        return Ok(());
    }
    for (name, def) in &config.workflows {
        let mode = if def.parallel { "parallel" } else { "sequential" };
        println!(
            "  {:<24} {:>2} steps  {:<10} {}",
            name,
            def.steps.len(),
            mode,
            def.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn list_agents(config_path: &Path, capabilities: &[String]) -> Result<()> {
    let config = Config::load_from(config_path)?;
    let handlers = build_handlers(&config, 0);
    let required: Vec<&str> = capabilities.iter().map(String::as_str).collect();
    let agents = if required.is_empty() {
        handlers.kinds()
    } else {
        handlers.agents_with_capabilities(&required)
    };

    if agents.is_empty() {
        println!("No agents offer: {}", required.join(", "));
        return Ok(());
    }
    for kind in agents {
        let name = handlers
            .profile(kind)
            .and_then(|p| p.name.as_deref())
            .unwrap_or("");
        println!(
            "  {:<24} {:<20} {}",
            kind,
            name,
            handlers.capabilities(kind).join(", ")
        );
    }
    Ok(())
}

fn show_config(config_path: &Path, init: bool) -> Result<()> {
    let config = Config::load_from(config_path)?;
    if init && !config_path.exists() {
        config.save_to(config_path)?;
        println!("Wrote default config to {}", config_path.display());
    }
    println!("# {}", config_path.display());
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn print_summary<F>(summary: &RunSummary, label: F)
where
    F: Fn(&devskyy::core::TaskId) -> Option<String>,
{
    println!();
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║                       Run Complete                         ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();
    for outcome in &summary.outcomes {
        let name = label(&outcome.task_id).unwrap_or_else(|| outcome.name.clone());
        match outcome.status {
            TaskStatus::Succeeded => println!("  ✓ {:<24} {}", name, outcome.agent),
            _ => println!(
                "  ✗ {:<24} {:<10} {}",
                name,
                outcome.status,
                outcome.error.as_deref().unwrap_or("")
            ),
        }
    }
    println!();
    println!("  {}", summary);
}

fn exit_for(summary: &RunSummary) {
    if !summary.is_success() {
        std::process::exit(1);
    }
}
