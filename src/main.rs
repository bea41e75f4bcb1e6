use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use switchyard_catalog::BlockCatalog;
use switchyard_config::{ConfigExport, WorkflowDef};
use switchyard_engine::{
  BlockExecutor, ChannelNotifier, CompiledWorkflow, DryRunExecutor, Engine, EngineConfig, ExecutionNotifier,
  HttpExecutor, HttpExecutorConfig, NoopNotifier, RunControl, RunStatus,
};
use switchyard_workflow::{Workflow, plan};

/// Switchyard - a visual automation engine for network operations
#[derive(Parser)]
#[command(name = "switchyard")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.switchyard)
  #[arg(long, global = true, env = "SWITCHYARD_DATA_DIR")]
  data_dir: Option<PathBuf>,

  /// Block catalog to use instead of <data-dir>/catalog.json
  #[arg(long, global = true, env = "SWITCHYARD_CATALOG")]
  catalog: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Check a workflow file and report every problem found
  Validate {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
  },

  /// Print the level plan of a workflow as JSON
  Plan {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
  },

  /// Run a workflow to completion
  Run(RunArgs),

  /// Write the per-node parameters of a workflow
  Export {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
  },

  /// Apply an exported parameter document onto a workflow
  Import {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,

    /// Path to the exported config document
    config_file: PathBuf,

    /// Overwrite the workflow file instead of printing the result
    #[arg(long)]
    write: bool,
  },
}

#[derive(Args)]
struct RunArgs {
  /// Path to the workflow file (JSON)
  workflow_file: PathBuf,

  /// Base URL of the remote block executor
  #[arg(long, env = "SWITCHYARD_EXECUTOR_URL")]
  executor_url: Option<String>,

  /// Echo resolved parameters instead of calling an executor. Wins over --executor-url.
  #[arg(long)]
  dry_run: bool,

  /// Variable override, as name=value. Values that parse as JSON are used as such.
  #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_var)]
  vars: Vec<(String, Value)>,

  /// Stop at the first level boundary after an unrecovered failure
  #[arg(long, env = "SWITCHYARD_FAIL_FAST")]
  fail_fast: bool,

  #[arg(long, env = "SWITCHYARD_MAX_LOOP_ITERATIONS", default_value_t = EngineConfig::default().max_loop_iterations)]
  max_loop_iterations: usize,

  #[arg(long, env = "SWITCHYARD_EVENT_LOG_CAPACITY", default_value_t = EngineConfig::default().event_log_capacity)]
  event_log_capacity: usize,

  /// Per-request timeout for the executor, in milliseconds
  #[arg(long, env = "SWITCHYARD_REQUEST_TIMEOUT_MS", default_value_t = 30_000)]
  request_timeout_ms: u64,

  /// Write each event-log entry to stderr as a JSON line
  #[arg(long)]
  json_events: bool,
}

fn parse_var(raw: &str) -> Result<(String, Value), String> {
  let (name, value) = raw
    .split_once('=')
    .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
  if name.is_empty() {
    return Err(format!("empty variable name in '{raw}'"));
  }
  let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
  Ok((name.to_string(), value))
}

fn main() -> Result<ExitCode> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory; pass --data-dir")?
      .join(".switchyard"),
  };
  let catalog = load_catalog(cli.catalog.as_deref(), &data_dir)?;

  match cli.command {
    Commands::Validate { workflow_file } => validate(&workflow_file, &catalog),
    Commands::Plan { workflow_file } => print_plan(&workflow_file, &catalog),
    Commands::Run(args) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(run_workflow(args, catalog))
    }
    Commands::Export { workflow_file, output } => export(&workflow_file, output.as_deref()),
    Commands::Import {
      workflow_file,
      config_file,
      write,
    } => import(&workflow_file, &config_file, write),
  }
}

fn load_catalog(explicit: Option<&Path>, data_dir: &Path) -> Result<BlockCatalog> {
  if let Some(path) = explicit {
    return BlockCatalog::load(path).with_context(|| format!("failed to load catalog: {}", path.display()));
  }
  let path = data_dir.join("catalog.json");
  if path.is_file() {
    let catalog =
      BlockCatalog::load(&path).with_context(|| format!("failed to load catalog: {}", path.display()))?;
    info!(path = %path.display(), version = %catalog.version(), "using catalog");
    return Ok(catalog);
  }
  Ok(BlockCatalog::builtin())
}

fn read_workflow(path: &Path) -> Result<WorkflowDef> {
  let contents =
    std::fs::read_to_string(path).with_context(|| format!("failed to read workflow file: {}", path.display()))?;
  WorkflowDef::from_json(&contents).with_context(|| format!("failed to parse workflow file: {}", path.display()))
}

fn build(path: &Path, catalog: &BlockCatalog) -> Result<Workflow> {
  let def = read_workflow(path)?;
  Workflow::build(&def, catalog).with_context(|| format!("workflow '{}' failed validation", def.id))
}

fn validate(path: &Path, catalog: &BlockCatalog) -> Result<ExitCode> {
  let def = read_workflow(path)?;
  match Workflow::build(&def, catalog) {
    Ok(workflow) => {
      println!(
        "{}: ok ({} nodes, {} edges)",
        workflow.id(),
        workflow.len(),
        workflow.graph().edges().len()
      );
      Ok(ExitCode::SUCCESS)
    }
    Err(errors) => {
      println!("{}: {} problem(s)", def.id, errors.len());
      for error in errors {
        println!("  - {error}");
      }
      Ok(ExitCode::FAILURE)
    }
  }
}

fn print_plan(path: &Path, catalog: &BlockCatalog) -> Result<ExitCode> {
  let workflow = build(path, catalog)?;
  println!("{}", serde_json::to_string_pretty(&plan(&workflow))?);
  Ok(ExitCode::SUCCESS)
}

fn executor(args: &RunArgs) -> Result<Arc<dyn BlockExecutor>> {
  if args.dry_run {
    return Ok(Arc::new(DryRunExecutor));
  }
  let Some(base_url) = &args.executor_url else {
    bail!("no executor configured; pass --executor-url, set SWITCHYARD_EXECUTOR_URL or use --dry-run");
  };
  let config = HttpExecutorConfig::new(base_url.clone()).with_timeout(Duration::from_millis(args.request_timeout_ms));
  let executor = HttpExecutor::new(&config).context("failed to create executor client")?;
  Ok(Arc::new(executor))
}

async fn run_workflow(args: RunArgs, catalog: BlockCatalog) -> Result<ExitCode> {
  let workflow = build(&args.workflow_file, &catalog)?;
  let compiled = Arc::new(CompiledWorkflow::new(workflow));
  eprintln!(
    "Loaded workflow: {} ({} levels)",
    compiled.workflow().name(),
    compiled.plan().total_levels()
  );

  let config = EngineConfig {
    event_log_capacity: args.event_log_capacity,
    max_loop_iterations: args.max_loop_iterations,
    fail_fast: args.fail_fast,
  };

  let (notifier, printer): (Arc<dyn ExecutionNotifier>, _) = if args.json_events {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
      while let Some(entry) = rx.recv().await {
        match serde_json::to_string(&entry) {
          Ok(line) => eprintln!("{line}"),
          Err(e) => warn!(error = %e, "failed to encode log entry"),
        }
      }
    });
    (Arc::new(ChannelNotifier::new(tx)), Some(printer))
  } else {
    (Arc::new(NoopNotifier), None)
  };

  let engine = Engine::with_notifier(executor(&args)?, notifier, config);
  let overrides: Map<String, Value> = args.vars.into_iter().collect();
  let control = RunControl::new();
  let handle = engine
    .launch(compiled, &overrides, control.clone())
    .context("failed to start run")?;
  info!(run_id = %handle.run_id(), "run started");

  let interrupt = control.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupt received, cancelling run");
      interrupt.cancel();
    }
  });

  let state = handle.wait().await.context("run did not finish")?;
  drop(engine);
  if let Some(printer) = printer {
    let _ = printer.await;
  }

  println!("{}", serde_json::to_string_pretty(&state)?);
  if state.status == RunStatus::Completed {
    Ok(ExitCode::SUCCESS)
  } else {
    eprintln!("Run {} finished {}", state.id, state.status);
    for error in state.unrecovered_errors() {
      eprintln!("  - {}: {}", error.node_id, error.message);
    }
    Ok(ExitCode::FAILURE)
  }
}

fn export(path: &Path, output: Option<&Path>) -> Result<ExitCode> {
  let def = read_workflow(path)?;
  let document = serde_json::to_string_pretty(&ConfigExport::from_workflow(&def))?;
  match output {
    Some(out) => {
      std::fs::write(out, document).with_context(|| format!("failed to write config: {}", out.display()))?;
      eprintln!("Exported {} blocks to {}", def.nodes.len(), out.display());
    }
    None => println!("{document}"),
  }
  Ok(ExitCode::SUCCESS)
}

fn import(path: &Path, config_path: &Path, write: bool) -> Result<ExitCode> {
  let mut def = read_workflow(path)?;
  let contents = std::fs::read_to_string(config_path)
    .with_context(|| format!("failed to read config file: {}", config_path.display()))?;
  let document: ConfigExport = serde_json::from_str(&contents)
    .with_context(|| format!("failed to parse config file: {}", config_path.display()))?;
  if document.workflow_id != def.id {
    warn!(
      expected = %def.id,
      found = %document.workflow_id,
      "config was exported from a different workflow"
    );
  }

  let report = document.apply_to(&mut def);
  eprintln!("Updated {} blocks, skipped {}", report.updated, report.skipped);

  let rendered = serde_json::to_string_pretty(&def)?;
  if write {
    std::fs::write(path, rendered).with_context(|| format!("failed to write workflow file: {}", path.display()))?;
  } else {
    println!("{rendered}");
  }
  if report.skipped > 0 && report.updated == 0 {
    return Err(anyhow!("no block in the config matched the workflow"));
  }
  Ok(ExitCode::SUCCESS)
}
