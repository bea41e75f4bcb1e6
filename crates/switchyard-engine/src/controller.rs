use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde_json::{Map, Value};
use switchyard_catalog::BlockCatalog;
use switchyard_config::WorkflowDef;
use tokio::sync::watch;
use tracing::{info, instrument};

use crate::control::RunControl;
use crate::engine::{CompiledWorkflow, Engine, RunHandle};
use crate::error::ExecutionError;
use crate::events::LogEntry;
use crate::state::{ExecutionState, RunStatus};

/// Registry of compiled workflows and the runs started from them.
///
/// Control calls return as soon as the request is recorded; the engine applies
/// pause and cancel at its next checkpoint. Watch [`RunController::subscribe`]
/// or call [`RunController::wait`] to observe the effect.
pub struct RunController {
  engine: Engine,
  workflows: RwLock<HashMap<String, Arc<CompiledWorkflow>>>,
  runs: Mutex<HashMap<String, RunHandle>>,
}

impl RunController {
  pub fn new(engine: Engine) -> Self {
    Self {
      engine,
      workflows: RwLock::new(HashMap::new()),
      runs: Mutex::new(HashMap::new()),
    }
  }

  pub fn engine(&self) -> &Engine {
    &self.engine
  }

  fn runs(&self) -> MutexGuard<'_, HashMap<String, RunHandle>> {
    self.runs.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Register a compiled workflow, replacing any with the same id.
  pub fn register(&self, compiled: CompiledWorkflow) -> Arc<CompiledWorkflow> {
    let compiled = Arc::new(compiled);
    self
      .workflows
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(compiled.id().to_string(), compiled.clone());
    info!(workflow_id = %compiled.id(), "workflow registered");
    compiled
  }

  /// Validate `def` and register it. Returns the workflow id.
  pub fn register_definition(&self, def: &WorkflowDef, catalog: &BlockCatalog) -> Result<String, ExecutionError> {
    let compiled = CompiledWorkflow::compile(def, catalog)?;
    Ok(self.register(compiled).id().to_string())
  }

  pub fn workflow(&self, workflow_id: &str) -> Option<Arc<CompiledWorkflow>> {
    self
      .workflows
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(workflow_id)
      .cloned()
  }

  pub fn start(&self, workflow_id: &str) -> Result<String, ExecutionError> {
    self.start_with(workflow_id, &Map::new())
  }

  /// Start a run with variable overrides. Returns the run id.
  #[instrument(skip(self, overrides))]
  pub fn start_with(&self, workflow_id: &str, overrides: &Map<String, Value>) -> Result<String, ExecutionError> {
    let compiled = self
      .workflow(workflow_id)
      .ok_or_else(|| ExecutionError::UnknownWorkflow {
        workflow_id: workflow_id.to_string(),
      })?;
    let handle = self.engine.launch(compiled, overrides, RunControl::new())?;
    let run_id = handle.run_id().to_string();
    self.runs().insert(run_id.clone(), handle);
    Ok(run_id)
  }

  fn with_run<R>(&self, run_id: &str, f: impl FnOnce(&RunHandle) -> Result<R, ExecutionError>) -> Result<R, ExecutionError> {
    let runs = self.runs();
    let handle = runs.get(run_id).ok_or_else(|| ExecutionError::UnknownRun {
      run_id: run_id.to_string(),
    })?;
    f(handle)
  }

  pub fn pause(&self, run_id: &str) -> Result<(), ExecutionError> {
    self.with_run(run_id, |handle| {
      let status = handle.status();
      if status.is_terminal() || !handle.control().pause() {
        return Err(ExecutionError::InvalidTransition {
          run_id: run_id.to_string(),
          action: "pause",
          status,
        });
      }
      info!(run_id, "pause requested");
      Ok(())
    })
  }

  pub fn resume(&self, run_id: &str) -> Result<(), ExecutionError> {
    self.with_run(run_id, |handle| {
      let status = handle.status();
      if status.is_terminal() || !handle.control().resume() {
        return Err(ExecutionError::InvalidTransition {
          run_id: run_id.to_string(),
          action: "resume",
          status,
        });
      }
      info!(run_id, "resume requested");
      Ok(())
    })
  }

  pub fn cancel(&self, run_id: &str) -> Result<(), ExecutionError> {
    self.with_run(run_id, |handle| {
      let status = handle.status();
      if status.is_terminal() {
        return Err(ExecutionError::InvalidTransition {
          run_id: run_id.to_string(),
          action: "cancel",
          status,
        });
      }
      handle.control().cancel();
      info!(run_id, "cancel requested");
      Ok(())
    })
  }

  pub fn subscribe(&self, run_id: &str) -> Result<watch::Receiver<ExecutionState>, ExecutionError> {
    self.with_run(run_id, |handle| Ok(handle.subscribe()))
  }

  pub fn snapshot(&self, run_id: &str) -> Result<ExecutionState, ExecutionError> {
    self.with_run(run_id, |handle| Ok(handle.snapshot()))
  }

  pub fn events(&self, run_id: &str) -> Result<Vec<LogEntry>, ExecutionError> {
    self.with_run(run_id, |handle| Ok(handle.events()))
  }

  /// Wait until the run reaches a terminal status and return that state.
  pub async fn wait(&self, run_id: &str) -> Result<ExecutionState, ExecutionError> {
    let mut snapshots = self.subscribe(run_id)?;
    let state = snapshots
      .wait_for(|state| state.status.is_terminal())
      .await
      .map_err(|_| ExecutionError::Failed {
        run_id: run_id.to_string(),
        message: "run ended without a final state".to_string(),
      })?
      .clone();
    Ok(state)
  }

  /// Every known run with its current status.
  pub fn list_runs(&self) -> Vec<(String, RunStatus)> {
    let mut runs: Vec<(String, RunStatus)> = self
      .runs()
      .iter()
      .map(|(id, handle)| (id.clone(), handle.status()))
      .collect();
    runs.sort_by(|a, b| a.0.cmp(&b.0));
    runs
  }

  /// Drop finished runs from the registry. Returns how many were removed.
  pub fn prune_finished(&self) -> usize {
    let mut runs = self.runs();
    let before = runs.len();
    runs.retain(|_, handle| !handle.status().is_terminal());
    before - runs.len()
  }
}
