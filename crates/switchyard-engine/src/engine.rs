//! Level-parallel workflow execution.
//!
//! A run walks its [`Plan`] one level at a time. Within a level every reachable
//! node runs concurrently: engine-local blocks are evaluated in place and
//! everything else becomes one executor call on its own task. Loop headers
//! re-enter their body's sub-plan once per item, sequentially.

use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use serde_json::{Map, Value, json};
use switchyard_catalog::{BlockCatalog, BlockKind, Channel};
use switchyard_config::WorkflowDef;
use switchyard_template::{LoopFrame, NodeOutputs, ResolutionContext};
use switchyard_workflow::{Graph, Level, Node, Plan, Workflow, plan};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, instrument, warn};

use crate::config::EngineConfig;
use crate::control::RunControl;
use crate::error::ExecutionError;
use crate::events::{ExecutionNotifier, LogEntry, NoopNotifier};
use crate::executor::{BlockExecutor, BlockOutcome, ExecuteRequest, NodeLogger};
use crate::local;
use crate::recorder::{RunRecorder, Settled, SettledMap, Settlement};
use crate::state::{ExecutionState, IterationResult, NodeStatus, RunStatus};

/// A validated workflow together with its plan.
#[derive(Debug, Clone)]
pub struct CompiledWorkflow {
  workflow: Workflow,
  plan: Plan,
}

impl CompiledWorkflow {
  pub fn new(workflow: Workflow) -> Self {
    let plan = plan(&workflow);
    Self { workflow, plan }
  }

  /// Build and plan `def` in one step.
  pub fn compile(def: &WorkflowDef, catalog: &BlockCatalog) -> Result<Self, ExecutionError> {
    Ok(Self::new(Workflow::build(def, catalog)?))
  }

  pub fn id(&self) -> &str {
    self.workflow.id()
  }

  pub fn workflow(&self) -> &Workflow {
    &self.workflow
  }

  /// Level plan computed once at compile time.
  pub fn plan(&self) -> &Plan {
    &self.plan
  }
}

/// Runs compiled workflows against a block executor.
pub struct Engine {
  executor: Arc<dyn BlockExecutor>,
  notifier: Arc<dyn ExecutionNotifier>,
  config: EngineConfig,
}

impl Engine {
  /// Engine whose log entries reach no observer beyond `tracing`.
  pub fn new(executor: Arc<dyn BlockExecutor>, config: EngineConfig) -> Self {
    Self::with_notifier(executor, Arc::new(NoopNotifier), config)
  }

  pub fn with_notifier(
    executor: Arc<dyn BlockExecutor>,
    notifier: Arc<dyn ExecutionNotifier>,
    config: EngineConfig,
  ) -> Self {
    Self {
      executor,
      notifier,
      config,
    }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Start a run on the current tokio runtime and return at once.
  ///
  /// `overrides` replace the workflow's variable defaults for this run.
  #[instrument(skip_all, fields(workflow_id = %compiled.id()))]
  pub fn launch(
    &self,
    compiled: Arc<CompiledWorkflow>,
    overrides: &Map<String, Value>,
    control: RunControl,
  ) -> Result<RunHandle, ExecutionError> {
    let vars = compiled
      .workflow()
      .bind_variables(overrides)
      .map_err(ExecutionError::Binding)?;
    let run_id = uuid::Uuid::new_v4().to_string();
    let state = ExecutionState::new(
      run_id.clone(),
      compiled.id(),
      compiled.workflow().node_ids(),
      compiled.plan().total_levels(),
    );
    let recorder = Arc::new(RunRecorder::new(
      state,
      self.config.event_log_capacity,
      self.notifier.clone(),
    ));

    let run = Run {
      compiled,
      executor: self.executor.clone(),
      recorder: recorder.clone(),
      control: control.clone(),
      config: self.config.clone(),
      vars,
    };
    let span = info_span!("run", run_id = %run_id, workflow_id = %run.compiled.id());
    let task = tokio::spawn(async move { run.drive().await }.instrument(span));
    info!(run_id = %run_id, "run launched");

    Ok(RunHandle {
      run_id,
      control,
      recorder,
      task,
    })
  }

  /// Run to completion and return the final state.
  pub async fn execute(
    &self,
    compiled: Arc<CompiledWorkflow>,
    overrides: &Map<String, Value>,
  ) -> Result<ExecutionState, ExecutionError> {
    self.launch(compiled, overrides, RunControl::new())?.wait().await
  }
}

/// A live run.
pub struct RunHandle {
  run_id: String,
  control: RunControl,
  recorder: Arc<RunRecorder>,
  task: JoinHandle<ExecutionState>,
}

impl RunHandle {
  pub fn run_id(&self) -> &str {
    &self.run_id
  }

  pub fn control(&self) -> &RunControl {
    &self.control
  }

  /// Receiver that sees every published snapshot of this run.
  pub fn subscribe(&self) -> watch::Receiver<ExecutionState> {
    self.recorder.subscribe()
  }

  /// Latest published state.
  pub fn snapshot(&self) -> ExecutionState {
    self.recorder.snapshot()
  }

  pub fn status(&self) -> RunStatus {
    self.recorder.status()
  }

  pub fn events(&self) -> Vec<LogEntry> {
    self.recorder.events()
  }

  pub fn is_finished(&self) -> bool {
    self.task.is_finished()
  }

  /// Wait for the run to finish. Failed and cancelled runs still return their
  /// final state.
  pub async fn wait(self) -> Result<ExecutionState, ExecutionError> {
    self.task.await.map_err(|e| ExecutionError::Failed {
      run_id: self.run_id.clone(),
      message: format!("run task aborted: {e}"),
    })
  }
}

/// Everything one run needs, shared by the futures of a level.
struct Run {
  compiled: Arc<CompiledWorkflow>,
  executor: Arc<dyn BlockExecutor>,
  recorder: Arc<RunRecorder>,
  control: RunControl,
  config: EngineConfig,
  vars: Map<String, Value>,
}

impl Run {
  fn workflow(&self) -> &Workflow {
    self.compiled.workflow()
  }

  fn graph(&self) -> &Graph {
    self.compiled.workflow().graph()
  }

  async fn drive(self) -> ExecutionState {
    self.recorder.transition(RunStatus::Running);
    let plan = self.compiled.plan();

    for level in plan.levels() {
      if !self.checkpoint().await {
        break;
      }
      if self.config.fail_fast && self.recorder.has_unrecoverable() {
        warn!("stopping after unrecoverable failure");
        break;
      }
      self.recorder.set_current_level(level.index, &level.nodes);
      self.run_level(plan, level, None).await;
    }

    let status = if self.control.is_cancelled() {
      RunStatus::Cancelled
    } else if self.recorder.has_unrecoverable() {
      RunStatus::Failed
    } else {
      RunStatus::Completed
    };
    if status != RunStatus::Cancelled {
      for node_id in self.recorder.unsettled(self.workflow().node_ids()) {
        self.recorder.skip(&node_id);
      }
    }
    self.recorder.transition(status);
    info!(status = %status, "run finished");
    self.recorder.snapshot()
  }

  /// Honor pause and cancel. Returns false once the run is cancelled.
  async fn checkpoint(&self) -> bool {
    if self.control.is_paused() && !self.control.is_cancelled() {
      self.recorder.transition(RunStatus::Paused);
      self.control.wait_while_paused().await;
      if !self.control.is_cancelled() {
        self.recorder.transition(RunStatus::Running);
      }
    }
    !self.control.is_cancelled()
  }

  /// Run every node of `level` within `scope`. Returns true if any of them
  /// failed without a recovery edge.
  fn run_level<'a>(&'a self, scope: &'a Plan, level: &'a Level, frame: Option<&'a LoopFrame>) -> BoxFuture<'a, bool> {
    async move {
      let graph = self.graph();
      let mut runs = Vec::with_capacity(level.nodes.len());
      for node_id in &level.nodes {
        let activation = self.recorder.with_settled(|settled| activation(graph, node_id, settled));
        match activation {
          Some(prev) => runs.push(self.run_node(scope, node_id, prev, frame)),
          None => {
            self.recorder.skip(node_id);
            if let Some(body) = graph.loop_body(node_id) {
              for member in &body.nodes {
                self.recorder.skip(member);
              }
            }
          }
        }
      }
      join_all(runs).await.into_iter().any(|unrecoverable| unrecoverable)
    }
    .boxed()
  }

  async fn run_node(&self, scope: &Plan, node_id: &str, prev: Option<String>, frame: Option<&LoopFrame>) -> bool {
    let Some(node) = self.workflow().node(node_id) else {
      return false;
    };
    if node.kind() == BlockKind::Loop {
      return self.run_loop(scope, node, prev, frame).await;
    }

    self.recorder.mark(node_id, NodeStatus::Waiting);
    let started = Instant::now();
    let (resolved, prev_output) = self.resolve(node, prev.as_deref(), frame);
    let outcome = match resolved {
      Ok(parameters) => {
        self
          .recorder
          .started(node_id, node.block_type(), node.parameters.redact(&parameters));
        self.evaluate(node, parameters, prev_output).await
      }
      Err(error) => BlockOutcome::Fail(error.to_string()),
    };
    self.settle(node, outcome, started, frame)
  }

  /// Resolve `node`'s parameters against the live run. Also returns the
  /// `$prev` output, which an end block passes through.
  fn resolve(
    &self,
    node: &Node,
    prev: Option<&str>,
    frame: Option<&LoopFrame>,
  ) -> (Result<Map<String, Value>, ExecutionError>, Value) {
    self.recorder.with_settled(|settled| {
      let prev_output = prev.and_then(|id| settled.output(id));
      let ctx = ResolutionContext::new()
        .with_prev(prev_output)
        .with_nodes(settled)
        .with_loop(frame)
        .with_vars(&self.vars);
      let resolved = node
        .parameters
        .resolve(&ctx)
        .map_err(|source| ExecutionError::Parameters {
          node_id: node.id.clone(),
          source,
        });
      (resolved, prev_output.cloned().unwrap_or(Value::Null))
    })
  }

  async fn evaluate(&self, node: &Node, parameters: Map<String, Value>, prev_output: Value) -> BlockOutcome {
    match node.kind() {
      BlockKind::Start => BlockOutcome::Emit(Value::Object(self.vars.clone())),
      BlockKind::End => BlockOutcome::Emit(prev_output),
      BlockKind::VariableSet => local::variable_set(&parameters),
      BlockKind::Compare => local::compare(&parameters),
      BlockKind::Loop => BlockOutcome::Fail("loop headers are not evaluated as plain nodes".to_string()),
      BlockKind::Conditional | BlockKind::Action => self.dispatch(node, parameters).await,
    }
  }

  /// One executor call on its own task.
  async fn dispatch(&self, node: &Node, parameters: Map<String, Value>) -> BlockOutcome {
    let request = ExecuteRequest {
      block_type: node.block_type().to_string(),
      parameters,
      node_id: node.id.clone(),
      run_id: self.recorder.run_id().to_string(),
    };
    let executor = self.executor.clone();
    let logger = NodeLogger::attached(node.id.clone(), self.recorder.clone());
    let task_logger = logger.clone();
    debug!(node_id = %node.id, block_type = %node.block_type(), "dispatching");

    let joined = tokio::spawn(async move { executor.execute(request, task_logger).await }).await;
    match joined {
      Ok(Ok(response)) => {
        for line in &response.logs {
          logger.info(line.clone());
        }
        BlockOutcome::from_response(&node.block, response)
      }
      Ok(Err(source)) => BlockOutcome::Fail(
        ExecutionError::Executor {
          node_id: node.id.clone(),
          source,
        }
        .to_string(),
      ),
      Err(e) => BlockOutcome::Fail(format!("executor task failed: {e}")),
    }
  }

  /// Record `outcome` for `node`. Returns true if it failed without a wired
  /// `fail` edge.
  fn settle(&self, node: &Node, outcome: BlockOutcome, started: Instant, frame: Option<&LoopFrame>) -> bool {
    let fired = outcome.channel(&node.block);
    let (output, error) = match outcome {
      BlockOutcome::Pass(value) | BlockOutcome::Emit(value) => (value, None),
      BlockOutcome::Fail(message) => (Value::Null, Some(message)),
    };
    let recovered = error.is_some() && fired == Some(Channel::Fail) && self.graph().has_wired(&node.id, Channel::Fail);
    let unrecoverable = error.is_some() && !recovered;
    self.recorder.settle(
      &node.id,
      Settlement {
        output,
        error,
        fired,
        duration_ms: elapsed_ms(started),
        recovered,
      },
      frame,
    );
    unrecoverable
  }

  async fn run_loop(&self, scope: &Plan, header: &Node, prev: Option<String>, outer: Option<&LoopFrame>) -> bool {
    let started = Instant::now();
    self.recorder.mark(&header.id, NodeStatus::Waiting);
    if let Some(body) = self.graph().loop_body(&header.id) {
      self.recorder.begin_loop(&header.id, &body.nodes);
    }
    // A header's iterations are its own passes; it settles without `outer`.
    let (resolved, _) = self.resolve(header, prev.as_deref(), outer);
    let parameters = match resolved {
      Ok(parameters) => parameters,
      Err(error) => return self.settle(header, BlockOutcome::Fail(error.to_string()), started, None),
    };
    self
      .recorder
      .started(&header.id, header.block_type(), header.parameters.redact(&parameters));

    let items = match local::loop_items(&parameters, self.config.max_loop_iterations) {
      Ok(items) => items,
      Err(message) => return self.settle(header, BlockOutcome::Fail(message), started, None),
    };
    let (Some(body_plan), Some(body)) = (scope.loop_plan(&header.id), self.graph().loop_body(&header.id)) else {
      return self.settle(
        header,
        BlockOutcome::Fail(format!("no plan for loop '{}'", header.id)),
        started,
        None,
      );
    };

    let total = items.len();
    let mut passes = Vec::with_capacity(total);
    for (index, item) in items.into_iter().enumerate() {
      if !self.checkpoint().await {
        self.recorder.interrupt(&header.id);
        return false;
      }

      let frame = LoopFrame::new(item, index, total);
      let pass_started = Instant::now();
      self.recorder.begin_iteration(&header.id, &frame, &body.nodes);

      let mut failed = false;
      let mut interrupted = false;
      for level in body_plan.levels() {
        if !self.checkpoint().await {
          interrupted = true;
          break;
        }
        if self.run_level(body_plan, level, Some(&frame)).await {
          failed = true;
          break;
        }
      }
      if interrupted {
        self.recorder.interrupt(&header.id);
        return false;
      }
      for node_id in self.recorder.unsettled(&body.nodes) {
        self.recorder.skip(&node_id);
      }

      let outputs = self.recorder.iteration_outputs(&body.nodes);
      let output = json!({ "item": frame.item, "index": index, "outputs": outputs });
      self.recorder.record_iteration(
        &header.id,
        IterationResult {
          sequence: index,
          item: frame.item.clone(),
          success: !failed,
          output: output.clone(),
          error: failed.then(|| format!("iteration {index} failed")),
          is_first: frame.is_first(),
          is_last: frame.is_last(),
          duration_ms: elapsed_ms(pass_started),
        },
      );
      passes.push(output);

      if failed {
        let message = format!("loop stopped: iteration {index} failed");
        return self.settle(header, BlockOutcome::Fail(message), started, None);
      }
    }

    let output = json!({ "count": total, "items": passes });
    self.settle(header, BlockOutcome::Emit(output), started, None)
  }
}

/// Which predecessor activates `node_id`, if any. `Some(None)` for the start
/// node; otherwise the most recently settled source whose fired channel
/// matches an inbound edge.
fn activation(graph: &Graph, node_id: &str, settled: &SettledMap) -> Option<Option<String>> {
  if graph.start_node() == node_id {
    return Some(None);
  }
  graph
    .incoming(node_id)
    .filter_map(|edge| {
      settled
        .get(&edge.source)
        .filter(|s| s.fired == Some(edge.source_channel))
        .map(|s: &Settled| (s.sequence, edge.source.clone()))
    })
    .max_by_key(|(sequence, _)| *sequence)
    .map(|(_, source)| Some(source))
}

fn elapsed_ms(started: Instant) -> u64 {
  u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
