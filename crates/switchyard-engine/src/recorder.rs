use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde_json::{Map, Value};
use switchyard_catalog::Channel;
use switchyard_template::{LoopFrame, NodeOutputs};
use tokio::sync::watch;

use crate::events::{EventLog, ExecutionEvent, ExecutionNotifier, LogEntry};
use crate::state::{ErrorEntry, ExecutionState, IterationResult, NodeResult, NodeStatus, Progress, RunStatus};

/// What a settled node left behind for its successors.
#[derive(Debug, Clone)]
pub(crate) struct Settled {
  pub fired: Option<Channel>,
  pub output: Value,
  /// Settle order within the run; the highest fired predecessor is `$prev`.
  pub sequence: u64,
}

/// Outputs of settled nodes, readable as `$node.<id>`.
#[derive(Debug, Default)]
pub(crate) struct SettledMap(HashMap<String, Settled>);

impl SettledMap {
  pub fn get(&self, node_id: &str) -> Option<&Settled> {
    self.0.get(node_id)
  }
}

impl NodeOutputs for SettledMap {
  fn output(&self, node_id: &str) -> Option<&Value> {
    self.0.get(node_id).map(|s| &s.output)
  }
}

/// How a node finished.
#[derive(Debug)]
pub(crate) struct Settlement {
  pub output: Value,
  pub error: Option<String>,
  pub fired: Option<Channel>,
  pub duration_ms: u64,
  /// Only meaningful with an error: a wired `fail` edge takes over.
  pub recovered: bool,
}

struct RunRecord {
  state: ExecutionState,
  log: EventLog,
  settled: SettledMap,
  sequence: u64,
  counted: HashSet<String>,
  unrecoverable: bool,
}

/// The single owner of a run's mutable state.
///
/// Every change goes through one coarse mutex that is never held across an
/// await. Each change that affects the state publishes a fresh snapshot to the
/// watch channel; each event is appended to the log and handed to the notifier.
pub struct RunRecorder {
  run_id: String,
  record: Mutex<RunRecord>,
  snapshots: watch::Sender<ExecutionState>,
  notifier: Arc<dyn ExecutionNotifier>,
}

impl RunRecorder {
  pub(crate) fn new(state: ExecutionState, log_capacity: usize, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    let (snapshots, _) = watch::channel(state.clone());
    Self {
      run_id: state.id.clone(),
      record: Mutex::new(RunRecord {
        state,
        log: EventLog::new(log_capacity),
        settled: SettledMap::default(),
        sequence: 0,
        counted: HashSet::new(),
        unrecoverable: false,
      }),
      snapshots,
      notifier,
    }
  }

  fn lock(&self) -> MutexGuard<'_, RunRecord> {
    self.record.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn publish(&self, record: &RunRecord) {
    self.snapshots.send_replace(record.state.clone());
  }

  fn append(&self, record: &mut RunRecord, event: ExecutionEvent) {
    let entry = event.into_entry(&self.run_id);
    entry.trace();
    self.notifier.notify(&entry);
    record.log.push(entry);
  }

  fn count(record: &mut RunRecord, node_id: &str) {
    if record.counted.insert(node_id.to_string()) {
      record.state.progress = Progress::new(record.counted.len(), record.state.progress.total);
    }
  }

  pub fn run_id(&self) -> &str {
    &self.run_id
  }

  pub(crate) fn emit(&self, event: ExecutionEvent) {
    let mut record = self.lock();
    self.append(&mut record, event);
  }

  /// Apply a run status change if the state machine allows it.
  pub(crate) fn transition(&self, next: RunStatus) -> bool {
    let mut record = self.lock();
    let current = record.state.status;
    if !current.can_transition_to(next) {
      return false;
    }
    record.state.status = next;
    let event = match (current, next) {
      (RunStatus::Pending, RunStatus::Running) => {
        record.state.started_at = Some(Utc::now());
        ExecutionEvent::RunStarted {
          workflow_id: record.state.workflow_id.clone(),
          total_levels: record.state.total_levels,
        }
      }
      (_, RunStatus::Paused) => ExecutionEvent::RunPaused,
      (RunStatus::Paused, RunStatus::Running) => ExecutionEvent::RunResumed,
      (_, status) => {
        record.state.finished_at = Some(Utc::now());
        ExecutionEvent::RunFinished { status }
      }
    };
    self.append(&mut record, event);
    self.publish(&record);
    true
  }

  pub(crate) fn set_current_level(&self, index: usize, nodes: &[String]) {
    let mut record = self.lock();
    record.state.current_level = index;
    self.append(
      &mut record,
      ExecutionEvent::LevelStarted {
        index,
        nodes: nodes.to_vec(),
      },
    );
    self.publish(&record);
  }

  pub(crate) fn mark(&self, node_id: &str, status: NodeStatus) {
    let mut record = self.lock();
    record.state.node_statuses.insert(node_id.to_string(), status);
    self.publish(&record);
  }

  /// `parameters` must already be redacted.
  pub(crate) fn started(&self, node_id: &str, block_type: &str, parameters: Map<String, Value>) {
    let mut record = self.lock();
    record.state.node_statuses.insert(node_id.to_string(), NodeStatus::Running);
    self.append(
      &mut record,
      ExecutionEvent::NodeStarted {
        node_id: node_id.to_string(),
        block_type: block_type.to_string(),
        parameters,
      },
    );
    self.publish(&record);
  }

  /// Mark `node_id` skipped unless it already settled.
  pub(crate) fn skip(&self, node_id: &str) {
    let mut record = self.lock();
    let settled = record.state.node_status(node_id).is_some_and(NodeStatus::is_settled);
    if settled {
      return;
    }
    record.state.node_statuses.insert(node_id.to_string(), NodeStatus::Skipped);
    Self::count(&mut record, node_id);
    self.append(
      &mut record,
      ExecutionEvent::NodeSkipped {
        node_id: node_id.to_string(),
      },
    );
    self.publish(&record);
  }

  /// Force `node_id` to skipped, even mid-run. Used for an interrupted loop
  /// header, which keeps the iterations it recorded.
  pub(crate) fn interrupt(&self, node_id: &str) {
    let mut record = self.lock();
    record.state.node_statuses.insert(node_id.to_string(), NodeStatus::Skipped);
    Self::count(&mut record, node_id);
    self.append(
      &mut record,
      ExecutionEvent::NodeSkipped {
        node_id: node_id.to_string(),
      },
    );
    self.publish(&record);
  }

  /// Read settled outputs under the lock.
  pub(crate) fn with_settled<R>(&self, f: impl FnOnce(&SettledMap) -> R) -> R {
    let record = self.lock();
    f(&record.settled)
  }

  /// Record how `node_id` finished. Inside a loop pass, `frame` appends an
  /// [`IterationResult`] to the node's result.
  pub(crate) fn settle(&self, node_id: &str, settlement: Settlement, frame: Option<&LoopFrame>) {
    let mut record = self.lock();
    let success = settlement.error.is_none();

    record.sequence += 1;
    let sequence = record.sequence;
    record.settled.0.insert(
      node_id.to_string(),
      Settled {
        fired: settlement.fired,
        output: settlement.output.clone(),
        sequence,
      },
    );

    let status = if success {
      NodeStatus::Completed
    } else {
      NodeStatus::Failed
    };
    record.state.node_statuses.insert(node_id.to_string(), status);

    let result = record
      .state
      .node_results
      .entry(node_id.to_string())
      .or_insert_with(|| NodeResult {
        success,
        output: Value::Null,
        error: None,
        duration_ms: 0,
        completed_at: Utc::now(),
        iterations: Vec::new(),
        fired_channel: None,
      });
    result.success = success;
    result.output = settlement.output.clone();
    result.error = settlement.error.clone();
    result.duration_ms = settlement.duration_ms;
    result.completed_at = Utc::now();
    result.fired_channel = settlement.fired;
    if let Some(frame) = frame {
      result.iterations.push(IterationResult {
        sequence: frame.index,
        item: frame.item.clone(),
        success,
        output: settlement.output.clone(),
        error: settlement.error.clone(),
        is_first: frame.is_first(),
        is_last: frame.is_last(),
        duration_ms: settlement.duration_ms,
      });
    }

    Self::count(&mut record, node_id);

    let event = match settlement.error {
      None => ExecutionEvent::NodeCompleted {
        node_id: node_id.to_string(),
        channel: settlement.fired,
        output: settlement.output,
        duration_ms: settlement.duration_ms,
      },
      Some(message) => {
        record.state.errors.push(ErrorEntry {
          node_id: node_id.to_string(),
          message: message.clone(),
          recovered: settlement.recovered,
        });
        if !settlement.recovered {
          record.unrecoverable = true;
        }
        ExecutionEvent::NodeFailed {
          node_id: node_id.to_string(),
          error: message,
          recovered: settlement.recovered,
        }
      }
    };
    self.append(&mut record, event);
    self.publish(&record);
  }

  /// Clear the iterations `header` and its `body` recorded during an earlier
  /// pass of an enclosing loop.
  pub(crate) fn begin_loop(&self, header: &str, body: &BTreeSet<String>) {
    let mut record = self.lock();
    for node_id in std::iter::once(header).chain(body.iter().map(String::as_str)) {
      if let Some(result) = record.state.node_results.get_mut(node_id) {
        result.iterations.clear();
      }
    }
    self.publish(&record);
  }

  /// Reset `body` for a new pass of `header` and expose the pass as the
  /// header's `iteration` output.
  pub(crate) fn begin_iteration(&self, header: &str, frame: &LoopFrame, body: &BTreeSet<String>) {
    let mut record = self.lock();
    for node_id in body {
      record.settled.0.remove(node_id);
      record.state.node_statuses.insert(node_id.clone(), NodeStatus::Pending);
    }
    record.sequence += 1;
    let sequence = record.sequence;
    record.settled.0.insert(
      header.to_string(),
      Settled {
        fired: Some(Channel::Iteration),
        output: frame.to_value(),
        sequence,
      },
    );
    self.append(
      &mut record,
      ExecutionEvent::LoopIteration {
        node_id: header.to_string(),
        sequence: frame.index,
        total: frame.total,
        item: frame.item.clone(),
      },
    );
    self.publish(&record);
  }

  /// Outputs of the body nodes that settled in the current pass.
  pub(crate) fn iteration_outputs(&self, body: &BTreeSet<String>) -> Map<String, Value> {
    let record = self.lock();
    body
      .iter()
      .filter_map(|id| record.settled.get(id).map(|s| (id.clone(), s.output.clone())))
      .collect()
  }

  /// Append a finished pass to the header's result.
  pub(crate) fn record_iteration(&self, header: &str, iteration: IterationResult) {
    let mut record = self.lock();
    let result = record
      .state
      .node_results
      .entry(header.to_string())
      .or_insert_with(|| NodeResult {
        success: true,
        output: Value::Null,
        error: None,
        duration_ms: 0,
        completed_at: Utc::now(),
        iterations: Vec::new(),
        fired_channel: None,
      });
    result.iterations.push(iteration);
    self.publish(&record);
  }

  pub(crate) fn has_unrecoverable(&self) -> bool {
    self.lock().unrecoverable
  }

  /// Nodes among `node_ids` that have not settled yet.
  pub(crate) fn unsettled<'a>(&self, node_ids: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let record = self.lock();
    node_ids
      .into_iter()
      .filter(|id| !record.state.node_status(id).is_some_and(NodeStatus::is_settled))
      .cloned()
      .collect()
  }

  pub fn subscribe(&self) -> watch::Receiver<ExecutionState> {
    self.snapshots.subscribe()
  }

  pub fn snapshot(&self) -> ExecutionState {
    self.lock().state.clone()
  }

  pub fn status(&self) -> RunStatus {
    self.lock().state.status
  }

  /// Retained log entries, oldest first.
  pub fn events(&self) -> Vec<LogEntry> {
    self.lock().log.entries().cloned().collect()
  }

  /// Log entries dropped to stay within capacity.
  pub fn evicted_events(&self) -> u64 {
    self.lock().log.evicted()
  }
}
