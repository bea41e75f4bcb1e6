use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchyard_catalog::Channel;

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
  Pending,
  Running,
  Paused,
  Completed,
  Failed,
  Cancelled,
}

impl RunStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled)
  }

  pub fn can_transition_to(self, next: RunStatus) -> bool {
    use RunStatus::*;
    matches!(
      (self, next),
      (Pending, Running)
        | (Running, Paused)
        | (Running, Completed)
        | (Running, Failed)
        | (Running, Cancelled)
        | (Paused, Running)
        | (Paused, Cancelled)
    )
  }

  pub fn as_str(self) -> &'static str {
    match self {
      RunStatus::Pending => "pending",
      RunStatus::Running => "running",
      RunStatus::Paused => "paused",
      RunStatus::Completed => "completed",
      RunStatus::Failed => "failed",
      RunStatus::Cancelled => "cancelled",
    }
  }
}

impl fmt::Display for RunStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeStatus {
  Pending,
  /// Reachable, parameters being resolved.
  Waiting,
  Running,
  Completed,
  Failed,
  Skipped,
}

impl NodeStatus {
  pub fn is_settled(self) -> bool {
    matches!(self, NodeStatus::Completed | NodeStatus::Failed | NodeStatus::Skipped)
  }
}

/// One pass of a loop, recorded on the header and on each body node that ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationResult {
  pub sequence: usize,
  pub item: Value,
  pub success: bool,
  pub output: Value,
  pub error: Option<String>,
  pub is_first: bool,
  pub is_last: bool,
  pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeResult {
  pub success: bool,
  pub output: Value,
  pub error: Option<String>,
  pub duration_ms: u64,
  pub completed_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub iterations: Vec<IterationResult>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fired_channel: Option<Channel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
  pub completed: usize,
  pub total: usize,
  pub percentage: u8,
}

impl Progress {
  pub fn new(completed: usize, total: usize) -> Self {
    let percentage = if total == 0 {
      100
    } else {
      ((completed.min(total) * 100) / total) as u8
    };
    Self {
      completed,
      total,
      percentage,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
  pub node_id: String,
  pub message: String,
  /// A wired `fail` edge took over.
  pub recovered: bool,
}

/// Snapshot of a run. The engine owns the live copy and publishes clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
  pub id: String,
  pub workflow_id: String,
  pub status: RunStatus,
  pub node_statuses: BTreeMap<String, NodeStatus>,
  pub node_results: BTreeMap<String, NodeResult>,
  pub current_level: usize,
  pub total_levels: usize,
  pub progress: Progress,
  pub errors: Vec<ErrorEntry>,
  pub started_at: Option<DateTime<Utc>>,
  pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionState {
  pub fn new<'a>(
    id: impl Into<String>,
    workflow_id: impl Into<String>,
    node_ids: impl IntoIterator<Item = &'a String>,
    total_levels: usize,
  ) -> Self {
    let node_statuses: BTreeMap<String, NodeStatus> =
      node_ids.into_iter().map(|id| (id.clone(), NodeStatus::Pending)).collect();
    let total = node_statuses.len();
    Self {
      id: id.into(),
      workflow_id: workflow_id.into(),
      status: RunStatus::Pending,
      node_statuses,
      node_results: BTreeMap::new(),
      current_level: 0,
      total_levels,
      progress: Progress::new(0, total),
      errors: Vec::new(),
      started_at: None,
      finished_at: None,
    }
  }

  /// Current status of `node_id`, if the workflow has it.
  pub fn node_status(&self, node_id: &str) -> Option<NodeStatus> {
    self.node_statuses.get(node_id).copied()
  }

  /// Latest result of `node_id`; absent until it settles.
  pub fn result(&self, node_id: &str) -> Option<&NodeResult> {
    self.node_results.get(node_id)
  }

  /// Errors no `fail` edge recovered.
  pub fn unrecovered_errors(&self) -> impl Iterator<Item = &ErrorEntry> {
    self.errors.iter().filter(|e| !e.recovered)
  }
}
