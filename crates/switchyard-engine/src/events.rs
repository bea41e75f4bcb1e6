//! Execution events, the bounded run log and notifiers for observers.
//!
//! The engine turns every state change into an [`ExecutionEvent`], stamps it
//! into a [`LogEntry`], appends it to the run's [`EventLog`] and hands it to an
//! [`ExecutionNotifier`]. Notifiers are fire-and-forget so a slow consumer never
//! holds up a run.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use switchyard_catalog::Channel;
use tokio::sync::mpsc;

use crate::state::RunStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
  Debug,
  Info,
  Warn,
  Error,
}

/// State changes emitted while a run progresses.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
  /// The run left `pending`.
  RunStarted {
    workflow_id: String,
    total_levels: usize,
  },
  /// Held at a level or iteration boundary.
  RunPaused,
  RunResumed,
  /// Terminal status reached.
  RunFinished {
    status: RunStatus,
  },
  /// A top-level level began.
  LevelStarted {
    index: usize,
    nodes: Vec<String>,
  },
  /// `parameters` are already redacted.
  NodeStarted {
    node_id: String,
    block_type: String,
    parameters: Map<String, Value>,
  },
  /// Settled without error; `channel` is the one it fired.
  NodeCompleted {
    node_id: String,
    channel: Option<Channel>,
    output: Value,
    duration_ms: u64,
  },
  /// `recovered` when a wired `fail` edge takes over.
  NodeFailed {
    node_id: String,
    error: String,
    recovered: bool,
  },
  /// Not activated, or cut short by cancel.
  NodeSkipped {
    node_id: String,
  },
  /// A line streamed by the executor or an engine-local block.
  NodeLog {
    node_id: String,
    level: LogLevel,
    message: String,
  },
  /// A loop header began pass `sequence` of `total`.
  LoopIteration {
    node_id: String,
    sequence: usize,
    total: usize,
    item: Value,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
  RunStarted,
  RunPaused,
  RunResumed,
  RunFinished,
  LevelStarted,
  NodeStarted,
  NodeCompleted,
  NodeFailed,
  NodeSkipped,
  NodeLog,
  LoopIteration,
}

/// One entry of a run's event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
  pub timestamp: DateTime<Utc>,
  pub level: LogLevel,
  pub run_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub node_id: Option<String>,
  pub kind: EventKind,
  pub message: String,
  #[serde(default, skip_serializing_if = "Value::is_null")]
  pub data: Value,
}

impl ExecutionEvent {
  pub fn kind(&self) -> EventKind {
    match self {
      ExecutionEvent::RunStarted { .. } => EventKind::RunStarted,
      ExecutionEvent::RunPaused => EventKind::RunPaused,
      ExecutionEvent::RunResumed => EventKind::RunResumed,
      ExecutionEvent::RunFinished { .. } => EventKind::RunFinished,
      ExecutionEvent::LevelStarted { .. } => EventKind::LevelStarted,
      ExecutionEvent::NodeStarted { .. } => EventKind::NodeStarted,
      ExecutionEvent::NodeCompleted { .. } => EventKind::NodeCompleted,
      ExecutionEvent::NodeFailed { .. } => EventKind::NodeFailed,
      ExecutionEvent::NodeSkipped { .. } => EventKind::NodeSkipped,
      ExecutionEvent::NodeLog { .. } => EventKind::NodeLog,
      ExecutionEvent::LoopIteration { .. } => EventKind::LoopIteration,
    }
  }

  pub fn into_entry(self, run_id: &str) -> LogEntry {
    let kind = self.kind();
    let (level, node_id, message, data) = match self {
      ExecutionEvent::RunStarted {
        workflow_id,
        total_levels,
      } => (
        LogLevel::Info,
        None,
        format!("run started for workflow '{workflow_id}'"),
        json!({ "workflowId": workflow_id, "totalLevels": total_levels }),
      ),
      ExecutionEvent::RunPaused => (LogLevel::Info, None, "run paused".to_string(), Value::Null),
      ExecutionEvent::RunResumed => (LogLevel::Info, None, "run resumed".to_string(), Value::Null),
      ExecutionEvent::RunFinished { status } => {
        let level = if status == RunStatus::Failed {
          LogLevel::Error
        } else {
          LogLevel::Info
        };
        (level, None, format!("run {status}"), json!({ "status": status }))
      }
      ExecutionEvent::LevelStarted { index, nodes } => (
        LogLevel::Debug,
        None,
        format!("level {index} started"),
        json!({ "index": index, "nodes": nodes }),
      ),
      ExecutionEvent::NodeStarted {
        node_id,
        block_type,
        parameters,
      } => (
        LogLevel::Info,
        Some(node_id),
        format!("running {block_type}"),
        json!({ "blockType": block_type, "parameters": parameters }),
      ),
      ExecutionEvent::NodeCompleted {
        node_id,
        channel,
        output,
        duration_ms,
      } => {
        let message = match channel {
          Some(channel) => format!("completed on '{channel}'"),
          None => "completed".to_string(),
        };
        (
          LogLevel::Info,
          Some(node_id),
          message,
          json!({ "channel": channel, "output": output, "durationMs": duration_ms }),
        )
      }
      ExecutionEvent::NodeFailed {
        node_id,
        error,
        recovered,
      } => {
        let level = if recovered { LogLevel::Warn } else { LogLevel::Error };
        let data = json!({ "recovered": recovered });
        (level, Some(node_id), error, data)
      }
      ExecutionEvent::NodeSkipped { node_id } => (LogLevel::Debug, Some(node_id), "skipped".to_string(), Value::Null),
      ExecutionEvent::NodeLog {
        node_id,
        level,
        message,
      } => (level, Some(node_id), message, Value::Null),
      ExecutionEvent::LoopIteration {
        node_id,
        sequence,
        total,
        item,
      } => (
        LogLevel::Info,
        Some(node_id),
        format!("iteration {} of {total}", sequence + 1),
        json!({ "sequence": sequence, "total": total, "item": item }),
      ),
    };

    LogEntry {
      timestamp: Utc::now(),
      level,
      run_id: run_id.to_string(),
      node_id,
      kind,
      message,
      data,
    }
  }
}

impl LogEntry {
  /// Mirror the entry to `tracing` at its own level.
  pub fn trace(&self) {
    let node_id = self.node_id.as_deref().unwrap_or("-");
    match self.level {
      LogLevel::Debug => tracing::debug!(run_id = %self.run_id, node_id, kind = ?self.kind, "{}", self.message),
      LogLevel::Info => tracing::info!(run_id = %self.run_id, node_id, kind = ?self.kind, "{}", self.message),
      LogLevel::Warn => tracing::warn!(run_id = %self.run_id, node_id, kind = ?self.kind, "{}", self.message),
      LogLevel::Error => tracing::error!(run_id = %self.run_id, node_id, kind = ?self.kind, "{}", self.message),
    }
  }
}

/// Append-only log capped at `capacity` entries, oldest evicted first.
#[derive(Debug, Clone)]
pub struct EventLog {
  capacity: usize,
  entries: VecDeque<LogEntry>,
  evicted: u64,
}

impl EventLog {
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity: capacity.max(1),
      entries: VecDeque::with_capacity(capacity.min(1024)),
      evicted: 0,
    }
  }

  pub fn push(&mut self, entry: LogEntry) {
    if self.entries.len() == self.capacity {
      self.entries.pop_front();
      self.evicted += 1;
    }
    self.entries.push_back(entry);
  }

  pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
    self.entries.iter()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Entries dropped to stay within capacity.
  pub fn evicted(&self) -> u64 {
    self.evicted
  }
}

/// Receives every log entry as it is appended.
///
/// Implementations must not block: the engine calls `notify` while it holds
/// the run record.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, entry: &LogEntry);
}

/// Discards all entries.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _entry: &LogEntry) {}
}

/// Forwards entries to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<LogEntry>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<LogEntry>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, entry: &LogEntry) {
    // Receiver may have been dropped.
    let _ = self.sender.send(entry.clone());
  }
}
