//! The boundary with the external block executor.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use switchyard_catalog::{BlockDefinition, BlockKind, Channel};

use crate::error::ExecutorError;
use crate::events::{ExecutionEvent, LogLevel};
use crate::recorder::RunRecorder;

/// One "execute block" call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
  pub block_type: String,
  /// Resolved and coerced. Secrets are sent in clear.
  pub parameters: Map<String, Value>,
  pub node_id: String,
  pub run_id: String,
}

/// What the executor reports back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
  pub success: bool,
  #[serde(default)]
  pub output: Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  /// Kept as a name: a channel the block does not declare fails the node.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fired_channel: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub logs: Vec<String>,
}

impl ExecuteResponse {
  pub fn ok(output: Value) -> Self {
    Self {
      success: true,
      output,
      ..Self::default()
    }
  }

  pub fn failed(error: impl Into<String>) -> Self {
    Self {
      success: false,
      error: Some(error.into()),
      ..Self::default()
    }
  }

  pub fn on_channel(mut self, channel: impl Into<String>) -> Self {
    self.fired_channel = Some(channel.into());
    self
  }

  pub fn with_log(mut self, line: impl Into<String>) -> Self {
    self.logs.push(line.into());
    self
  }
}

/// Runs conditional and action blocks on behalf of the engine.
///
/// Timeouts and retries are the executor's business; the engine waits for
/// every call it makes.
#[async_trait]
pub trait BlockExecutor: Send + Sync {
  async fn execute(&self, request: ExecuteRequest, logger: NodeLogger) -> Result<ExecuteResponse, ExecutorError>;
}

/// Streams log lines for one node into its run's event log.
#[derive(Clone)]
pub struct NodeLogger {
  node_id: String,
  sink: Option<Arc<RunRecorder>>,
}

impl NodeLogger {
  pub(crate) fn attached(node_id: impl Into<String>, recorder: Arc<RunRecorder>) -> Self {
    Self {
      node_id: node_id.into(),
      sink: Some(recorder),
    }
  }

  /// A logger writing only to `tracing`.
  pub fn detached(node_id: impl Into<String>) -> Self {
    Self {
      node_id: node_id.into(),
      sink: None,
    }
  }

  pub fn node_id(&self) -> &str {
    &self.node_id
  }

  pub fn log(&self, level: LogLevel, message: impl Into<String>) {
    let message = message.into();
    match &self.sink {
      Some(recorder) => recorder.emit(ExecutionEvent::NodeLog {
        node_id: self.node_id.clone(),
        level,
        message,
      }),
      None => tracing::debug!(node_id = %self.node_id, ?level, "{message}"),
    }
  }

  pub fn info(&self, message: impl Into<String>) {
    self.log(LogLevel::Info, message);
  }

  pub fn warn(&self, message: impl Into<String>) {
    self.log(LogLevel::Warn, message);
  }

  pub fn error(&self, message: impl Into<String>) {
    self.log(LogLevel::Error, message);
  }
}

/// How a node settled. The variant picks the channel it fires.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockOutcome {
  /// Condition held; fires `pass`.
  Pass(Value),
  /// Fires `fail` when the block declares it.
  Fail(String),
  /// Plain output; fires `out`, or `complete` for a loop header.
  Emit(Value),
}

impl BlockOutcome {
  /// Interpret an executor response for `block`.
  pub fn from_response(block: &BlockDefinition, response: ExecuteResponse) -> Self {
    if !response.success {
      return BlockOutcome::Fail(
        response
          .error
          .unwrap_or_else(|| "executor reported failure".to_string()),
      );
    }

    let Some(name) = response.fired_channel else {
      return match block.kind {
        BlockKind::Conditional => BlockOutcome::Pass(response.output),
        _ => BlockOutcome::Emit(response.output),
      };
    };
    match Channel::parse(&name).filter(|c| block.declares(*c)) {
      Some(Channel::Pass) => BlockOutcome::Pass(response.output),
      Some(Channel::Out) => BlockOutcome::Emit(response.output),
      Some(Channel::Fail) => BlockOutcome::Fail(
        response
          .error
          .unwrap_or_else(|| format!("block '{}' fired 'fail'", block.block_type)),
      ),
      Some(channel @ (Channel::Iteration | Channel::Complete)) => BlockOutcome::Fail(format!(
        "channel '{channel}' is reserved for loop headers"
      )),
      None => BlockOutcome::Fail(format!(
        "block '{}' fired undeclared channel '{name}'",
        block.block_type
      )),
    }
  }

  /// The channel this outcome fires on `block`, if the block declares it.
  pub fn channel(&self, block: &BlockDefinition) -> Option<Channel> {
    let channel = match (self, block.kind) {
      (BlockOutcome::Fail(_), _) => Channel::Fail,
      (_, BlockKind::Loop) => Channel::Complete,
      (BlockOutcome::Pass(_), _) => Channel::Pass,
      (BlockOutcome::Emit(_), _) => Channel::Out,
    };
    block.declares(channel).then_some(channel)
  }

  pub fn is_failure(&self) -> bool {
    matches!(self, BlockOutcome::Fail(_))
  }
}

/// Executor that runs nothing and echoes the resolved parameters back.
#[derive(Debug, Clone, Default)]
pub struct DryRunExecutor;

#[async_trait]
impl BlockExecutor for DryRunExecutor {
  async fn execute(&self, request: ExecuteRequest, logger: NodeLogger) -> Result<ExecuteResponse, ExecutorError> {
    logger.info(format!("dry run: {} not executed", request.block_type));
    Ok(ExecuteResponse::ok(json!({
      "dryRun": true,
      "blockType": request.block_type,
      "parameters": request.parameters,
    })))
  }
}
