use switchyard_workflow::{ParameterError, ValidationError, ValidationErrors};
use thiserror::Error;

use crate::state::RunStatus;

/// Failure talking to the block executor.
#[derive(Debug, Error)]
pub enum ExecutorError {
  #[error("executor transport failed: {message}")]
  Transport { message: String },

  #[error("executor returned an invalid response: {message}")]
  InvalidResponse { message: String },
}

impl From<reqwest::Error> for ExecutorError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      ExecutorError::InvalidResponse {
        message: err.to_string(),
      }
    } else {
      ExecutorError::Transport {
        message: err.to_string(),
      }
    }
  }
}

/// Errors surfaced by the engine and the run controller.
#[derive(Debug, Error)]
pub enum ExecutionError {
  #[error(transparent)]
  Validation(#[from] ValidationErrors),

  /// Run variables did not bind.
  #[error("invalid run variables: {0}")]
  Binding(ValidationError),

  #[error("node '{node_id}': {source}")]
  Parameters {
    node_id: String,
    #[source]
    source: ParameterError,
  },

  #[error("node '{node_id}': {source}")]
  Executor {
    node_id: String,
    #[source]
    source: ExecutorError,
  },

  #[error("run '{run_id}' failed: {message}")]
  Failed { run_id: String, message: String },

  #[error("workflow '{workflow_id}' is not registered")]
  UnknownWorkflow { workflow_id: String },

  #[error("run '{run_id}' not found")]
  UnknownRun { run_id: String },

  #[error("cannot {action} run '{run_id}' while it is {status}")]
  InvalidTransition {
    run_id: String,
    action: &'static str,
    status: RunStatus,
  },
}
