use std::fmt;

use switchyard_template::ResolutionError;
use thiserror::Error;

/// A structural or parameter problem found while building a workflow.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
  #[error("duplicate node id '{node_id}'")]
  DuplicateNode { node_id: String },

  #[error("duplicate edge id '{edge_id}'")]
  DuplicateEdge { edge_id: String },

  #[error("node '{node_id}' uses unknown block type '{block_type}'")]
  UnknownBlockType { node_id: String, block_type: String },

  #[error("edge '{edge_id}' references unknown node '{node_id}'")]
  DanglingEdge { edge_id: String, node_id: String },

  #[error("edge '{edge_id}' leaves '{node_id}' on channel '{channel}', which its block does not declare")]
  UnknownChannel {
    edge_id: String,
    node_id: String,
    channel: String,
  },

  #[error("edge '{edge_id}' enters '{node_id}' on input '{port}', which its block does not declare")]
  UnknownInput {
    edge_id: String,
    node_id: String,
    port: String,
  },

  #[error("workflow has no start node")]
  NoStartNode,

  #[error("workflow has more than one start node: {}", .node_ids.join(", "))]
  MultipleStartNodes { node_ids: Vec<String> },

  #[error("start node '{node_id}' must not have inbound edges")]
  StartHasInbound { node_id: String },

  #[error("node '{node_id}' has no inbound edges and is not the start node")]
  Orphan { node_id: String },

  #[error("cycle detected through node '{node_id}'")]
  Cycle { node_id: String },

  #[error("loop '{header}': iteration target '{node_id}' is also reachable from outside the loop")]
  LoopEntry { header: String, node_id: String },

  #[error("loop '{header}': edge '{edge_id}' leaves the loop body without returning to the header")]
  LoopExit { header: String, edge_id: String },

  #[error("node '{node_id}' is missing required parameter '{parameter}'")]
  MissingParameter { node_id: String, parameter: String },

  #[error("node '{node_id}' parameter '{parameter}': {message}")]
  InvalidParameter {
    node_id: String,
    parameter: String,
    message: String,
  },

  #[error("node '{node_id}' parameter '{parameter}': {source}")]
  InvalidTemplate {
    node_id: String,
    parameter: String,
    #[source]
    source: ResolutionError,
  },

  #[error("node '{node_id}' parameter '{parameter}' references unknown node '{referenced}'")]
  UnknownReference {
    node_id: String,
    parameter: String,
    referenced: String,
  },

  #[error("variable '{name}': {message}")]
  InvalidVariable { name: String, message: String },
}

/// Every problem found in one build, in discovery order.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
  pub fn errors(&self) -> &[ValidationError] {
    &self.0
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl fmt::Display for ValidationErrors {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "workflow is invalid ({} error(s))", self.0.len())?;
    for error in &self.0 {
      write!(f, "\n  - {error}")?;
    }
    Ok(())
  }
}

impl IntoIterator for ValidationErrors {
  type Item = ValidationError;
  type IntoIter = std::vec::IntoIter<ValidationError>;

  fn into_iter(self) -> Self::IntoIter {
    self.0.into_iter()
  }
}

/// A node's parameters could not be prepared for dispatch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
  #[error("parameter '{parameter}': {source}")]
  Resolution {
    parameter: String,
    #[source]
    source: ResolutionError,
  },

  #[error("required parameter '{parameter}' resolved to nothing")]
  Missing { parameter: String },

  #[error("parameter '{parameter}': {message}")]
  Invalid { parameter: String, message: String },
}
