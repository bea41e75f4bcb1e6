use serde::{Deserialize, Serialize};

use crate::edge::EdgeDef;
use crate::node::NodeDef;
use crate::variable::VariableDef;

/// A workflow as saved by the editor: nodes, the edges between their channels,
/// and workflow-scoped variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub nodes: Vec<NodeDef>,
  #[serde(default)]
  pub edges: Vec<EdgeDef>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub variables: Vec<VariableDef>,
}

impl WorkflowDef {
  pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      name: name.into(),
      nodes: Vec::new(),
      edges: Vec::new(),
      variables: Vec::new(),
    }
  }

  pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
    serde_json::from_str(json)
  }

  pub fn node(&self, id: &str) -> Option<&NodeDef> {
    self.nodes.iter().find(|n| n.id == id)
  }

  pub fn with_node(mut self, node: NodeDef) -> Self {
    self.nodes.push(node);
    self
  }

  pub fn with_edge(mut self, edge: EdgeDef) -> Self {
    self.edges.push(edge);
    self
  }

  pub fn with_variable(mut self, variable: VariableDef) -> Self {
    self.variables.push(variable);
    self
  }
}
