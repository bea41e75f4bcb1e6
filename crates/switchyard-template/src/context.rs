use std::collections::HashMap;

use serde_json::{Map, Value, json};

/// Read access to the outputs of nodes that have settled in the current run.
pub trait NodeOutputs {
  fn output(&self, node_id: &str) -> Option<&Value>;
}

impl NodeOutputs for HashMap<String, Value> {
  fn output(&self, node_id: &str) -> Option<&Value> {
    self.get(node_id)
  }
}

impl NodeOutputs for Map<String, Value> {
  fn output(&self, node_id: &str) -> Option<&Value> {
    self.get(node_id)
  }
}

/// The innermost loop pass, exposed as `$loop`.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopFrame {
  pub item: Value,
  pub index: usize,
  pub total: usize,
}

impl LoopFrame {
  pub fn new(item: Value, index: usize, total: usize) -> Self {
    Self { item, index, total }
  }

  pub fn is_first(&self) -> bool {
    self.index == 0
  }

  pub fn is_last(&self) -> bool {
    self.index + 1 == self.total
  }

  pub fn to_value(&self) -> Value {
    json!({
      "item": self.item,
      "index": self.index,
      "total": self.total,
      "isFirst": self.is_first(),
      "isLast": self.is_last(),
    })
  }
}

/// Everything a span may read. Missing parts resolve to undefined.
#[derive(Clone, Copy, Default)]
pub struct ResolutionContext<'a> {
  prev: Option<&'a Value>,
  nodes: Option<&'a dyn NodeOutputs>,
  loop_frame: Option<&'a LoopFrame>,
  vars: Option<&'a Map<String, Value>>,
}

impl<'a> ResolutionContext<'a> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_prev(mut self, prev: Option<&'a Value>) -> Self {
    self.prev = prev;
    self
  }

  pub fn with_nodes(mut self, nodes: &'a dyn NodeOutputs) -> Self {
    self.nodes = Some(nodes);
    self
  }

  pub fn with_loop(mut self, frame: Option<&'a LoopFrame>) -> Self {
    self.loop_frame = frame;
    self
  }

  pub fn with_vars(mut self, vars: &'a Map<String, Value>) -> Self {
    self.vars = Some(vars);
    self
  }

  pub fn prev(&self) -> Option<&'a Value> {
    self.prev
  }

  pub fn node(&self, node_id: &str) -> Option<&'a Value> {
    self.nodes.and_then(|nodes| nodes.output(node_id))
  }

  pub fn loop_frame(&self) -> Option<&'a LoopFrame> {
    self.loop_frame
  }

  pub fn var(&self, name: &str) -> Option<&'a Value> {
    self.vars.and_then(|vars| vars.get(name))
  }

  pub fn vars(&self) -> Option<&'a Map<String, Value>> {
    self.vars
  }
}
