use serde::{Deserialize, Serialize};

/// A directed connection from one node's output channel to another node's input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDef {
  pub id: String,
  pub source: String,
  /// Output channel of the source that must fire for this edge to carry control.
  #[serde(default = "default_source_channel")]
  pub source_channel: String,
  pub target: String,
  #[serde(default = "default_target_channel")]
  pub target_channel: String,
}

fn default_source_channel() -> String {
  "out".to_string()
}

fn default_target_channel() -> String {
  "in".to_string()
}

impl EdgeDef {
  pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      source: source.into(),
      source_channel: default_source_channel(),
      target: target.into(),
      target_channel: default_target_channel(),
    }
  }

  pub fn from_channel(mut self, channel: impl Into<String>) -> Self {
    self.source_channel = channel.into();
    self
  }

  pub fn into_channel(mut self, channel: impl Into<String>) -> Self {
    self.target_channel = channel.into();
    self
  }
}
