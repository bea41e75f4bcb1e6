use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDef {
  pub id: String,
  pub block_type: String,
  #[serde(default)]
  pub label: String,
  /// Raw parameter values. Strings may carry `{{ ... }}` templates, and so may
  /// string leaves nested inside arrays or objects.
  #[serde(default)]
  pub parameters: Map<String, Value>,
}

impl NodeDef {
  pub fn new(id: impl Into<String>, block_type: impl Into<String>) -> Self {
    let id = id.into();
    Self {
      label: id.clone(),
      id,
      block_type: block_type.into(),
      parameters: Map::new(),
    }
  }

  pub fn with_label(mut self, label: impl Into<String>) -> Self {
    self.label = label.into();
    self
  }

  pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
    self.parameters.insert(name.into(), value.into());
    self
  }
}
