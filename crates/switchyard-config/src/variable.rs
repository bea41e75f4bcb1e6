use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A workflow-scoped constant, visible to templates as `$vars.<name>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDef {
  pub name: String,
  #[serde(rename = "type", default)]
  pub var_type: VariableType,
  #[serde(default)]
  pub default: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
  String,
  Number,
  Boolean,
  Array,
  Object,
  #[default]
  Any,
}

impl VariableDef {
  pub fn new(name: impl Into<String>, var_type: VariableType, default: Value) -> Self {
    Self {
      name: name.into(),
      var_type,
      default,
    }
  }
}
