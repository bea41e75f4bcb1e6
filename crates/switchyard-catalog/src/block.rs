use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::channel::{Channel, INPUT_PORT, LOOP_BACK_PORT};
use crate::error::CatalogError;
use crate::parameter::{ParameterKind, ParameterSpec};

/// Decides who executes a block and which channels it may fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockKind {
  Start,
  End,
  Loop,
  VariableSet,
  Compare,
  /// Executed remotely, settles on `pass` or `fail`.
  Conditional,
  /// Executed remotely, settles on `out` or `fail`.
  Action,
}

impl BlockKind {
  /// True when the engine evaluates the block itself instead of dispatching it
  /// to the executor.
  pub fn is_local(self) -> bool {
    !matches!(self, BlockKind::Conditional | BlockKind::Action)
  }

  pub fn default_outputs(self) -> &'static [Channel] {
    match self {
      BlockKind::Start | BlockKind::VariableSet => &[Channel::Out],
      BlockKind::End => &[],
      BlockKind::Loop => &[Channel::Iteration, Channel::Complete],
      BlockKind::Compare | BlockKind::Conditional => &[Channel::Pass, Channel::Fail],
      BlockKind::Action => &[Channel::Out, Channel::Fail],
    }
  }

  pub fn default_inputs(self) -> &'static [&'static str] {
    match self {
      BlockKind::Start => &[],
      BlockKind::Loop => &[INPUT_PORT, LOOP_BACK_PORT],
      _ => &[INPUT_PORT],
    }
  }

  fn required_outputs(self) -> &'static [Channel] {
    match self {
      BlockKind::Loop => &[Channel::Iteration, Channel::Complete],
      BlockKind::Compare | BlockKind::Conditional => &[Channel::Pass, Channel::Fail],
      BlockKind::Action => &[Channel::Out],
      _ => &[],
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
  pub channel: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub label: Option<String>,
}

impl Port {
  pub fn new(channel: impl Into<String>) -> Self {
    Self {
      channel: channel.into(),
      label: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDefinition {
  #[serde(rename = "type")]
  pub block_type: String,
  pub label: String,
  pub category: String,
  pub kind: BlockKind,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default)]
  pub parameters: Vec<ParameterSpec>,
  #[serde(default)]
  pub inputs: Vec<Port>,
  #[serde(default)]
  pub outputs: Vec<Port>,
}

impl BlockDefinition {
  /// A definition with the default ports of `kind` and no parameters.
  pub fn new(
    block_type: impl Into<String>,
    label: impl Into<String>,
    category: impl Into<String>,
    kind: BlockKind,
  ) -> Self {
    let mut def = Self {
      block_type: block_type.into(),
      label: label.into(),
      category: category.into(),
      kind,
      description: None,
      parameters: Vec::new(),
      inputs: Vec::new(),
      outputs: Vec::new(),
    };
    def.fill_default_ports();
    def
  }

  pub fn with_parameter(mut self, spec: ParameterSpec) -> Self {
    self.parameters.push(spec);
    self
  }

  pub fn describe(mut self, text: impl Into<String>) -> Self {
    self.description = Some(text.into());
    self
  }

  pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
    self.parameters.iter().find(|p| p.name == name)
  }

  /// Whether the block declares `channel` among its outputs.
  pub fn declares(&self, channel: Channel) -> bool {
    self.outputs.iter().any(|p| p.channel == channel.as_str())
  }

  pub fn output_channels(&self) -> impl Iterator<Item = Channel> + '_ {
    self.outputs.iter().filter_map(|p| Channel::parse(&p.channel))
  }

  pub fn accepts_input(&self, port: &str) -> bool {
    self.inputs.iter().any(|p| p.channel == port)
  }

  /// Port lists omitted from a JSON document default to the kind's ports.
  pub(crate) fn fill_default_ports(&mut self) {
    if self.inputs.is_empty() {
      self.inputs = self.kind.default_inputs().iter().map(|p| Port::new(*p)).collect();
    }
    if self.outputs.is_empty() {
      self.outputs = self
        .kind
        .default_outputs()
        .iter()
        .map(|c| Port::new(c.as_str()))
        .collect();
    }
  }

  pub(crate) fn validate(&self) -> Result<(), CatalogError> {
    let invalid = |message: String| CatalogError::InvalidDefinition {
      block_type: self.block_type.clone(),
      message,
    };

    if self.block_type.trim().is_empty() {
      return Err(invalid("block type must not be empty".into()));
    }

    for port in &self.outputs {
      if Channel::parse(&port.channel).is_none() {
        return Err(invalid(format!("unknown output channel '{}'", port.channel)));
      }
    }
    for required in self.kind.required_outputs() {
      if !self.declares(*required) {
        return Err(invalid(format!(
          "{:?} blocks must declare the '{}' channel",
          self.kind, required
        )));
      }
    }

    let mut seen = HashSet::new();
    for spec in &self.parameters {
      if !seen.insert(spec.name.as_str()) {
        return Err(invalid(format!("parameter '{}' declared twice", spec.name)));
      }
      if spec.kind == ParameterKind::Enum && spec.options.is_empty() {
        return Err(invalid(format!("enum parameter '{}' has no options", spec.name)));
      }
      if let Some(default) = &spec.default {
        spec
          .coerce(default)
          .map_err(|e| invalid(format!("default of '{}': {e}", spec.name)))?;
      }
    }

    Ok(())
  }
}
