use std::sync::Arc;

use serde_json::{Map, Value};
use switchyard_catalog::{BlockDefinition, BlockKind, ParameterKind, ParameterSpec};
use switchyard_template::{ResolutionContext, TemplateValue};
use tracing::warn;

use crate::error::{ParameterError, ValidationError};

/// Placeholder written over secret parameter values in logs.
pub const REDACTED: &str = "********";

/// A node bound to its block definition.
#[derive(Debug, Clone)]
pub struct Node {
  pub id: String,
  pub label: String,
  pub block: Arc<BlockDefinition>,
  pub parameters: ParameterBag,
}

impl Node {
  pub fn block_type(&self) -> &str {
    &self.block.block_type
  }

  pub fn kind(&self) -> BlockKind {
    self.block.kind
  }
}

/// One declared parameter and the value it will be resolved from.
#[derive(Debug, Clone)]
pub struct BoundParameter {
  pub spec: ParameterSpec,
  /// `None` when the node supplied nothing and the parameter has no default.
  pub value: Option<TemplateValue>,
}

/// A node's parameters, checked against its block's specs.
///
/// Literals are coerced to their kind when the bag is built; template values
/// are coerced after each resolution.
#[derive(Debug, Clone, Default)]
pub struct ParameterBag {
  entries: Vec<BoundParameter>,
}

impl ParameterBag {
  pub(crate) fn bind(
    node_id: &str,
    block: &BlockDefinition,
    raw: &Map<String, Value>,
    errors: &mut Vec<ValidationError>,
  ) -> Self {
    let mut entries = Vec::with_capacity(block.parameters.len());

    for spec in &block.parameters {
      let supplied = raw.get(&spec.name).filter(|v| !v.is_null());
      let value = match supplied {
        Some(raw_value) if spec.required && is_blank(raw_value) => {
          errors.push(ValidationError::MissingParameter {
            node_id: node_id.to_string(),
            parameter: spec.name.clone(),
          });
          None
        }
        Some(raw_value) => match TemplateValue::parse(raw_value) {
          Ok(TemplateValue::Literal(literal)) => match spec.coerce(&literal) {
            Ok(coerced) => Some(TemplateValue::Literal(coerced)),
            Err(message) => {
              errors.push(ValidationError::InvalidParameter {
                node_id: node_id.to_string(),
                parameter: spec.name.clone(),
                message,
              });
              None
            }
          },
          Ok(template) => Some(template),
          Err(source) => {
            errors.push(ValidationError::InvalidTemplate {
              node_id: node_id.to_string(),
              parameter: spec.name.clone(),
              source,
            });
            None
          }
        },
        None => match &spec.default {
          Some(default) => spec.coerce(default).ok().map(TemplateValue::Literal),
          None => {
            if spec.required {
              errors.push(ValidationError::MissingParameter {
                node_id: node_id.to_string(),
                parameter: spec.name.clone(),
              });
            }
            None
          }
        },
      };
      entries.push(BoundParameter {
        spec: spec.clone(),
        value,
      });
    }

    for name in raw.keys() {
      if block.parameter(name).is_none() {
        warn!(node_id, parameter = %name, block_type = %block.block_type, "ignoring undeclared parameter");
      }
    }

    Self { entries }
  }

  pub fn get(&self, name: &str) -> Option<&BoundParameter> {
    self.entries.iter().find(|e| e.spec.name == name)
  }

  pub fn iter(&self) -> impl Iterator<Item = &BoundParameter> {
    self.entries.iter()
  }

  /// `(parameter, referenced node id)` for every `$node.<id>` in the bag.
  pub fn node_references(&self) -> Vec<(&str, &str)> {
    self
      .entries
      .iter()
      .flat_map(|entry| {
        let refs = entry
          .value
          .as_ref()
          .map(TemplateValue::node_references)
          .unwrap_or_default();
        refs.into_iter().map(move |id| (entry.spec.name.as_str(), id))
      })
      .collect()
  }

  /// Resolve every parameter against `ctx` and coerce it to its kind.
  ///
  /// An undefined result falls back to the declared default; a required
  /// parameter with neither is an error. Optional parameters that resolve to
  /// nothing are left out of the map.
  pub fn resolve(&self, ctx: &ResolutionContext<'_>) -> Result<Map<String, Value>, ParameterError> {
    let mut resolved = Map::new();

    for entry in &self.entries {
      let name = &entry.spec.name;
      let value = match &entry.value {
        Some(value) => value.render(ctx).map_err(|source| ParameterError::Resolution {
          parameter: name.clone(),
          source,
        })?,
        None => None,
      };
      let value = match value {
        Some(Value::Null) if entry.spec.kind != ParameterKind::Json => None,
        other => other,
      };

      match value.or_else(|| entry.spec.default.clone()) {
        Some(value) => {
          let coerced = entry.spec.coerce(&value).map_err(|message| ParameterError::Invalid {
            parameter: name.clone(),
            message,
          })?;
          resolved.insert(name.clone(), coerced);
        }
        None if entry.spec.required => {
          return Err(ParameterError::Missing {
            parameter: name.clone(),
          });
        }
        None => {}
      }
    }

    Ok(resolved)
  }

  /// Copy of `resolved` with secret values masked.
  pub fn redact(&self, resolved: &Map<String, Value>) -> Map<String, Value> {
    let mut redacted = resolved.clone();
    for entry in &self.entries {
      if entry.spec.kind.is_sensitive() {
        if let Some(value) = redacted.get_mut(&entry.spec.name) {
          *value = Value::String(REDACTED.to_string());
        }
      }
    }
    redacted
  }
}

fn is_blank(value: &Value) -> bool {
  value.as_str().is_some_and(|s| s.trim().is_empty())
}
