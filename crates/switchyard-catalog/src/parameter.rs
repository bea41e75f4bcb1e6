use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The declared kind of a block parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterKind {
  String,
  Number,
  Boolean,
  Enum,
  /// A string that must never appear in logs.
  Secret,
  /// Name of a credential held by the executor.
  CredentialRef,
  /// Any JSON value (arrays for loops, objects for variables).
  Json,
}

impl ParameterKind {
  pub fn as_str(self) -> &'static str {
    match self {
      ParameterKind::String => "string",
      ParameterKind::Number => "number",
      ParameterKind::Boolean => "boolean",
      ParameterKind::Enum => "enum",
      ParameterKind::Secret => "secret",
      ParameterKind::CredentialRef => "credentialRef",
      ParameterKind::Json => "json",
    }
  }

  pub fn is_sensitive(self) -> bool {
    matches!(self, ParameterKind::Secret)
  }

  /// Coerce `value` into this kind. `options` is only consulted for enums.
  ///
  /// Strings are parsed the way an editor form would submit them: `"3"` is a
  /// valid number and `"TRUE"` a valid boolean. Json parameters accept any
  /// value and decode strings that hold a JSON array or object.
  pub fn coerce(self, value: &Value, options: &[String]) -> Result<Value, String> {
    match self {
      ParameterKind::Json => Ok(match value {
        Value::String(s) => decode_structured(s).unwrap_or_else(|| value.clone()),
        other => other.clone(),
      }),

      ParameterKind::String | ParameterKind::Secret | ParameterKind::CredentialRef => match value {
        Value::String(_) => Ok(value.clone()),
        Value::Number(n) => Ok(Value::String(n.to_string())),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        other => Err(format!("expected {}, got {}", self, type_name(other))),
      },

      ParameterKind::Number => match value {
        Value::Number(_) => Ok(value.clone()),
        Value::String(s) => parse_number(s.trim()).ok_or_else(|| format!("expected number, got '{s}'")),
        other => Err(format!("expected number, got {}", type_name(other))),
      },

      ParameterKind::Boolean => match value {
        Value::Bool(_) => Ok(value.clone()),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
          "true" => Ok(Value::Bool(true)),
          "false" => Ok(Value::Bool(false)),
          _ => Err(format!("expected boolean, got '{s}'")),
        },
        other => Err(format!("expected boolean, got {}", type_name(other))),
      },

      ParameterKind::Enum => {
        let Value::String(s) = value else {
          return Err(format!("expected one of [{}], got {}", options.join(", "), type_name(value)));
        };
        if options.iter().any(|o| o == s) {
          Ok(value.clone())
        } else {
          Err(format!("'{s}' is not one of [{}]", options.join(", ")))
        }
      }
    }
  }
}

impl fmt::Display for ParameterKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

fn parse_number(s: &str) -> Option<Value> {
  if let Ok(i) = s.parse::<i64>() {
    return Some(Value::from(i));
  }
  s.parse::<f64>()
    .ok()
    .and_then(serde_json::Number::from_f64)
    .map(Value::Number)
}

fn decode_structured(s: &str) -> Option<Value> {
  let trimmed = s.trim();
  if !(trimmed.starts_with('[') || trimmed.starts_with('{')) {
    return None;
  }
  serde_json::from_str(trimmed).ok()
}

/// Short JSON type name used in error messages.
pub fn type_name(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpec {
  pub name: String,
  pub kind: ParameterKind,
  #[serde(default)]
  pub required: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default: Option<Value>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub options: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

impl ParameterSpec {
  pub fn new(name: impl Into<String>, kind: ParameterKind) -> Self {
    Self {
      name: name.into(),
      kind,
      required: false,
      default: None,
      options: Vec::new(),
      description: None,
    }
  }

  pub fn required(mut self) -> Self {
    self.required = true;
    self
  }

  pub fn with_default(mut self, value: impl Into<Value>) -> Self {
    self.default = Some(value.into());
    self
  }

  pub fn with_options(mut self, options: &[&str]) -> Self {
    self.options = options.iter().map(|o| o.to_string()).collect();
    self
  }

  pub fn describe(mut self, text: impl Into<String>) -> Self {
    self.description = Some(text.into());
    self
  }

  pub fn coerce(&self, value: &Value) -> Result<Value, String> {
    self.kind.coerce(value, &self.options)
  }
}
