use serde_json::{Map, Value};

use crate::context::ResolutionContext;
use crate::error::ResolutionError;
use crate::template::Template;

/// A parameter value with every template leaf pre-parsed.
///
/// Subtrees without spans collapse into [`TemplateValue::Literal`], so a value
/// with no templates anywhere is a single literal.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
  Literal(Value),
  Template(Template),
  Array(Vec<TemplateValue>),
  Object(Vec<(String, TemplateValue)>),
}

impl TemplateValue {
  pub fn parse(raw: &Value) -> Result<Self, ResolutionError> {
    Ok(match raw {
      Value::String(s) => {
        let template = Template::parse(s)?;
        if template.is_literal() {
          TemplateValue::Literal(raw.clone())
        } else {
          TemplateValue::Template(template)
        }
      }
      Value::Array(items) => {
        let parsed = items.iter().map(Self::parse).collect::<Result<Vec<_>, _>>()?;
        if parsed.iter().all(Self::is_literal) {
          TemplateValue::Literal(raw.clone())
        } else {
          TemplateValue::Array(parsed)
        }
      }
      Value::Object(map) => {
        let parsed = map
          .iter()
          .map(|(k, v)| Self::parse(v).map(|p| (k.clone(), p)))
          .collect::<Result<Vec<_>, _>>()?;
        if parsed.iter().all(|(_, v)| v.is_literal()) {
          TemplateValue::Literal(raw.clone())
        } else {
          TemplateValue::Object(parsed)
        }
      }
      other => TemplateValue::Literal(other.clone()),
    })
  }

  pub fn is_literal(&self) -> bool {
    matches!(self, TemplateValue::Literal(_))
  }

  /// Render every leaf. Undefined leaves nested in arrays or objects become
  /// `null` so positions and keys survive.
  pub fn render(&self, ctx: &ResolutionContext<'_>) -> Result<Option<Value>, ResolutionError> {
    match self {
      TemplateValue::Literal(value) => Ok(Some(value.clone())),
      TemplateValue::Template(template) => template.render(ctx),
      TemplateValue::Array(items) => {
        let rendered = items
          .iter()
          .map(|item| item.render(ctx).map(|v| v.unwrap_or(Value::Null)))
          .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(Value::Array(rendered)))
      }
      TemplateValue::Object(entries) => {
        let mut map = Map::new();
        for (key, entry) in entries {
          map.insert(key.clone(), entry.render(ctx)?.unwrap_or(Value::Null));
        }
        Ok(Some(Value::Object(map)))
      }
    }
  }

  pub fn node_references(&self) -> Vec<&str> {
    match self {
      TemplateValue::Literal(_) => Vec::new(),
      TemplateValue::Template(template) => template.node_references(),
      TemplateValue::Array(items) => items.iter().flat_map(Self::node_references).collect(),
      TemplateValue::Object(entries) => entries
        .iter()
        .flat_map(|(_, v)| v.node_references())
        .collect(),
    }
  }
}

/// Resolve a raw JSON parameter value leaf by leaf.
pub fn resolve_value(raw: &Value, ctx: &ResolutionContext<'_>) -> Result<Option<Value>, ResolutionError> {
  TemplateValue::parse(raw)?.render(ctx)
}
