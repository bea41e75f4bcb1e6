use serde_json::Value;
use tracing::trace;

use crate::ast::{Accessor, Root, Segment, Span};
use crate::context::ResolutionContext;
use crate::error::ResolutionError;
use crate::filters::Filter;
use crate::parser::parse_segments;

/// A parsed template string.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
  source: String,
  segments: Vec<Segment>,
}

impl Template {
  pub fn parse(source: &str) -> Result<Self, ResolutionError> {
    Ok(Self {
      source: source.to_string(),
      segments: parse_segments(source)?,
    })
  }

  pub fn source(&self) -> &str {
    &self.source
  }

  /// True when the string holds no spans and renders to itself.
  pub fn is_literal(&self) -> bool {
    self.segments.iter().all(|s| matches!(s, Segment::Text(_)))
  }

  /// Ids named by `$node.<id>` roots, in order of appearance.
  pub fn node_references(&self) -> Vec<&str> {
    self
      .spans()
      .filter_map(|span| match &span.root {
        Root::Node(id) => Some(id.as_str()),
        _ => None,
      })
      .collect()
  }

  /// Render against `ctx`. `Ok(None)` means the value is undefined, which only
  /// happens when the whole string is a single span.
  pub fn render(&self, ctx: &ResolutionContext<'_>) -> Result<Option<Value>, ResolutionError> {
    match self.segments.as_slice() {
      [] => Ok(Some(Value::String(String::new()))),
      [Segment::Span(span)] => {
        let value = evaluate(span, ctx)?;
        trace!(span = %span.source, defined = value.is_some(), "resolved template span");
        Ok(value)
      }
      segments => {
        let mut out = String::with_capacity(self.source.len());
        for segment in segments {
          match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Span(span) => out.push_str(&stringify(evaluate(span, ctx)?.as_ref())),
          }
        }
        Ok(Some(Value::String(out)))
      }
    }
  }

  fn spans(&self) -> impl Iterator<Item = &Span> {
    self.segments.iter().filter_map(|s| match s {
      Segment::Span(span) => Some(span),
      Segment::Text(_) => None,
    })
  }
}

/// Parse and render in one step.
pub fn resolve(raw: &str, ctx: &ResolutionContext<'_>) -> Result<Option<Value>, ResolutionError> {
  Template::parse(raw)?.render(ctx)
}

/// Text form used when a span is embedded in a larger string: undefined is
/// empty, strings are verbatim and anything else is compact JSON.
pub fn stringify(value: Option<&Value>) -> String {
  match value {
    None => String::new(),
    Some(Value::String(s)) => s.clone(),
    Some(other) => other.to_string(),
  }
}

fn evaluate(span: &Span, ctx: &ResolutionContext<'_>) -> Result<Option<Value>, ResolutionError> {
  let mut state: Result<Option<Value>, ResolutionError> = Ok(lookup(span, ctx));

  for call in &span.filters {
    state = match (call.filter, state) {
      (Filter::Default, Ok(Some(value))) if !value.is_null() => Ok(Some(value)),
      (Filter::Default, _) => Ok(call.args.first().cloned()),
      (_, Err(err)) => Err(err),
      (filter, Ok(value)) => filter
        .apply(value, &call.args)
        .map_err(|message| ResolutionError::Filter {
          span: span.source.clone(),
          filter: filter.name().to_string(),
          message,
        }),
    };
  }

  state
}

fn lookup(span: &Span, ctx: &ResolutionContext<'_>) -> Option<Value> {
  match &span.root {
    Root::Prev => walk(ctx.prev()?, &span.path).cloned(),
    Root::Node(id) => walk(ctx.node(id)?, &span.path).cloned(),
    Root::Loop => {
      let frame = ctx.loop_frame()?.to_value();
      walk(&frame, &span.path).cloned()
    }
    Root::Vars => match span.path.split_first() {
      None => Some(Value::Object(ctx.vars().cloned().unwrap_or_default())),
      Some((Accessor::Field(name), rest)) => walk(ctx.var(name)?, rest).cloned(),
      Some((Accessor::Index(_), _)) => None,
    },
  }
}

fn walk<'v>(mut current: &'v Value, path: &[Accessor]) -> Option<&'v Value> {
  for accessor in path {
    current = match (current, accessor) {
      (Value::Object(map), Accessor::Field(key)) => map.get(key)?,
      (Value::Array(items), Accessor::Index(index)) => items.get(*index)?,
      _ => return None,
    };
  }
  Some(current)
}
