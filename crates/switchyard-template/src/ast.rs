use serde_json::Value;

use crate::filters::Filter;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment {
  Text(String),
  Span(Span),
}

/// One `{{ ... }}` span.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Span {
  /// Trimmed source between the braces, used in error messages.
  pub source: String,
  pub root: Root,
  pub path: Vec<Accessor>,
  pub filters: Vec<FilterCall>,
}

/// Where a span starts reading from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Root {
  Prev,
  Node(String),
  Loop,
  Vars,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
  Field(String),
  Index(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FilterCall {
  pub filter: Filter,
  pub args: Vec<Value>,
}
