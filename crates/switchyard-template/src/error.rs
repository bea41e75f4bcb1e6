use thiserror::Error;

/// A template that cannot be parsed, or a span that cannot be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
  #[error("unterminated template span starting at offset {offset}")]
  Unterminated { offset: usize },

  #[error("malformed expression '{span}': {message}")]
  Malformed { span: String, message: String },

  #[error("unknown filter '{filter}' in '{span}'")]
  UnknownFilter { span: String, filter: String },

  #[error("filter '{filter}' takes {expected} in '{span}', got {actual}")]
  Arity {
    span: String,
    filter: String,
    expected: String,
    actual: usize,
  },

  #[error("negative index in '{span}' is not supported")]
  NegativeIndex { span: String },

  #[error("filter '{filter}' failed in '{span}': {message}")]
  Filter {
    span: String,
    filter: String,
    message: String,
  },
}

impl ResolutionError {
  /// Text of the offending span, when the error belongs to one.
  pub fn span(&self) -> Option<&str> {
    match self {
      ResolutionError::Unterminated { .. } => None,
      ResolutionError::Malformed { span, .. }
      | ResolutionError::UnknownFilter { span, .. }
      | ResolutionError::Arity { span, .. }
      | ResolutionError::NegativeIndex { span }
      | ResolutionError::Filter { span, .. } => Some(span),
    }
  }
}
