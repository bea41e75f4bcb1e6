use serde_json::Value;

use crate::ast::{Accessor, FilterCall, Root, Segment, Span};
use crate::error::ResolutionError;
use crate::filters::Filter;

pub(crate) fn parse_segments(source: &str) -> Result<Vec<Segment>, ResolutionError> {
  let mut segments = Vec::new();
  let mut rest = source;
  let mut offset = 0;

  while !rest.is_empty() {
    let Some(open) = rest.find("{{") else {
      segments.push(Segment::Text(rest.to_string()));
      break;
    };
    if open > 0 {
      segments.push(Segment::Text(rest[..open].to_string()));
    }

    let body = open + 2;
    let close = find_close(&rest[body..]).ok_or(ResolutionError::Unterminated {
      offset: offset + open,
    })?;
    segments.push(Segment::Span(parse_span(&rest[body..body + close])?));

    let consumed = body + close + 2;
    offset += consumed;
    rest = &rest[consumed..];
  }

  Ok(segments)
}

/// Byte offset of the closing `}}`, ignoring braces inside quoted literals.
fn find_close(s: &str) -> Option<usize> {
  let bytes = s.as_bytes();
  let mut quote: Option<u8> = None;
  let mut i = 0;
  while i < bytes.len() {
    let b = bytes[i];
    match quote {
      Some(q) => {
        if b == b'\\' {
          i += 2;
          continue;
        }
        if b == q {
          quote = None;
        }
      }
      None => {
        if b == b'\'' || b == b'"' {
          quote = Some(b);
        } else if b == b'}' && bytes.get(i + 1) == Some(&b'}') {
          return Some(i);
        }
      }
    }
    i += 1;
  }
  None
}

pub(crate) fn parse_span(inner: &str) -> Result<Span, ResolutionError> {
  let mut cursor = Cursor::new(inner);
  cursor.skip_ws();
  if cursor.at_end() {
    return Err(cursor.malformed("empty expression"));
  }

  let root = cursor.root()?;
  let path = cursor.path()?;
  let filters = cursor.filters()?;

  cursor.skip_ws();
  if let Some(c) = cursor.peek() {
    return Err(cursor.malformed(format!("unexpected '{c}'")));
  }

  Ok(Span {
    source: cursor.span.clone(),
    root,
    path,
    filters,
  })
}

struct Cursor {
  span: String,
  chars: Vec<char>,
  pos: usize,
}

impl Cursor {
  fn new(inner: &str) -> Self {
    Self {
      span: inner.trim().to_string(),
      chars: inner.chars().collect(),
      pos: 0,
    }
  }

  fn peek(&self) -> Option<char> {
    self.chars.get(self.pos).copied()
  }

  fn bump(&mut self) -> Option<char> {
    let c = self.peek()?;
    self.pos += 1;
    Some(c)
  }

  fn eat(&mut self, expected: char) -> bool {
    if self.peek() == Some(expected) {
      self.pos += 1;
      true
    } else {
      false
    }
  }

  fn at_end(&self) -> bool {
    self.pos >= self.chars.len()
  }

  fn skip_ws(&mut self) {
    while self.peek().is_some_and(char::is_whitespace) {
      self.pos += 1;
    }
  }

  fn take_while(&mut self, accept: impl Fn(char) -> bool) -> String {
    let start = self.pos;
    while self.peek().is_some_and(&accept) {
      self.pos += 1;
    }
    self.chars[start..self.pos].iter().collect()
  }

  /// Node ids and field names: letters, digits, `_` and `-`.
  fn identifier(&mut self) -> String {
    self.take_while(|c| c.is_alphanumeric() || c == '_' || c == '-')
  }

  fn malformed(&self, message: impl Into<String>) -> ResolutionError {
    ResolutionError::Malformed {
      span: self.span.clone(),
      message: message.into(),
    }
  }

  fn root(&mut self) -> Result<Root, ResolutionError> {
    if !self.eat('$') {
      return Err(self.malformed("expected a root selector ($prev, $node, $loop or $vars)"));
    }
    let name = self.take_while(|c| c.is_ascii_alphabetic());
    match name.as_str() {
      "prev" => Ok(Root::Prev),
      "loop" => Ok(Root::Loop),
      "vars" => Ok(Root::Vars),
      "node" => {
        let id = if self.eat('.') {
          self.identifier()
        } else if self.eat('[') {
          let key = self.quoted_key()?;
          self.close_bracket()?;
          key
        } else {
          String::new()
        };
        if id.is_empty() {
          return Err(self.malformed("expected a node id after '$node'"));
        }
        Ok(Root::Node(id))
      }
      other => Err(self.malformed(format!("unknown root selector '${other}'"))),
    }
  }

  fn path(&mut self) -> Result<Vec<Accessor>, ResolutionError> {
    let mut path = Vec::new();
    loop {
      if self.eat('.') {
        let field = self.identifier();
        if field.is_empty() {
          return Err(self.malformed("expected a field name after '.'"));
        }
        path.push(Accessor::Field(field));
      } else if self.eat('[') {
        self.skip_ws();
        let accessor = match self.peek() {
          Some('-') => {
            return Err(ResolutionError::NegativeIndex {
              span: self.span.clone(),
            });
          }
          Some(c) if c.is_ascii_digit() => {
            let digits = self.take_while(|c| c.is_ascii_digit());
            let index = digits
              .parse::<usize>()
              .map_err(|_| self.malformed(format!("index '{digits}' is out of range")))?;
            Accessor::Index(index)
          }
          Some('\'' | '"') => Accessor::Field(self.quoted_key()?),
          _ => return Err(self.malformed("expected an index or a quoted key inside '[ ]'")),
        };
        self.close_bracket()?;
        path.push(accessor);
      } else {
        return Ok(path);
      }
    }
  }

  fn quoted_key(&mut self) -> Result<String, ResolutionError> {
    self.skip_ws();
    match self.string_literal()? {
      Some(key) => Ok(key),
      None => Err(self.malformed("expected a quoted key")),
    }
  }

  fn close_bracket(&mut self) -> Result<(), ResolutionError> {
    self.skip_ws();
    if self.eat(']') {
      Ok(())
    } else {
      Err(self.malformed("expected ']'"))
    }
  }

  fn filters(&mut self) -> Result<Vec<FilterCall>, ResolutionError> {
    let mut filters = Vec::new();
    loop {
      self.skip_ws();
      if !self.eat('|') {
        return Ok(filters);
      }
      self.skip_ws();
      let name = self.take_while(|c| c.is_alphanumeric() || c == '_');
      if name.is_empty() {
        return Err(self.malformed("expected a filter name after '|'"));
      }
      let filter = Filter::from_name(&name).ok_or_else(|| ResolutionError::UnknownFilter {
        span: self.span.clone(),
        filter: name.clone(),
      })?;

      self.skip_ws();
      let args = if self.eat('(') { self.arguments()? } else { Vec::new() };

      let (min, max) = filter.arity();
      if args.len() < min || args.len() > max {
        return Err(ResolutionError::Arity {
          span: self.span.clone(),
          filter: name,
          expected: filter.describe_arity(),
          actual: args.len(),
        });
      }
      filters.push(FilterCall { filter, args });
    }
  }

  fn arguments(&mut self) -> Result<Vec<Value>, ResolutionError> {
    let mut args = Vec::new();
    self.skip_ws();
    if self.eat(')') {
      return Ok(args);
    }
    loop {
      self.skip_ws();
      args.push(self.literal()?);
      self.skip_ws();
      if self.eat(',') {
        continue;
      }
      if self.eat(')') {
        return Ok(args);
      }
      return Err(self.malformed("expected ',' or ')' in filter arguments"));
    }
  }

  fn literal(&mut self) -> Result<Value, ResolutionError> {
    if let Some(s) = self.string_literal()? {
      return Ok(Value::String(s));
    }
    match self.peek() {
      Some(c) if c.is_ascii_digit() || c == '-' => {
        let text = self.take_while(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'));
        if let Ok(i) = text.parse::<i64>() {
          return Ok(Value::from(i));
        }
        text
          .parse::<f64>()
          .ok()
          .and_then(serde_json::Number::from_f64)
          .map(Value::Number)
          .ok_or_else(|| self.malformed(format!("invalid number '{text}'")))
      }
      Some(c) if c.is_ascii_alphabetic() => {
        let word = self.take_while(|c| c.is_ascii_alphabetic());
        match word.as_str() {
          "true" => Ok(Value::Bool(true)),
          "false" => Ok(Value::Bool(false)),
          "null" => Ok(Value::Null),
          other => Err(self.malformed(format!("filter arguments must be literals, got '{other}'"))),
        }
      }
      _ => Err(self.malformed("expected a literal argument")),
    }
  }

  /// A single- or double-quoted string, if one starts here.
  fn string_literal(&mut self) -> Result<Option<String>, ResolutionError> {
    let quote = match self.peek() {
      Some(q @ ('\'' | '"')) => q,
      _ => return Ok(None),
    };
    self.pos += 1;
    let mut out = String::new();
    loop {
      match self.bump() {
        None => return Err(self.malformed("unterminated string literal")),
        Some('\\') => match self.bump() {
          Some('n') => out.push('\n'),
          Some('t') => out.push('\t'),
          Some(c) => out.push(c),
          None => return Err(self.malformed("unterminated string literal")),
        },
        Some(c) if c == quote => return Ok(Some(out)),
        Some(c) => out.push(c),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn span(inner: &str) -> Span {
    parse_span(inner).unwrap()
  }

  #[test]
  fn test_parse_node_root_with_hyphenated_id() {
    let parsed = span(" $node.dns-lookup-1.addresses[0] ");
    assert_eq!(parsed.root, Root::Node("dns-lookup-1".into()));
    assert_eq!(
      parsed.path,
      vec![Accessor::Field("addresses".into()), Accessor::Index(0)]
    );
    assert_eq!(parsed.source, "$node.dns-lookup-1.addresses[0]");
  }

  #[test]
  fn test_parse_bracket_keys() {
    let parsed = span("$node['ping 1']['round trip']");
    assert_eq!(parsed.root, Root::Node("ping 1".into()));
    assert_eq!(parsed.path, vec![Accessor::Field("round trip".into())]);
  }

  #[test]
  fn test_parse_filter_chain_with_literals() {
    let parsed = span("$prev.hosts | join(', ') | default(\"none\") | length");
    let names: Vec<_> = parsed.filters.iter().map(|f| f.filter.name()).collect();
    assert_eq!(names, vec!["join", "default", "length"]);
    assert_eq!(parsed.filters[0].args, vec![json!(", ")]);
    assert_eq!(parsed.filters[1].args, vec![json!("none")]);
  }

  #[test]
  fn test_parse_numeric_and_keyword_arguments() {
    let parsed = span("$prev | default(-1.5)");
    assert_eq!(parsed.filters[0].args, vec![json!(-1.5)]);
    let parsed = span("$prev | json(true)");
    assert_eq!(parsed.filters[0].args, vec![json!(true)]);
    let parsed = span("$prev | default(null)");
    assert_eq!(parsed.filters[0].args, vec![Value::Null]);
  }

  #[test]
  fn test_negative_index_rejected() {
    let err = parse_span("$prev.items[-1]").unwrap_err();
    assert!(matches!(err, ResolutionError::NegativeIndex { .. }));
  }

  #[test]
  fn test_unknown_filter_names_span() {
    let err = parse_span("$prev | reverse").unwrap_err();
    assert_eq!(
      err,
      ResolutionError::UnknownFilter {
        span: "$prev | reverse".into(),
        filter: "reverse".into()
      }
    );
  }

  #[test]
  fn test_arity_checked_at_parse_time() {
    assert!(matches!(
      parse_span("$prev | default").unwrap_err(),
      ResolutionError::Arity { actual: 0, .. }
    ));
    assert!(matches!(
      parse_span("$prev | upper('x')").unwrap_err(),
      ResolutionError::Arity { actual: 1, .. }
    ));
  }

  #[test]
  fn test_malformed_expressions() {
    for inner in [
      "",
      "prev",
      "$unknown",
      "$node",
      "$node.",
      "$prev.",
      "$prev[",
      "$prev[x]",
      "$prev | default(bare)",
      "$prev | default('x'",
      "$prev extra",
    ] {
      assert!(
        matches!(parse_span(inner), Err(ResolutionError::Malformed { .. })),
        "expected malformed for {inner:?}"
      );
    }
  }

  #[test]
  fn test_segments_split_text_and_spans() {
    let segments = parse_segments("host {{ $loop.item }} is {{$prev.state}}").unwrap();
    assert_eq!(segments.len(), 4);
    assert!(matches!(&segments[0], Segment::Text(t) if t == "host "));
    assert!(matches!(&segments[1], Segment::Span(_)));
    assert!(matches!(&segments[2], Segment::Text(t) if t == " is "));
  }

  #[test]
  fn test_closing_braces_inside_literals() {
    let segments = parse_segments("{{ $prev | default('}}') }}").unwrap();
    assert_eq!(segments.len(), 1);
  }

  #[test]
  fn test_unterminated_span_reports_offset() {
    let err = parse_segments("ok {{ $prev ").unwrap_err();
    assert_eq!(err, ResolutionError::Unterminated { offset: 3 });
  }
}
