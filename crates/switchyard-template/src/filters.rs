use serde_json::{Value, json};

use crate::template::stringify;

/// A filter in a span's pipe chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
  First,
  Last,
  Length,
  Trim,
  Lower,
  Upper,
  Json,
  Split,
  Join,
  Default,
  Keys,
  Stringify,
  ToNumber,
}

impl Filter {
  pub fn from_name(name: &str) -> Option<Self> {
    Some(match name {
      "first" => Filter::First,
      "last" => Filter::Last,
      "length" => Filter::Length,
      "trim" => Filter::Trim,
      "lower" => Filter::Lower,
      "upper" => Filter::Upper,
      "json" => Filter::Json,
      "split" => Filter::Split,
      "join" => Filter::Join,
      "default" => Filter::Default,
      "keys" => Filter::Keys,
      "string" => Filter::Stringify,
      "number" => Filter::ToNumber,
      _ => return None,
    })
  }

  pub fn name(self) -> &'static str {
    match self {
      Filter::First => "first",
      Filter::Last => "last",
      Filter::Length => "length",
      Filter::Trim => "trim",
      Filter::Lower => "lower",
      Filter::Upper => "upper",
      Filter::Json => "json",
      Filter::Split => "split",
      Filter::Join => "join",
      Filter::Default => "default",
      Filter::Keys => "keys",
      Filter::Stringify => "string",
      Filter::ToNumber => "number",
    }
  }

  /// Minimum and maximum argument count.
  pub fn arity(self) -> (usize, usize) {
    match self {
      Filter::Default => (1, 1),
      Filter::Json | Filter::Split | Filter::Join => (0, 1),
      _ => (0, 0),
    }
  }

  pub(crate) fn describe_arity(self) -> String {
    match self.arity() {
      (0, 0) => "no arguments".to_string(),
      (min, max) if min == max => format!("{min} argument(s)"),
      (min, max) => format!("{min} to {max} arguments"),
    }
  }

  /// Apply to a defined or undefined input. `default` is handled by the
  /// evaluator because it also absorbs errors from earlier filters.
  pub(crate) fn apply(self, input: Option<Value>, args: &[Value]) -> Result<Option<Value>, String> {
    let Some(input) = input else {
      return Ok(None);
    };

    match self {
      Filter::Default => Ok(Some(input)),

      Filter::First => match input {
        Value::Array(items) => Ok(items.into_iter().next()),
        Value::String(s) => Ok(s.chars().next().map(|c| Value::String(c.to_string()))),
        other => Err(expected("an array or string", &other)),
      },

      Filter::Last => match input {
        Value::Array(mut items) => Ok(items.pop()),
        Value::String(s) => Ok(s.chars().last().map(|c| Value::String(c.to_string()))),
        other => Err(expected("an array or string", &other)),
      },

      Filter::Length => match input {
        Value::Array(items) => Ok(Some(json!(items.len()))),
        Value::String(s) => Ok(Some(json!(s.chars().count()))),
        Value::Object(map) => Ok(Some(json!(map.len()))),
        other => Err(expected("an array, string or object", &other)),
      },

      Filter::Trim => map_string(input, |s| s.trim().to_string()),
      Filter::Lower => map_string(input, |s| s.to_lowercase()),
      Filter::Upper => map_string(input, |s| s.to_uppercase()),

      Filter::Json => {
        let pretty = args.first().is_some_and(is_truthy);
        let text = if pretty {
          serde_json::to_string_pretty(&input)
        } else {
          serde_json::to_string(&input)
        };
        text.map(|t| Some(Value::String(t))).map_err(|e| e.to_string())
      }

      Filter::Split => {
        let Value::String(s) = input else {
          return Err(expected("a string", &input));
        };
        let parts: Vec<Value> = match args.first() {
          None => s.split_whitespace().map(|p| Value::String(p.to_string())).collect(),
          Some(Value::String(sep)) if !sep.is_empty() => {
            s.split(sep.as_str()).map(|p| Value::String(p.to_string())).collect()
          }
          Some(_) => return Err("separator must be a non-empty string".to_string()),
        };
        Ok(Some(Value::Array(parts)))
      }

      Filter::Join => {
        let Value::Array(items) = input else {
          return Err(expected("an array", &input));
        };
        let separator = match args.first() {
          None => ",",
          Some(Value::String(sep)) => sep.as_str(),
          Some(_) => return Err("separator must be a string".to_string()),
        };
        let joined = items
          .iter()
          .map(|item| stringify(Some(item)))
          .collect::<Vec<_>>()
          .join(separator);
        Ok(Some(Value::String(joined)))
      }

      Filter::Keys => match input {
        Value::Object(map) => Ok(Some(Value::Array(map.keys().cloned().map(Value::String).collect()))),
        other => Err(expected("an object", &other)),
      },

      Filter::Stringify => Ok(Some(Value::String(stringify(Some(&input))))),

      Filter::ToNumber => match input {
        Value::Number(_) => Ok(Some(input)),
        Value::Bool(b) => Ok(Some(json!(u8::from(b)))),
        Value::String(s) => {
          let trimmed = s.trim();
          if let Ok(i) = trimmed.parse::<i64>() {
            return Ok(Some(json!(i)));
          }
          trimmed
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(|n| Some(Value::Number(n)))
            .ok_or_else(|| format!("'{s}' is not a number"))
        }
        other => Err(expected("a number, string or boolean", &other)),
      },
    }
  }
}

fn map_string(input: Value, f: impl FnOnce(&str) -> String) -> Result<Option<Value>, String> {
  match input {
    Value::String(s) => Ok(Some(Value::String(f(&s)))),
    other => Err(expected("a string", &other)),
  }
}

fn expected(what: &str, got: &Value) -> String {
  let kind = match got {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  };
  format!("expected {what}, got {kind}")
}

fn is_truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
    Value::String(s) => !s.is_empty(),
    Value::Array(items) => !items.is_empty(),
    Value::Object(map) => !map.is_empty(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn apply(filter: Filter, input: Value, args: &[Value]) -> Result<Option<Value>, String> {
    filter.apply(Some(input), args)
  }

  #[test]
  fn test_first_and_last() {
    assert_eq!(apply(Filter::First, json!([1, 2, 3]), &[]).unwrap(), Some(json!(1)));
    assert_eq!(apply(Filter::Last, json!([1, 2, 3]), &[]).unwrap(), Some(json!(3)));
    assert_eq!(apply(Filter::First, json!([]), &[]).unwrap(), None);
    assert_eq!(apply(Filter::Last, json!([]), &[]).unwrap(), None);
    assert_eq!(apply(Filter::First, json!("abc"), &[]).unwrap(), Some(json!("a")));
    assert!(apply(Filter::First, json!(5), &[]).is_err());
  }

  #[test]
  fn test_undefined_passes_through() {
    for filter in [Filter::First, Filter::Upper, Filter::Length, Filter::Json, Filter::ToNumber] {
      assert_eq!(filter.apply(None, &[]).unwrap(), None);
    }
  }

  #[test]
  fn test_length_counts_chars() {
    assert_eq!(apply(Filter::Length, json!("héllo"), &[]).unwrap(), Some(json!(5)));
    assert_eq!(apply(Filter::Length, json!({"a": 1}), &[]).unwrap(), Some(json!(1)));
    let err = apply(Filter::Length, json!(true), &[]).unwrap_err();
    assert_eq!(err, "expected an array, string or object, got boolean");
  }

  #[test]
  fn test_split_and_join() {
    assert_eq!(
      apply(Filter::Split, json!("a,b,c"), &[json!(",")]).unwrap(),
      Some(json!(["a", "b", "c"]))
    );
    assert_eq!(
      apply(Filter::Split, json!(" 22  80 443"), &[]).unwrap(),
      Some(json!(["22", "80", "443"]))
    );
    assert_eq!(
      apply(Filter::Join, json!(["a", 1, true]), &[json!(" | ")]).unwrap(),
      Some(json!("a | 1 | true"))
    );
    assert_eq!(apply(Filter::Join, json!([1, 2]), &[]).unwrap(), Some(json!("1,2")));
  }

  #[test]
  fn test_json_compact_and_pretty() {
    assert_eq!(
      apply(Filter::Json, json!({"a": [1, 2]}), &[]).unwrap(),
      Some(json!("{\"a\":[1,2]}"))
    );
    let pretty = apply(Filter::Json, json!({"a": 1}), &[json!(true)]).unwrap().unwrap();
    assert!(pretty.as_str().unwrap().contains('\n'));
  }

  #[test]
  fn test_number_and_string_conversions() {
    assert_eq!(apply(Filter::ToNumber, json!(" 42 "), &[]).unwrap(), Some(json!(42)));
    assert_eq!(apply(Filter::ToNumber, json!("1.5"), &[]).unwrap(), Some(json!(1.5)));
    assert_eq!(apply(Filter::ToNumber, json!(true), &[]).unwrap(), Some(json!(1)));
    assert!(apply(Filter::ToNumber, json!("n/a"), &[]).is_err());
    assert_eq!(apply(Filter::Stringify, json!([1]), &[]).unwrap(), Some(json!("[1]")));
    assert_eq!(apply(Filter::Stringify, json!("x"), &[]).unwrap(), Some(json!("x")));
  }

  #[test]
  fn test_keys_of_object() {
    assert_eq!(
      apply(Filter::Keys, json!({"a": 1, "b": 2}), &[]).unwrap(),
      Some(json!(["a", "b"]))
    );
  }

  #[test]
  fn test_case_and_trim() {
    assert_eq!(apply(Filter::Upper, json!("eth0"), &[]).unwrap(), Some(json!("ETH0")));
    assert_eq!(apply(Filter::Lower, json!("UP"), &[]).unwrap(), Some(json!("up")));
    assert_eq!(apply(Filter::Trim, json!("  x "), &[]).unwrap(), Some(json!("x")));
    assert!(apply(Filter::Trim, json!(1), &[]).is_err());
  }
}
