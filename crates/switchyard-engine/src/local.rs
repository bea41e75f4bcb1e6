//! Blocks the engine evaluates itself.

use std::cmp::Ordering;

use serde_json::{Map, Value, json};
use switchyard_catalog::type_name;

use crate::executor::BlockOutcome;

/// `variable-set`: emits `{name: value}`.
pub(crate) fn variable_set(parameters: &Map<String, Value>) -> BlockOutcome {
  let Some(name) = parameters.get("name").and_then(Value::as_str) else {
    return BlockOutcome::Fail("variable name is missing".to_string());
  };
  let value = parameters.get("value").cloned().unwrap_or(Value::Null);
  let mut output = Map::new();
  output.insert(name.to_string(), value);
  BlockOutcome::Emit(Value::Object(output))
}

/// `compare`: `pass` when the comparison holds, `fail` otherwise.
pub(crate) fn compare(parameters: &Map<String, Value>) -> BlockOutcome {
  let left = parameters.get("left").unwrap_or(&Value::Null);
  let right = parameters.get("right").unwrap_or(&Value::Null);
  let operator = parameters
    .get("operator")
    .and_then(Value::as_str)
    .unwrap_or("equals");

  let held = match operator {
    "equals" => Ok(loose_eq(left, right)),
    "notEquals" => Ok(!loose_eq(left, right)),
    "greaterThan" => order(left, right).map(|o| o == Ordering::Greater),
    "lessThan" => order(left, right).map(|o| o == Ordering::Less),
    "greaterOrEqual" => order(left, right).map(|o| o != Ordering::Less),
    "lessOrEqual" => order(left, right).map(|o| o != Ordering::Greater),
    "contains" => contains(left, right),
    "truthy" => Ok(truthy(left)),
    other => Err(format!("unknown operator '{other}'")),
  };

  match held {
    Ok(true) => BlockOutcome::Pass(json!({
      "result": true,
      "operator": operator,
      "left": left,
      "right": right,
    })),
    Ok(false) => BlockOutcome::Fail(format!("comparison '{operator}' did not hold")),
    Err(message) => BlockOutcome::Fail(message),
  }
}

/// Items a loop header iterates, from `items` (array mode) or `count`.
pub(crate) fn loop_items(parameters: &Map<String, Value>, limit: usize) -> Result<Vec<Value>, String> {
  let mode = parameters.get("mode").and_then(Value::as_str).unwrap_or("array");
  let items = match mode {
    "array" => match parameters.get("items") {
      Some(Value::Array(items)) => items.clone(),
      Some(other) => return Err(format!("loop items must be an array, got {}", type_name(other))),
      None => return Err("loop items are missing".to_string()),
    },
    "count" => {
      let count = parameters
        .get("count")
        .and_then(Value::as_f64)
        .ok_or_else(|| "loop count is missing".to_string())?;
      if count < 0.0 || count.fract() != 0.0 {
        return Err(format!("loop count must be a non-negative integer, got {count}"));
      }
      let count = count as usize;
      if count > limit {
        return Err(format!("loop would run {count} iterations, limit is {limit}"));
      }
      (0..count).map(|i| json!(i)).collect()
    }
    other => return Err(format!("unknown loop mode '{other}'")),
  };

  if items.len() > limit {
    return Err(format!("loop would run {} iterations, limit is {limit}", items.len()));
  }
  Ok(items)
}

fn as_number(value: &Value) -> Option<f64> {
  match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
  if left == right {
    return true;
  }
  match (left, right) {
    (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) | (Value::Number(_), Value::Number(_)) => {
      matches!((as_number(left), as_number(right)), (Some(a), Some(b)) if a == b)
    }
    _ => false,
  }
}

fn order(left: &Value, right: &Value) -> Result<Ordering, String> {
  if let (Some(a), Some(b)) = (as_number(left), as_number(right)) {
    return a
      .partial_cmp(&b)
      .ok_or_else(|| format!("cannot order {a} and {b}"));
  }
  match (left, right) {
    (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
    _ => Err(format!("cannot order {} and {}", type_name(left), type_name(right))),
  }
}

fn contains(haystack: &Value, needle: &Value) -> Result<bool, String> {
  match haystack {
    Value::String(s) => Ok(s.contains(&switchyard_template::stringify(Some(needle)))),
    Value::Array(items) => Ok(items.iter().any(|item| loose_eq(item, needle))),
    Value::Object(map) => Ok(map.contains_key(&switchyard_template::stringify(Some(needle)))),
    other => Err(format!("cannot search in {}", type_name(other))),
  }
}

fn truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
    Value::String(s) => !s.is_empty(),
    Value::Array(items) => !items.is_empty(),
    Value::Object(map) => !map.is_empty(),
  }
}
