use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};
use switchyard_catalog::{BlockCatalog, BlockKind, Channel, ParameterKind};
use switchyard_config::{VariableDef, VariableType, WorkflowDef};

use crate::error::{ValidationError, ValidationErrors};
use crate::graph::{Edge, Graph};
use crate::node::{Node, ParameterBag};

/// A validated workflow ready for planning and execution.
#[derive(Debug, Clone)]
pub struct Workflow {
  id: String,
  name: String,
  /// Node ids in definition order.
  order: Vec<String>,
  nodes: HashMap<String, Node>,
  graph: Graph,
  variable_defs: Vec<VariableDef>,
  variables: Map<String, Value>,
}

impl Workflow {
  /// Validate `def` against `catalog`, collecting every error found.
  ///
  /// Node, edge, parameter and variable problems are all reported together.
  /// Structural checks (orphans, loops, cycles) only run once every edge
  /// resolves, since they need a sound edge set.
  pub fn build(def: &WorkflowDef, catalog: &BlockCatalog) -> Result<Self, ValidationErrors> {
    let mut errors = Vec::new();
    let declared: HashSet<&str> = def.nodes.iter().map(|n| n.id.as_str()).collect();

    let mut nodes: HashMap<String, Node> = HashMap::new();
    let mut order = Vec::new();
    for node_def in &def.nodes {
      if nodes.contains_key(&node_def.id) || order.contains(&node_def.id) {
        errors.push(ValidationError::DuplicateNode {
          node_id: node_def.id.clone(),
        });
        continue;
      }
      order.push(node_def.id.clone());
      match catalog.lookup(&node_def.block_type) {
        Ok(block) => {
          let parameters = ParameterBag::bind(&node_def.id, block, &node_def.parameters, &mut errors);
          nodes.insert(
            node_def.id.clone(),
            Node {
              id: node_def.id.clone(),
              label: node_def.label.clone(),
              block: block.clone(),
              parameters,
            },
          );
        }
        Err(_) => errors.push(ValidationError::UnknownBlockType {
          node_id: node_def.id.clone(),
          block_type: node_def.block_type.clone(),
        }),
      }
    }

    let starts: Vec<String> = order
      .iter()
      .filter(|id| nodes.get(*id).is_some_and(|n| n.kind() == BlockKind::Start))
      .cloned()
      .collect();
    match starts.len() {
      0 => errors.push(ValidationError::NoStartNode),
      1 => {}
      _ => errors.push(ValidationError::MultipleStartNodes {
        node_ids: starts.clone(),
      }),
    }

    let mut edge_ids = HashSet::new();
    let mut edges = Vec::with_capacity(def.edges.len());
    let mut edges_sound = true;
    for edge_def in &def.edges {
      if !edge_ids.insert(edge_def.id.as_str()) {
        errors.push(ValidationError::DuplicateEdge {
          edge_id: edge_def.id.clone(),
        });
        edges_sound = false;
        continue;
      }
      let mut endpoints_known = true;
      for endpoint in [&edge_def.source, &edge_def.target] {
        if !declared.contains(endpoint.as_str()) {
          errors.push(ValidationError::DanglingEdge {
            edge_id: edge_def.id.clone(),
            node_id: endpoint.clone(),
          });
          endpoints_known = false;
        }
      }
      let (Some(source), Some(target)) = (nodes.get(&edge_def.source), nodes.get(&edge_def.target)) else {
        edges_sound = false;
        continue;
      };
      if !endpoints_known {
        edges_sound = false;
        continue;
      }

      let channel = Channel::parse(&edge_def.source_channel).filter(|c| source.block.declares(*c));
      let Some(channel) = channel else {
        errors.push(ValidationError::UnknownChannel {
          edge_id: edge_def.id.clone(),
          node_id: source.id.clone(),
          channel: edge_def.source_channel.clone(),
        });
        edges_sound = false;
        continue;
      };
      if target.kind() == BlockKind::Start {
        let error = ValidationError::StartHasInbound {
          node_id: target.id.clone(),
        };
        if !errors.contains(&error) {
          errors.push(error);
        }
        edges_sound = false;
        continue;
      }
      if !target.block.accepts_input(&edge_def.target_channel) {
        errors.push(ValidationError::UnknownInput {
          edge_id: edge_def.id.clone(),
          node_id: target.id.clone(),
          port: edge_def.target_channel.clone(),
        });
        edges_sound = false;
        continue;
      }

      edges.push(Edge {
        id: edge_def.id.clone(),
        source: source.id.clone(),
        source_channel: channel,
        target: target.id.clone(),
        target_channel: edge_def.target_channel.clone(),
      });
    }

    for id in &order {
      let Some(node) = nodes.get(id) else { continue };
      for (parameter, referenced) in node.parameters.node_references() {
        if !declared.contains(referenced) {
          errors.push(ValidationError::UnknownReference {
            node_id: id.clone(),
            parameter: parameter.to_string(),
            referenced: referenced.to_string(),
          });
        }
      }
    }

    let mut variables = Map::new();
    for variable in &def.variables {
      match coerce_variable(variable.var_type, &variable.default) {
        Ok(value) => {
          variables.insert(variable.name.clone(), value);
        }
        Err(message) => errors.push(ValidationError::InvalidVariable {
          name: variable.name.clone(),
          message,
        }),
      }
    }

    let structure_checkable = edges_sound && starts.len() == 1 && nodes.len() == order.len();
    if !structure_checkable {
      return Err(ValidationErrors(errors));
    }

    let loop_headers: Vec<String> = order
      .iter()
      .filter(|id| nodes.get(*id).is_some_and(|n| n.kind() == BlockKind::Loop))
      .cloned()
      .collect();
    let graph = match Graph::build(&order, edges, &starts[0], &loop_headers) {
      Ok(graph) => Some(graph),
      Err(structural) => {
        errors.extend(structural);
        None
      }
    };

    match graph {
      Some(graph) if errors.is_empty() => Ok(Self {
        id: def.id.clone(),
        name: def.name.clone(),
        order,
        nodes,
        graph,
        variable_defs: def.variables.clone(),
        variables,
      }),
      _ => Err(ValidationErrors(errors)),
    }
  }

  /// Id of the source definition.
  pub fn id(&self) -> &str {
    &self.id
  }

  /// Display name of the source definition.
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Built node by id.
  pub fn node(&self, node_id: &str) -> Option<&Node> {
    self.nodes.get(node_id)
  }

  /// Node ids in definition order.
  pub fn node_ids(&self) -> &[String] {
    &self.order
  }

  /// Nodes in definition order.
  pub fn nodes(&self) -> impl Iterator<Item = &Node> {
    self.order.iter().filter_map(|id| self.nodes.get(id))
  }

  pub fn len(&self) -> usize {
    self.order.len()
  }

  pub fn is_empty(&self) -> bool {
    self.order.is_empty()
  }

  /// Validated edge set.
  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  /// Declared variables with their coerced defaults.
  pub fn variables(&self) -> &Map<String, Value> {
    &self.variables
  }

  /// Variables for one run: defaults overlaid with `overrides`, each coerced
  /// to its declared type.
  pub fn bind_variables(&self, overrides: &Map<String, Value>) -> Result<Map<String, Value>, ValidationError> {
    let mut bound = self.variables.clone();
    for (name, value) in overrides {
      let Some(def) = self.variable_defs.iter().find(|v| &v.name == name) else {
        return Err(ValidationError::InvalidVariable {
          name: name.clone(),
          message: "not declared by the workflow".to_string(),
        });
      };
      let coerced = coerce_variable(def.var_type, value).map_err(|message| ValidationError::InvalidVariable {
        name: name.clone(),
        message,
      })?;
      bound.insert(name.clone(), coerced);
    }
    Ok(bound)
  }
}

fn coerce_variable(var_type: VariableType, value: &Value) -> Result<Value, String> {
  if value.is_null() {
    return Ok(Value::Null);
  }
  match var_type {
    VariableType::String => ParameterKind::String.coerce(value, &[]),
    VariableType::Number => ParameterKind::Number.coerce(value, &[]),
    VariableType::Boolean => ParameterKind::Boolean.coerce(value, &[]),
    VariableType::Any => ParameterKind::Json.coerce(value, &[]),
    VariableType::Array => match ParameterKind::Json.coerce(value, &[])? {
      array @ Value::Array(_) => Ok(array),
      other => Err(format!("expected array, got {}", switchyard_catalog::type_name(&other))),
    },
    VariableType::Object => match ParameterKind::Json.coerce(value, &[])? {
      object @ Value::Object(_) => Ok(object),
      other => Err(format!("expected object, got {}", switchyard_catalog::type_name(&other))),
    },
  }
}
