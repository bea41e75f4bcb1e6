use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::graph::Graph;
use crate::workflow::Workflow;

/// Nodes that may run concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Level {
  pub index: usize,
  pub nodes: Vec<String>,
}

/// Execution order for one scope: the whole workflow or a loop body.
///
/// A loop header and its whole body share the header's level. Each header in
/// scope carries its own plan for the body in [`Plan::loop_plan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
  levels: Vec<Level>,
  loops: BTreeMap<String, Plan>,
  #[serde(skip)]
  level_of: HashMap<String, usize>,
}

/// Layer `workflow` into levels by longest path from the start node.
pub fn plan(workflow: &Workflow) -> Plan {
  let plan = Plan::for_scope(workflow, None);
  debug!(
    workflow_id = %workflow.id(),
    levels = plan.total_levels(),
    loops = plan.loops.len(),
    "planned workflow"
  );
  plan
}

impl Plan {
  fn for_scope(workflow: &Workflow, scope: Option<&str>) -> Self {
    let graph = workflow.graph();
    let members: Vec<&str> = workflow
      .node_ids()
      .iter()
      .map(String::as_str)
      .filter(|id| graph.enclosing_loop(id) == scope)
      .collect();
    let member_set: HashSet<&str> = members.iter().copied().collect();

    // Edges between members, with nested nodes folded into their header.
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = members.iter().map(|id| (*id, 0)).collect();
    let mut seen_pairs: HashSet<(&str, &str)> = HashSet::new();
    for edge in graph.edges() {
      if graph.is_back_edge(&edge.id) {
        continue;
      }
      let (Some(source), Some(target)) = (
        representative(graph, &edge.source, scope),
        representative(graph, &edge.target, scope),
      ) else {
        continue;
      };
      if source == target || !member_set.contains(source) || !member_set.contains(target) {
        continue;
      }
      if seen_pairs.insert((source, target)) {
        successors.entry(source).or_default().push(target);
        *in_degree.entry(target).or_default() += 1;
      }
    }

    // Kahn's algorithm, tracking the longest path to each node.
    let mut depth: HashMap<&str, usize> = members.iter().map(|id| (*id, 0)).collect();
    let mut ready: Vec<&str> = members
      .iter()
      .copied()
      .filter(|id| in_degree.get(id).copied().unwrap_or(0) == 0)
      .collect();
    let mut visited = 0;
    while let Some(node) = ready.pop() {
      visited += 1;
      let node_depth = depth.get(node).copied().unwrap_or(0);
      for &next in successors.get(node).into_iter().flatten() {
        let entry = depth.entry(next).or_default();
        *entry = (*entry).max(node_depth + 1);
        if let Some(degree) = in_degree.get_mut(next) {
          *degree -= 1;
          if *degree == 0 {
            ready.push(next);
          }
        }
      }
    }
    debug_assert_eq!(visited, members.len(), "validated workflows are acyclic");

    let mut levels: Vec<Level> = Vec::new();
    let mut level_of = HashMap::new();
    for id in &members {
      let index = depth.get(id).copied().unwrap_or(0);
      while levels.len() <= index {
        levels.push(Level {
          index: levels.len(),
          nodes: Vec::new(),
        });
      }
      levels[index].nodes.push(id.to_string());
      level_of.insert(id.to_string(), index);
    }

    let loops = members
      .iter()
      .filter(|id| graph.is_loop_header(id))
      .map(|header| (header.to_string(), Self::for_scope(workflow, Some(header))))
      .collect();

    Self {
      levels,
      loops,
      level_of,
    }
  }

  /// Levels of this scope in execution order.
  pub fn levels(&self) -> &[Level] {
    &self.levels
  }

  /// Number of levels in this scope, nested loop bodies not counted.
  pub fn total_levels(&self) -> usize {
    self.levels.len()
  }

  /// Index of the level holding `node_id` in this scope.
  pub fn level_of(&self, node_id: &str) -> Option<usize> {
    self.level_of.get(node_id).copied()
  }

  /// Sub-plan re-entered once per iteration of `header`.
  pub fn loop_plan(&self, header: &str) -> Option<&Plan> {
    self.loops.get(header)
  }
}

/// The node standing for `node_id` within `scope`: itself if it belongs to the
/// scope directly, else the outermost header inside the scope that encloses it.
/// `None` when `node_id` lies outside the scope.
fn representative<'a>(graph: &'a Graph, node_id: &'a str, scope: Option<&str>) -> Option<&'a str> {
  let mut current = node_id;
  loop {
    let parent = graph.enclosing_loop(current);
    if parent == scope {
      return Some(current);
    }
    current = parent?;
  }
}
