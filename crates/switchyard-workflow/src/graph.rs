use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use switchyard_catalog::Channel;

use crate::error::ValidationError;

/// An edge with its source channel resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
  pub id: String,
  pub source: String,
  pub source_channel: Channel,
  pub target: String,
  pub target_channel: String,
}

/// Nodes a loop header re-runs once per item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopBody {
  pub header: String,
  pub nodes: BTreeSet<String>,
  /// Edge ids running from a body node back into the header.
  pub back_edges: Vec<String>,
}

impl LoopBody {
  pub fn contains(&self, node_id: &str) -> bool {
    self.nodes.contains(node_id)
  }
}

/// Graph structure for traversal and analysis.
///
/// Loop back-edges are kept in [`Graph::edges`] but hidden from
/// [`Graph::incoming`] and [`Graph::outgoing`], so everything built on those
/// sees an acyclic graph.
#[derive(Debug, Clone)]
pub struct Graph {
  edges: Vec<Edge>,
  /// node_id -> indices of edges leaving it.
  outgoing: HashMap<String, Vec<usize>>,
  /// node_id -> indices of edges entering it.
  incoming: HashMap<String, Vec<usize>>,
  back_edges: HashSet<usize>,
  start: String,
  loops: HashMap<String, LoopBody>,
  /// body node -> header of the innermost loop containing it.
  enclosing: HashMap<String, String>,
}

impl Graph {
  /// Index `edges`, identify loop bodies and check the structure.
  ///
  /// `node_ids` is in definition order, which keeps reported errors stable.
  pub(crate) fn build(
    node_ids: &[String],
    edges: Vec<Edge>,
    start: &str,
    loop_headers: &[String],
  ) -> Result<Self, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut outgoing: HashMap<String, Vec<usize>> = HashMap::new();
    let mut incoming: HashMap<String, Vec<usize>> = HashMap::new();
    for id in node_ids {
      outgoing.entry(id.clone()).or_default();
      incoming.entry(id.clone()).or_default();
    }
    for (index, edge) in edges.iter().enumerate() {
      outgoing.entry(edge.source.clone()).or_default().push(index);
      incoming.entry(edge.target.clone()).or_default().push(index);
    }

    if incoming.get(start).is_some_and(|v| !v.is_empty()) {
      errors.push(ValidationError::StartHasInbound {
        node_id: start.to_string(),
      });
    }
    for id in node_ids {
      if id != start && incoming.get(id).is_none_or(|v| v.is_empty()) {
        errors.push(ValidationError::Orphan { node_id: id.clone() });
      }
    }

    let mut graph = Self {
      edges,
      outgoing,
      incoming,
      back_edges: HashSet::new(),
      start: start.to_string(),
      loops: HashMap::new(),
      enclosing: HashMap::new(),
    };

    for header in loop_headers {
      let body = graph.loop_body_of(header, &mut errors);
      graph.loops.insert(header.clone(), body);
    }
    graph.check_loop_exits(loop_headers, &mut errors);
    graph.assign_enclosing();

    let back_ids: HashSet<&str> = graph
      .loops
      .values()
      .flat_map(|body| body.back_edges.iter().map(String::as_str))
      .collect();
    let back_edges: HashSet<usize> = graph
      .edges
      .iter()
      .enumerate()
      .filter(|(_, e)| back_ids.contains(e.id.as_str()))
      .map(|(i, _)| i)
      .collect();
    graph.back_edges = back_edges;

    if let Some(node_id) = graph.find_cycle(node_ids) {
      errors.push(ValidationError::Cycle { node_id });
    }

    if errors.is_empty() { Ok(graph) } else { Err(errors) }
  }

  /// Body of `header`: nodes reached from its `iteration` edges without passing
  /// through the header, minus anything the rest of the graph reaches without
  /// those edges.
  fn loop_body_of(&self, header: &str, errors: &mut Vec<ValidationError>) -> LoopBody {
    let is_iteration = |e: &Edge| e.source == header && e.source_channel == Channel::Iteration;
    let entries: Vec<&str> = self
      .edges
      .iter()
      .filter(|e| is_iteration(e))
      .map(|e| e.target.as_str())
      .collect();

    let forward = self.reach(&entries, Some(header), |_| true);
    let outside = self.reach(&[self.start.as_str()], None, |e| !is_iteration(e));
    let nodes: BTreeSet<String> = forward
      .into_iter()
      .filter(|n| !outside.contains(n) && n != header)
      .collect();

    for entry in &entries {
      if *entry != header && !nodes.contains(*entry) {
        errors.push(ValidationError::LoopEntry {
          header: header.to_string(),
          node_id: entry.to_string(),
        });
      }
    }

    let back_edges = self
      .edges
      .iter()
      .filter(|e| e.target == header && (nodes.contains(&e.source) || e.source == header))
      .filter(|e| !(e.source == header && e.source_channel != Channel::Iteration))
      .map(|e| e.id.clone())
      .collect();

    LoopBody {
      header: header.to_string(),
      nodes,
      back_edges,
    }
  }

  /// A body node may only lead to other nodes of the same body or back to its
  /// header.
  fn check_loop_exits(&self, loop_headers: &[String], errors: &mut Vec<ValidationError>) {
    for header in loop_headers {
      let Some(body) = self.loops.get(header) else {
        continue;
      };
      for node in &body.nodes {
        for edge in self.edges_from(node) {
          if edge.target != *header && !body.contains(&edge.target) {
            errors.push(ValidationError::LoopExit {
              header: header.clone(),
              edge_id: edge.id.clone(),
            });
          }
        }
      }
    }
  }

  fn assign_enclosing(&mut self) {
    let mut enclosing: HashMap<String, (usize, String)> = HashMap::new();
    for (header, body) in &self.loops {
      for node in &body.nodes {
        let size = body.nodes.len();
        let replace = enclosing.get(node).is_none_or(|(current, _)| size < *current);
        if replace {
          enclosing.insert(node.clone(), (size, header.clone()));
        }
      }
    }
    self.enclosing = enclosing.into_iter().map(|(n, (_, h))| (n, h)).collect();
  }

  /// Nodes reachable from `seeds` over edges accepted by `follow`, never
  /// entering `barrier`.
  fn reach<'a>(
    &'a self,
    seeds: &[&'a str],
    barrier: Option<&str>,
    follow: impl Fn(&Edge) -> bool,
  ) -> HashSet<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<&'a str> = VecDeque::new();
    for &seed in seeds {
      if Some(seed) != barrier && seen.insert(seed.to_string()) {
        queue.push_back(seed);
      }
    }
    while let Some(node) = queue.pop_front() {
      for edge in self.edges_from(node) {
        if !follow(edge) || Some(edge.target.as_str()) == barrier {
          continue;
        }
        if seen.insert(edge.target.clone()) {
          queue.push_back(&edge.target);
        }
      }
    }
    seen
  }

  /// DFS with coloring over non-back edges. Returns a node on a cycle.
  fn find_cycle(&self, node_ids: &[String]) -> Option<String> {
    // 0 = unvisited, 1 = in progress, 2 = done
    let mut color: HashMap<&str, u8> = node_ids.iter().map(|id| (id.as_str(), 0u8)).collect();

    fn dfs<'a>(graph: &'a Graph, node: &'a str, color: &mut HashMap<&'a str, u8>) -> Option<&'a str> {
      color.insert(node, 1);
      for edge in graph.outgoing(node) {
        match color.get(edge.target.as_str()) {
          Some(1) => return Some(edge.target.as_str()),
          Some(0) => {
            if let Some(found) = dfs(graph, &edge.target, color) {
              return Some(found);
            }
          }
          _ => {}
        }
      }
      color.insert(node, 2);
      None
    }

    for id in node_ids {
      if color.get(id.as_str()) == Some(&0) {
        if let Some(found) = dfs(self, id, &mut color) {
          return Some(found.to_string());
        }
      }
    }
    None
  }

  fn edges_from<'a>(&'a self, node_id: &str) -> impl Iterator<Item = &'a Edge> + use<'a> {
    self
      .outgoing
      .get(node_id)
      .into_iter()
      .flatten()
      .map(|&i| &self.edges[i])
  }

  pub fn start_node(&self) -> &str {
    &self.start
  }

  /// All edges, back-edges included.
  pub fn edges(&self) -> &[Edge] {
    &self.edges
  }

  pub fn is_back_edge(&self, edge_id: &str) -> bool {
    self
      .back_edges
      .iter()
      .any(|&i| self.edges[i].id == edge_id)
  }

  /// Non-back edges entering `node_id`.
  pub fn incoming<'a>(&'a self, node_id: &str) -> impl Iterator<Item = &'a Edge> + use<'a> {
    self
      .incoming
      .get(node_id)
      .into_iter()
      .flatten()
      .filter(|&&i| !self.back_edges.contains(&i))
      .map(|&i| &self.edges[i])
  }

  /// Non-back edges leaving `node_id`.
  pub fn outgoing<'a>(&'a self, node_id: &str) -> impl Iterator<Item = &'a Edge> + use<'a> {
    self
      .outgoing
      .get(node_id)
      .into_iter()
      .flatten()
      .filter(|&&i| !self.back_edges.contains(&i))
      .map(|&i| &self.edges[i])
  }

  pub fn predecessors_by_channel(&self, node_id: &str) -> BTreeMap<Channel, Vec<&str>> {
    let mut by_channel: BTreeMap<Channel, Vec<&str>> = BTreeMap::new();
    for edge in self.incoming(node_id) {
      by_channel
        .entry(edge.source_channel)
        .or_default()
        .push(edge.source.as_str());
    }
    by_channel
  }

  pub fn successors_by_channel(&self, node_id: &str, channel: Channel) -> Vec<&str> {
    self
      .outgoing(node_id)
      .filter(|e| e.source_channel == channel)
      .map(|e| e.target.as_str())
      .collect()
  }

  /// Whether any non-back edge leaves `node_id` on `channel`.
  pub fn has_outgoing(&self, node_id: &str, channel: Channel) -> bool {
    self.outgoing(node_id).any(|e| e.source_channel == channel)
  }

  /// Whether any edge leaves `node_id` on `channel`, back-edges included.
  /// A `fail` edge straight back into a loop header still counts as wired.
  pub fn has_wired(&self, node_id: &str, channel: Channel) -> bool {
    self.edges_from(node_id).any(|e| e.source_channel == channel)
  }

  pub fn is_loop_header(&self, node_id: &str) -> bool {
    self.loops.contains_key(node_id)
  }

  pub fn loop_body(&self, header: &str) -> Option<&LoopBody> {
    self.loops.get(header)
  }

  /// Header of the innermost loop whose body contains `node_id`.
  pub fn enclosing_loop(&self, node_id: &str) -> Option<&str> {
    self.enclosing.get(node_id).map(String::as_str)
  }
}
