//! Per-node parameter export and import.
//!
//! An export carries only what an operator tunes between environments: the
//! parameters of each node, keyed by node id, block type and label. Importing
//! applies those parameters onto a workflow whose structure may have drifted.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::workflow::WorkflowDef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigExport {
  pub workflow_name: String,
  pub workflow_id: String,
  #[serde(default)]
  pub blocks: Vec<BlockConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockConfig {
  pub node_id: String,
  pub block_type: String,
  #[serde(default)]
  pub label: String,
  #[serde(default)]
  pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
  pub updated: usize,
  pub skipped: usize,
}

impl ConfigExport {
  pub fn from_workflow(workflow: &WorkflowDef) -> Self {
    Self {
      workflow_name: workflow.name.clone(),
      workflow_id: workflow.id.clone(),
      blocks: workflow
        .nodes
        .iter()
        .map(|node| BlockConfig {
          node_id: node.id.clone(),
          block_type: node.block_type.clone(),
          label: node.label.clone(),
          parameters: node.parameters.clone(),
        })
        .collect(),
    }
  }

  /// Apply exported parameters onto `workflow`.
  ///
  /// Entries are matched by node id (with the same block type) first, so a
  /// node whose type changed under the same id never takes the old block's
  /// parameters. Entries left over are then matched by `(blockType, label)`
  /// against nodes not yet claimed, one to one in document order. Matched parameters overwrite the
  /// node's keys; keys absent from the export are kept.
  pub fn apply_to(&self, workflow: &mut WorkflowDef) -> ImportReport {
    let mut claimed: HashSet<usize> = HashSet::new();
    let mut matches: Vec<(usize, &BlockConfig)> = Vec::new();
    let mut leftover: Vec<&BlockConfig> = Vec::new();

    for block in &self.blocks {
      let by_id = workflow.nodes.iter().position(|n| {
        n.id == block.node_id && n.block_type == block.block_type
      });
      match by_id {
        Some(index) if claimed.insert(index) => matches.push((index, block)),
        _ => leftover.push(block),
      }
    }

    let mut skipped = 0;
    for block in leftover {
      let by_label = workflow.nodes.iter().enumerate().position(|(index, n)| {
        !claimed.contains(&index) && n.block_type == block.block_type && n.label == block.label
      });
      match by_label {
        Some(index) => {
          claimed.insert(index);
          matches.push((index, block));
        }
        None => skipped += 1,
      }
    }

    let updated = matches.len();
    for (index, block) in matches {
      let node = &mut workflow.nodes[index];
      for (key, value) in &block.parameters {
        node.parameters.insert(key.clone(), value.clone());
      }
    }

    ImportReport { updated, skipped }
  }
}
