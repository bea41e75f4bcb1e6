use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::block::BlockDefinition;
use crate::error::CatalogError;

/// On-disk form of a catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
  pub version: String,
  #[serde(default)]
  pub blocks: Vec<BlockDefinition>,
}

/// Read-only registry of block definitions keyed by block type.
#[derive(Debug, Clone, Default)]
pub struct BlockCatalog {
  version: String,
  blocks: HashMap<String, Arc<BlockDefinition>>,
}

impl BlockCatalog {
  pub fn new(version: impl Into<String>) -> Self {
    Self {
      version: version.into(),
      blocks: HashMap::new(),
    }
  }

  /// The table shipped with this release.
  pub fn builtin() -> Self {
    crate::builtin::catalog()
  }

  pub fn from_document(document: CatalogDocument) -> Result<Self, CatalogError> {
    let mut catalog = Self::new(document.version);
    for mut block in document.blocks {
      block.fill_default_ports();
      catalog.register(block)?;
    }
    Ok(catalog)
  }

  pub fn from_json(json: &str) -> Result<Self, CatalogError> {
    Self::from_document(serde_json::from_str(json)?)
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
    let contents = std::fs::read_to_string(path)?;
    Self::from_json(&contents)
  }

  /// Add a definition. Only used while the catalog is being assembled.
  pub fn register(&mut self, definition: BlockDefinition) -> Result<(), CatalogError> {
    definition.validate()?;
    if self.blocks.contains_key(&definition.block_type) {
      return Err(CatalogError::Duplicate {
        block_type: definition.block_type,
      });
    }
    self
      .blocks
      .insert(definition.block_type.clone(), Arc::new(definition));
    Ok(())
  }

  /// Insert a definition known to be valid, replacing any previous one.
  pub(crate) fn insert_trusted(&mut self, definition: BlockDefinition) {
    self
      .blocks
      .insert(definition.block_type.clone(), Arc::new(definition));
  }

  pub fn lookup(&self, block_type: &str) -> Result<&Arc<BlockDefinition>, CatalogError> {
    self.blocks.get(block_type).ok_or_else(|| CatalogError::NotFound {
      block_type: block_type.to_string(),
    })
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn len(&self) -> usize {
    self.blocks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.blocks.is_empty()
  }

  /// Definitions sorted by block type.
  pub fn blocks(&self) -> Vec<&Arc<BlockDefinition>> {
    let mut blocks: Vec<_> = self.blocks.values().collect();
    blocks.sort_by(|a, b| a.block_type.cmp(&b.block_type));
    blocks
  }

  pub fn to_document(&self) -> CatalogDocument {
    CatalogDocument {
      version: self.version.clone(),
      blocks: self.blocks().into_iter().map(|b| b.as_ref().clone()).collect(),
    }
  }
}
