use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
  #[error("block type not found: {block_type}")]
  NotFound { block_type: String },

  #[error("block type registered twice: {block_type}")]
  Duplicate { block_type: String },

  #[error("invalid definition for block '{block_type}': {message}")]
  InvalidDefinition { block_type: String, message: String },

  #[error("failed to read catalog: {0}")]
  Io(#[from] std::io::Error),

  #[error("failed to parse catalog: {0}")]
  Parse(#[from] serde_json::Error),
}
