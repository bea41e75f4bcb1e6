//! Switchyard Config
//!
//! This crate contains the serializable workflow configuration types for Switchyard.
//! These types represent workflow definitions as the editor saves them, before they
//! are validated against the block catalog and compiled by the engine.
//!
//! Configuration can be loaded from:
//! - JSON files (via CLI with `switchyard run workflow.json`)
//! - Config exports carrying only per-node parameters
//!
//! The workflow crate takes these types, checks them against block definitions,
//! and builds the typed graph the engine executes.

mod edge;
mod export;
mod node;
mod variable;
mod workflow;

pub use edge::EdgeDef;
pub use export::{BlockConfig, ConfigExport, ImportReport};
pub use node::NodeDef;
pub use variable::{VariableDef, VariableType};
pub use workflow::WorkflowDef;
