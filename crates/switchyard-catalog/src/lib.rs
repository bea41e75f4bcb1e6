//! Switchyard block catalog
//!
//! Every node in a workflow names a block type. The catalog maps those names to
//! immutable [`BlockDefinition`]s carrying the block's kind (which decides who
//! executes it and which channels it may fire), its output and input ports and
//! the [`ParameterSpec`]s its parameters are checked against.
//!
//! The catalog is read-only once constructed. It ships with a built-in,
//! versioned table and can also be loaded from a JSON document.

mod block;
mod builtin;
mod catalog;
mod channel;
mod error;
mod parameter;

pub use block::{BlockDefinition, BlockKind, Port};
pub use builtin::BUILTIN_VERSION;
pub use catalog::{BlockCatalog, CatalogDocument};
pub use channel::{Channel, INPUT_PORT, LOOP_BACK_PORT};
pub use error::CatalogError;
pub use parameter::{ParameterKind, ParameterSpec, type_name};
