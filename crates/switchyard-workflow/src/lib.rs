//! Switchyard workflow
//!
//! Turns a [`WorkflowDef`](switchyard_config::WorkflowDef) into a validated
//! [`Workflow`]: every node bound to its block definition, parameters checked
//! into typed bags, edges resolved to channels and loop bodies identified.
//! [`plan`] then layers the graph into levels the engine runs one at a time.

mod error;
mod graph;
mod node;
mod schedule;
mod workflow;

pub use error::{ParameterError, ValidationError, ValidationErrors};
pub use graph::{Edge, Graph, LoopBody};
pub use node::{BoundParameter, Node, ParameterBag, REDACTED};
pub use schedule::{Level, Plan, plan};
pub use workflow::Workflow;
