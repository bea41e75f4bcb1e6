//! Switchyard templates
//!
//! Node parameters may embed `{{ ... }}` spans that read data produced earlier
//! in a run:
//!
//! ```text
//! {{ $prev.latencyMs }}                   output of the node that activated this one
//! {{ $node.dns-1.addresses | first }}     output of any settled node
//! {{ $loop.item | default('none') }}      current item of the innermost loop
//! {{ $vars.gateway }}                     workflow variable
//! ```
//!
//! A value that is exactly one span keeps the resolved type, so
//! `"{{ $node.scan.ports }}"` yields an array. Text mixed with spans always
//! yields a string. Templates are parsed once, when a workflow is built, and
//! rendered against a [`ResolutionContext`] for every dispatch.

mod ast;
mod context;
mod error;
mod filters;
mod parser;
mod template;
mod value;

pub use ast::{Accessor, Root};
pub use context::{LoopFrame, NodeOutputs, ResolutionContext};
pub use error::ResolutionError;
pub use filters::Filter;
pub use template::{Template, resolve, stringify};
pub use value::{TemplateValue, resolve_value};
