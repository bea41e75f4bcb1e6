//! Switchyard execution engine
//!
//! Runs a validated workflow level by level against a block executor.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        RunController                         │
//! │  - registry of compiled workflows and live runs              │
//! │  - start / pause / resume / cancel / wait                    │
//! └──────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Engine                             │
//! │  - launch(workflow, vars, control) → RunHandle               │
//! │  - walks the plan, resolves templates, settles channels      │
//! │  - RunRecorder: state snapshots + bounded event log          │
//! └──────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        BlockExecutor                         │
//! │  - HttpExecutor: POST {baseUrl}/execute                      │
//! │  - DryRunExecutor: echoes parameters                         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let compiled = Arc::new(CompiledWorkflow::compile(&definition, &BlockCatalog::builtin())?);
//! let executor = Arc::new(HttpExecutor::new(&HttpExecutorConfig::new("http://executor:8080"))?);
//! let engine = Engine::new(executor, EngineConfig::default());
//!
//! let handle = engine.launch(compiled, &Map::new(), RunControl::new())?;
//! let mut snapshots = handle.subscribe();
//! let state = handle.wait().await?;
//! ```

mod config;
mod control;
mod controller;
mod engine;
mod error;
mod events;
mod executor;
mod http;
mod local;
mod recorder;
mod state;

pub use config::EngineConfig;
pub use control::RunControl;
pub use controller::RunController;
pub use engine::{CompiledWorkflow, Engine, RunHandle};
pub use error::{ExecutionError, ExecutorError};
pub use events::{ChannelNotifier, EventKind, EventLog, ExecutionEvent, ExecutionNotifier, LogEntry, LogLevel, NoopNotifier};
pub use executor::{BlockExecutor, BlockOutcome, DryRunExecutor, ExecuteRequest, ExecuteResponse, NodeLogger};
pub use http::{HttpExecutor, HttpExecutorConfig};
pub use recorder::RunRecorder;
pub use state::{ErrorEntry, ExecutionState, IterationResult, NodeResult, NodeStatus, Progress, RunStatus};
