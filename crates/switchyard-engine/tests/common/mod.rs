#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use switchyard_catalog::BlockCatalog;
use switchyard_config::WorkflowDef;
use switchyard_engine::{
  BlockExecutor, CompiledWorkflow, ExecuteRequest, ExecuteResponse, ExecutorError, NodeLogger,
};
use tokio::sync::Semaphore;

pub fn compile(def: &WorkflowDef) -> Arc<CompiledWorkflow> {
  Arc::new(CompiledWorkflow::compile(def, &BlockCatalog::builtin()).unwrap())
}

type Script = dyn Fn(&ExecuteRequest, &NodeLogger) -> Result<ExecuteResponse, ExecutorError> + Send + Sync;

/// Answers each call from a closure and records every request.
pub struct ScriptedExecutor {
  calls: Mutex<Vec<ExecuteRequest>>,
  script: Box<Script>,
}

impl ScriptedExecutor {
  pub fn new(
    script: impl Fn(&ExecuteRequest, &NodeLogger) -> Result<ExecuteResponse, ExecutorError> + Send + Sync + 'static,
  ) -> Arc<Self> {
    Arc::new(Self {
      calls: Mutex::new(Vec::new()),
      script: Box::new(script),
    })
  }

  /// Succeeds with the parameters as output.
  pub fn echo() -> Arc<Self> {
    Self::new(|request, _| Ok(ExecuteResponse::ok(json!(request.parameters))))
  }

  pub fn calls(&self) -> Vec<ExecuteRequest> {
    self.calls.lock().unwrap().clone()
  }

  pub fn calls_for(&self, node_id: &str) -> Vec<ExecuteRequest> {
    self.calls().into_iter().filter(|c| c.node_id == node_id).collect()
  }
}

#[async_trait]
impl BlockExecutor for ScriptedExecutor {
  async fn execute(&self, request: ExecuteRequest, logger: NodeLogger) -> Result<ExecuteResponse, ExecutorError> {
    self.calls.lock().unwrap().push(request.clone());
    (self.script)(&request, &logger)
  }
}

/// Holds every call until the test releases permits.
pub struct GatedExecutor {
  gate: Semaphore,
  entered: AtomicUsize,
  calls: Mutex<Vec<String>>,
}

impl GatedExecutor {
  pub fn new() -> Arc<Self> {
    Arc::new(Self {
      gate: Semaphore::new(0),
      entered: AtomicUsize::new(0),
      calls: Mutex::new(Vec::new()),
    })
  }

  pub fn release(&self, permits: usize) {
    self.gate.add_permits(permits);
  }

  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  /// Wait until `count` calls are blocked on the gate.
  pub async fn wait_entered(&self, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
      while self.entered.load(Ordering::SeqCst) < count {
        tokio::time::sleep(Duration::from_millis(5)).await;
      }
    })
    .await
    .expect("executor calls never arrived");
  }
}

#[async_trait]
impl BlockExecutor for GatedExecutor {
  async fn execute(&self, request: ExecuteRequest, _logger: NodeLogger) -> Result<ExecuteResponse, ExecutorError> {
    self.calls.lock().unwrap().push(request.node_id.clone());
    self.entered.fetch_add(1, Ordering::SeqCst);
    let permit = self.gate.acquire().await.expect("gate closed");
    permit.forget();
    Ok(ExecuteResponse::ok(json!({ "node": request.node_id })))
  }
}
