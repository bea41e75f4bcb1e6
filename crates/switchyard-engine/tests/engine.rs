mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value, json};
use switchyard_catalog::Channel;
use switchyard_config::{EdgeDef, NodeDef, VariableDef, VariableType, WorkflowDef};
use switchyard_engine::{
  Engine, EngineConfig, EventKind, ExecuteResponse, ExecutionError, NodeStatus, RunControl, RunStatus,
};
use switchyard_workflow::REDACTED;

use common::{GatedExecutor, ScriptedExecutor, compile};

fn engine(executor: Arc<dyn switchyard_engine::BlockExecutor>) -> Engine {
  Engine::new(executor, EngineConfig::default())
}

fn no_vars() -> Map<String, Value> {
  Map::new()
}

#[tokio::test]
async fn test_linear_run_passes_outputs_along() {
  let def = WorkflowDef::new("wf-linear", "Resolve and ping")
    .with_node(NodeDef::new("start", "start"))
    .with_node(NodeDef::new("dns", "dns-lookup").with_parameter("name", "gw.example.test"))
    .with_node(NodeDef::new("probe", "ping").with_parameter("host", "{{ $node.dns.address }}"))
    .with_node(NodeDef::new("end", "end"))
    .with_edge(EdgeDef::new("e1", "start", "dns"))
    .with_edge(EdgeDef::new("e2", "dns", "probe"))
    .with_edge(EdgeDef::new("e3", "probe", "end").from_channel("pass"));
  let executor = ScriptedExecutor::new(|request, _| match request.block_type.as_str() {
    "dns-lookup" => Ok(ExecuteResponse::ok(json!({"address": "10.0.0.5"}))),
    _ => Ok(ExecuteResponse::ok(json!({"rttMs": 4, "host": request.parameters["host"]}))),
  });

  let state = engine(executor.clone()).execute(compile(&def), &no_vars()).await.unwrap();

  assert_eq!(state.status, RunStatus::Completed);
  assert_eq!(state.progress.percentage, 100);
  assert!(state.node_statuses.values().all(|s| *s == NodeStatus::Completed));
  assert_eq!(executor.calls_for("probe")[0].parameters["host"], "10.0.0.5");
  assert_eq!(executor.calls_for("probe")[0].parameters["count"], 4);
  assert_eq!(state.result("probe").unwrap().fired_channel, Some(Channel::Pass));
  assert_eq!(state.result("end").unwrap().output, json!({"rttMs": 4, "host": "10.0.0.5"}));
  assert!(state.started_at.is_some() && state.finished_at.is_some());
}

fn ping_with_fallback(wire_fail: bool) -> WorkflowDef {
  let mut def = WorkflowDef::new("wf-fallback", "Ping with fallback")
    .with_node(NodeDef::new("start", "start"))
    .with_node(NodeDef::new("probe", "ping").with_parameter("host", "10.0.0.9"))
    .with_node(NodeDef::new("alert", "notify").with_parameter("message", "10.0.0.9 is down"))
    .with_node(NodeDef::new("end", "end"))
    .with_edge(EdgeDef::new("e1", "start", "probe"))
    .with_edge(EdgeDef::new("e2", "probe", "end").from_channel("pass"))
    .with_edge(EdgeDef::new("e3", "alert", "end"));
  if wire_fail {
    def = def.with_edge(EdgeDef::new("e4", "probe", "alert").from_channel("fail"));
  } else {
    def = def.with_edge(EdgeDef::new("e4", "start", "alert"));
  }
  def
}

fn failing_ping() -> Arc<ScriptedExecutor> {
  ScriptedExecutor::new(|request, _| match request.block_type.as_str() {
    "ping" => Ok(ExecuteResponse::failed("100% packet loss")),
    _ => Ok(ExecuteResponse::ok(json!({"sent": true}))),
  })
}

#[tokio::test]
async fn test_wired_fail_edge_recovers() {
  let state = engine(failing_ping())
    .execute(compile(&ping_with_fallback(true)), &no_vars())
    .await
    .unwrap();

  assert_eq!(state.status, RunStatus::Completed);
  assert_eq!(state.node_status("probe"), Some(NodeStatus::Failed));
  assert_eq!(state.node_status("alert"), Some(NodeStatus::Completed));
  assert_eq!(state.node_status("end"), Some(NodeStatus::Completed));
  assert_eq!(state.errors.len(), 1);
  assert!(state.errors[0].recovered);
  assert_eq!(state.result("probe").unwrap().error.as_deref(), Some("100% packet loss"));
}

#[tokio::test]
async fn test_unwired_failure_fails_run() {
  let state = engine(failing_ping())
    .execute(compile(&ping_with_fallback(false)), &no_vars())
    .await
    .unwrap();

  assert_eq!(state.status, RunStatus::Failed);
  assert!(!state.errors[0].recovered);
  assert_eq!(state.node_status("alert"), Some(NodeStatus::Completed));
  // `end` is still reached through `alert`.
  assert_eq!(state.node_status("end"), Some(NodeStatus::Completed));
}

fn independent_branches() -> WorkflowDef {
  WorkflowDef::new("wf-branches", "Independent branches")
    .with_node(NodeDef::new("start", "start"))
    .with_node(NodeDef::new("probe", "ping").with_parameter("host", "10.0.0.9"))
    .with_node(NodeDef::new("first", "notify").with_parameter("message", "one"))
    .with_node(NodeDef::new("second", "notify").with_parameter("message", "{{ $prev.sent }}"))
    .with_node(NodeDef::new("after", "notify").with_parameter("message", "after probe"))
    .with_edge(EdgeDef::new("e1", "start", "probe"))
    .with_edge(EdgeDef::new("e2", "start", "first"))
    .with_edge(EdgeDef::new("e3", "first", "second"))
    .with_edge(EdgeDef::new("e4", "probe", "after").from_channel("pass"))
}

#[tokio::test]
async fn test_independent_branches_finish_without_fail_fast() {
  let executor = failing_ping();
  let state = engine(executor.clone())
    .execute(compile(&independent_branches()), &no_vars())
    .await
    .unwrap();

  assert_eq!(state.status, RunStatus::Failed);
  assert_eq!(state.node_status("second"), Some(NodeStatus::Completed));
  assert_eq!(state.node_status("after"), Some(NodeStatus::Skipped));
  assert_eq!(executor.calls_for("second")[0].parameters["message"], "true");
}

#[tokio::test]
async fn test_fail_fast_stops_next_level() {
  let executor = failing_ping();
  let config = EngineConfig {
    fail_fast: true,
    ..EngineConfig::default()
  };
  let state = Engine::new(executor.clone(), config)
    .execute(compile(&independent_branches()), &no_vars())
    .await
    .unwrap();

  assert_eq!(state.status, RunStatus::Failed);
  assert_eq!(state.node_status("first"), Some(NodeStatus::Completed));
  assert_eq!(state.node_status("second"), Some(NodeStatus::Skipped));
  assert!(executor.calls_for("second").is_empty());
}

#[tokio::test]
async fn test_loop_records_ordered_iterations() {
  let def = WorkflowDef::new("wf-loop", "Loop")
    .with_node(NodeDef::new("start", "start"))
    .with_node(NodeDef::new("each", "loop").with_parameter("items", json!(["x", "y", "z"])))
    .with_node(
      NodeDef::new("probe", "ping")
        .with_parameter("host", "{{ $loop.item }}")
        .with_parameter("count", "{{ $loop.index }}"),
    )
    .with_node(NodeDef::new("end", "end"))
    .with_edge(EdgeDef::new("e1", "start", "each"))
    .with_edge(EdgeDef::new("e2", "each", "probe").from_channel("iteration"))
    .with_edge(EdgeDef::new("e3", "probe", "each").from_channel("pass").into_channel("next"))
    .with_edge(EdgeDef::new("e4", "each", "end").from_channel("complete"));
  let executor = ScriptedExecutor::echo();

  let state = engine(executor.clone()).execute(compile(&def), &no_vars()).await.unwrap();

  assert_eq!(state.status, RunStatus::Completed);
  let header = state.result("each").unwrap();
  assert_eq!(header.fired_channel, Some(Channel::Complete));
  assert_eq!(header.output["count"], 3);
  let items: Vec<&Value> = header.iterations.iter().map(|i| &i.item).collect();
  assert_eq!(items, vec!["x", "y", "z"]);
  let sequences: Vec<usize> = header.iterations.iter().map(|i| i.sequence).collect();
  assert_eq!(sequences, vec![0, 1, 2]);
  let flags: Vec<(bool, bool)> = header.iterations.iter().map(|i| (i.is_first, i.is_last)).collect();
  assert_eq!(flags, vec![(true, false), (false, false), (false, true)]);
  assert!(header.iterations.iter().all(|i| i.success));
  assert_eq!(header.iterations[1].output["outputs"]["probe"]["host"], "y");

  let probe = state.result("probe").unwrap();
  assert_eq!(probe.iterations.len(), 3);
  assert_eq!(probe.iterations[2].output["count"], 2);
  let hosts: Vec<Value> = executor.calls().iter().map(|c| c.parameters["host"].clone()).collect();
  assert_eq!(hosts, vec!["x", "y", "z"]);
  assert_eq!(state.result("end").unwrap().output["count"], 3);
}

#[tokio::test]
async fn test_variable_set_feeds_loop_of_pings() {
  let def = WorkflowDef::new("wf-hosts", "Ping hosts")
    .with_node(NodeDef::new("start", "start"))
    .with_node(
      NodeDef::new("hosts", "variable-set")
        .with_parameter("name", "hosts")
        .with_parameter("value", json!(["a", "b"])),
    )
    .with_node(NodeDef::new("each", "loop").with_parameter("items", "{{ $prev.hosts }}"))
    .with_node(NodeDef::new("probe", "ping").with_parameter("host", "{{ $loop.item }}"))
    .with_node(NodeDef::new("end", "end"))
    .with_edge(EdgeDef::new("e1", "start", "hosts"))
    .with_edge(EdgeDef::new("e2", "hosts", "each"))
    .with_edge(EdgeDef::new("e3", "each", "probe").from_channel("iteration"))
    .with_edge(EdgeDef::new("e4", "probe", "each").from_channel("pass").into_channel("next"))
    .with_edge(EdgeDef::new("e5", "each", "end").from_channel("complete"));
  let executor = ScriptedExecutor::echo();

  let state = engine(executor.clone()).execute(compile(&def), &no_vars()).await.unwrap();

  let calls = executor.calls();
  assert_eq!(calls.len(), 2);
  assert!(calls.iter().all(|c| c.block_type == "ping"));
  assert_eq!(calls[0].parameters["host"], "a");
  assert_eq!(calls[1].parameters["host"], "b");
  assert_eq!(state.node_status("end"), Some(NodeStatus::Completed));
  assert_eq!(state.result("hosts").unwrap().output, json!({"hosts": ["a", "b"]}));
  assert_eq!(state.status, RunStatus::Completed);
}

fn loop_over_hosts(recover: bool) -> WorkflowDef {
  let mut def = WorkflowDef::new("wf-hosts", "Ping hosts")
    .with_node(NodeDef::new("start", "start"))
    .with_node(NodeDef::new("each", "loop").with_parameter("items", json!(["a", "b", "c"])))
    .with_node(NodeDef::new("probe", "ping").with_parameter("host", "{{ $loop.item }}"))
    .with_node(NodeDef::new("end", "end"))
    .with_edge(EdgeDef::new("e1", "start", "each"))
    .with_edge(EdgeDef::new("e2", "each", "probe").from_channel("iteration"))
    .with_edge(EdgeDef::new("e3", "probe", "each").from_channel("pass").into_channel("next"))
    .with_edge(EdgeDef::new("e4", "each", "end").from_channel("complete"));
  if recover {
    def = def
      .with_node(NodeDef::new("alert", "notify").with_parameter("message", "{{ $loop.item }} down"))
      .with_edge(EdgeDef::new("e5", "probe", "alert").from_channel("fail"))
      .with_edge(EdgeDef::new("e6", "alert", "each").into_channel("next"));
  }
  def
}

fn host_b_down() -> Arc<ScriptedExecutor> {
  ScriptedExecutor::new(|request, _| {
    if request.block_type == "ping" && request.parameters["host"] == "b" {
      Ok(ExecuteResponse::failed("b unreachable"))
    } else {
      Ok(ExecuteResponse::ok(json!(request.parameters)))
    }
  })
}

#[tokio::test]
async fn test_unrecoverable_body_failure_stops_loop() {
  let executor = host_b_down();
  let state = engine(executor.clone())
    .execute(compile(&loop_over_hosts(false)), &no_vars())
    .await
    .unwrap();

  assert_eq!(state.status, RunStatus::Failed);
  assert_eq!(executor.calls().len(), 2);
  let header = state.result("each").unwrap();
  assert_eq!(state.node_status("each"), Some(NodeStatus::Failed));
  assert_eq!(header.iterations.len(), 2);
  assert!(header.iterations[0].success);
  assert!(!header.iterations[1].success);
  assert_eq!(state.node_status("end"), Some(NodeStatus::Skipped));
}

#[tokio::test]
async fn test_recovered_body_failure_continues_loop() {
  let executor = host_b_down();
  let state = engine(executor.clone())
    .execute(compile(&loop_over_hosts(true)), &no_vars())
    .await
    .unwrap();

  assert_eq!(state.status, RunStatus::Completed);
  assert_eq!(executor.calls_for("probe").len(), 3);
  let alerts = executor.calls_for("alert");
  assert_eq!(alerts.len(), 1);
  assert_eq!(alerts[0].parameters["message"], "b down");
  let header = state.result("each").unwrap();
  assert_eq!(header.iterations.len(), 3);
  assert!(header.iterations.iter().all(|i| i.success));
  assert!(state.errors.iter().all(|e| e.recovered));
}

#[tokio::test]
async fn test_compare_selects_branch() {
  let def = WorkflowDef::new("wf-compare", "Threshold")
    .with_variable(VariableDef::new("limit", VariableType::Number, json!(5)))
    .with_node(NodeDef::new("start", "start"))
    .with_node(
      NodeDef::new("check", "compare")
        .with_parameter("left", "{{ $vars.limit }}")
        .with_parameter("operator", "greaterThan")
        .with_parameter("right", 10),
    )
    .with_node(NodeDef::new("big", "notify").with_parameter("message", "big"))
    .with_node(NodeDef::new("small", "notify").with_parameter("message", "small"))
    .with_edge(EdgeDef::new("e1", "start", "check"))
    .with_edge(EdgeDef::new("e2", "check", "big").from_channel("pass"))
    .with_edge(EdgeDef::new("e3", "check", "small").from_channel("fail"));
  let compiled = compile(&def);
  let executor = ScriptedExecutor::echo();
  let engine = engine(executor.clone());

  let state = engine.execute(compiled.clone(), &no_vars()).await.unwrap();
  assert_eq!(state.status, RunStatus::Completed);
  assert_eq!(state.node_status("big"), Some(NodeStatus::Skipped));
  assert_eq!(state.node_status("small"), Some(NodeStatus::Completed));

  let mut vars = Map::new();
  vars.insert("limit".into(), json!("12"));
  let state = engine.execute(compiled, &vars).await.unwrap();
  assert_eq!(state.node_status("big"), Some(NodeStatus::Completed));
  assert_eq!(state.node_status("small"), Some(NodeStatus::Skipped));
  assert_eq!(state.result("check").unwrap().output["left"], 12);
}

#[tokio::test]
async fn test_resolution_failure_skips_dispatch() {
  let def = WorkflowDef::new("wf-resolve", "Missing input")
    .with_node(NodeDef::new("start", "start"))
    .with_node(NodeDef::new("probe", "ping").with_parameter("host", "{{ $prev.address }}"))
    .with_edge(EdgeDef::new("e1", "start", "probe"));
  let executor = ScriptedExecutor::echo();

  let state = engine(executor.clone()).execute(compile(&def), &no_vars()).await.unwrap();

  assert!(executor.calls().is_empty());
  assert_eq!(state.status, RunStatus::Failed);
  assert_eq!(state.node_status("probe"), Some(NodeStatus::Failed));
  assert!(state.errors[0].message.contains("host"));
}

#[tokio::test]
async fn test_undeclared_fired_channel_fails_node() {
  let def = WorkflowDef::new("wf-channel", "Bad channel")
    .with_node(NodeDef::new("start", "start"))
    .with_node(NodeDef::new("say", "notify").with_parameter("message", "hi"))
    .with_edge(EdgeDef::new("e1", "start", "say"));
  let executor = ScriptedExecutor::new(|_, _| Ok(ExecuteResponse::ok(json!(null)).on_channel("pass")));

  let state = engine(executor).execute(compile(&def), &no_vars()).await.unwrap();

  assert_eq!(state.status, RunStatus::Failed);
  assert_eq!(state.node_status("say"), Some(NodeStatus::Failed));
  assert!(state.errors[0].message.contains("undeclared channel 'pass'"));
}

#[tokio::test]
async fn test_transport_error_routes_to_fail_edge() {
  let executor = ScriptedExecutor::new(|request, _| match request.block_type.as_str() {
    "ping" => Err(switchyard_engine::ExecutorError::Transport {
      message: "connection refused".into(),
    }),
    _ => Ok(ExecuteResponse::ok(json!(null))),
  });

  let state = engine(executor)
    .execute(compile(&ping_with_fallback(true)), &no_vars())
    .await
    .unwrap();

  assert_eq!(state.status, RunStatus::Completed);
  assert!(state.errors[0].message.contains("connection refused"));
  assert_eq!(state.node_status("alert"), Some(NodeStatus::Completed));
}

#[tokio::test]
async fn test_secrets_redacted_in_events() {
  let def = WorkflowDef::new("wf-ssh", "SSH")
    .with_node(NodeDef::new("start", "start"))
    .with_node(
      NodeDef::new("shell", "ssh-command")
        .with_parameter("host", "10.0.0.2")
        .with_parameter("username", "ops")
        .with_parameter("password", "hunter2")
        .with_parameter("command", "uptime"),
    )
    .with_edge(EdgeDef::new("e1", "start", "shell"));
  let executor = ScriptedExecutor::new(|_, _| Ok(ExecuteResponse::ok(json!({"stdout": "up 3 days"}))));
  let handle = engine(executor.clone())
    .launch(compile(&def), &no_vars(), RunControl::new())
    .unwrap();
  let events = {
    let mut snapshots = handle.subscribe();
    snapshots.wait_for(|s| s.status.is_terminal()).await.unwrap();
    handle.events()
  };

  assert_eq!(executor.calls()[0].parameters["password"], "hunter2");
  let started = events
    .iter()
    .find(|e| e.kind == EventKind::NodeStarted && e.node_id.as_deref() == Some("shell"))
    .unwrap();
  assert_eq!(started.data["parameters"]["password"], REDACTED);
  assert_eq!(started.data["parameters"]["username"], "ops");
  assert!(events.iter().all(|e| !e.data.to_string().contains("hunter2")));
}

#[tokio::test]
async fn test_executor_logs_reach_event_log() {
  let def = WorkflowDef::new("wf-logs", "Logs")
    .with_node(NodeDef::new("start", "start"))
    .with_node(NodeDef::new("scan", "port-scan").with_parameter("host", "10.0.0.3"))
    .with_edge(EdgeDef::new("e1", "start", "scan"));
  let executor = ScriptedExecutor::new(|_, logger| {
    logger.info("scanning 1-1024");
    Ok(ExecuteResponse::ok(json!({"open": [22]})).with_log("scan finished"))
  });
  let handle = engine(executor)
    .launch(compile(&def), &no_vars(), RunControl::new())
    .unwrap();
  let mut snapshots = handle.subscribe();
  snapshots.wait_for(|s| s.status.is_terminal()).await.unwrap();

  let lines: Vec<String> = handle
    .events()
    .into_iter()
    .filter(|e| e.kind == EventKind::NodeLog)
    .map(|e| e.message)
    .collect();
  assert_eq!(lines, vec!["scanning 1-1024", "scan finished"]);
}

#[tokio::test]
async fn test_event_log_capacity_evicts_oldest() {
  let config = EngineConfig {
    event_log_capacity: 3,
    ..EngineConfig::default()
  };
  let handle = Engine::new(ScriptedExecutor::echo(), config)
    .launch(compile(&ping_with_fallback(true)), &no_vars(), RunControl::new())
    .unwrap();
  let mut snapshots = handle.subscribe();
  snapshots.wait_for(|s| s.status.is_terminal()).await.unwrap();

  let events = handle.events();
  assert_eq!(events.len(), 3);
  assert_eq!(events.last().unwrap().kind, EventKind::RunFinished);
  assert!(events.iter().all(|e| e.kind != EventKind::RunStarted));
}

#[tokio::test]
async fn test_cancel_mid_level_lets_in_flight_finish() {
  let def = WorkflowDef::new("wf-cancel", "Cancel")
    .with_node(NodeDef::new("start", "start"))
    .with_node(NodeDef::new("a", "ping").with_parameter("host", "a"))
    .with_node(NodeDef::new("b", "ping").with_parameter("host", "b"))
    .with_node(NodeDef::new("later", "notify").with_parameter("message", "later"))
    .with_edge(EdgeDef::new("e1", "start", "a"))
    .with_edge(EdgeDef::new("e2", "start", "b"))
    .with_edge(EdgeDef::new("e3", "a", "later").from_channel("pass"));
  let executor = GatedExecutor::new();
  let handle = engine(executor.clone())
    .launch(compile(&def), &no_vars(), RunControl::new())
    .unwrap();

  executor.wait_entered(2).await;
  handle.control().cancel();
  executor.release(2);
  let state = tokio::time::timeout(Duration::from_secs(5), handle.wait())
    .await
    .unwrap()
    .unwrap();

  assert_eq!(state.status, RunStatus::Cancelled);
  assert_eq!(state.node_status("a"), Some(NodeStatus::Completed));
  assert_eq!(state.node_status("b"), Some(NodeStatus::Completed));
  assert_eq!(state.node_status("later"), Some(NodeStatus::Pending));
  assert_eq!(executor.calls().len(), 2);
}

#[tokio::test]
async fn test_paused_run_waits_at_level_boundary() {
  let executor = ScriptedExecutor::echo();
  let control = RunControl::new();
  control.pause();
  let handle = engine(executor.clone())
    .launch(compile(&ping_with_fallback(true)), &no_vars(), control.clone())
    .unwrap();

  let mut snapshots = handle.subscribe();
  tokio::time::timeout(Duration::from_secs(5), snapshots.wait_for(|s| s.status == RunStatus::Paused))
    .await
    .unwrap()
    .unwrap();
  assert!(executor.calls().is_empty());

  control.resume();
  let state = handle.wait().await.unwrap();
  assert_eq!(state.status, RunStatus::Completed);
  assert_eq!(executor.calls().len(), 1);
}

#[tokio::test]
async fn test_unknown_variable_override_rejected() {
  let mut vars = Map::new();
  vars.insert("nope".into(), json!(1));
  let result = engine(ScriptedExecutor::echo()).launch(compile(&ping_with_fallback(true)), &vars, RunControl::new());
  assert!(matches!(result, Err(ExecutionError::Binding(_))));
}

#[tokio::test]
async fn test_fail_edge_back_to_header_skips_item() {
  let def = WorkflowDef::new("wf-skip", "Skip unreachable hosts")
    .with_node(NodeDef::new("start", "start"))
    .with_node(NodeDef::new("each", "loop").with_parameter("items", json!(["a", "b", "c"])))
    .with_node(NodeDef::new("probe", "ping").with_parameter("host", "{{ $loop.item }}"))
    .with_node(NodeDef::new("end", "end"))
    .with_edge(EdgeDef::new("e1", "start", "each"))
    .with_edge(EdgeDef::new("e2", "each", "probe").from_channel("iteration"))
    .with_edge(EdgeDef::new("e3", "probe", "each").from_channel("pass").into_channel("next"))
    .with_edge(EdgeDef::new("e4", "probe", "each").from_channel("fail").into_channel("next"))
    .with_edge(EdgeDef::new("e5", "each", "end").from_channel("complete"));
  let executor = host_b_down();

  let state = engine(executor.clone()).execute(compile(&def), &no_vars()).await.unwrap();

  assert_eq!(state.status, RunStatus::Completed);
  assert_eq!(executor.calls_for("probe").len(), 3);
  assert_eq!(state.errors.len(), 1);
  assert!(state.errors[0].recovered);
  let header = state.result("each").unwrap();
  assert_eq!(header.iterations.len(), 3);
  assert!(header.iterations.iter().all(|i| i.success));
  let probe = state.result("probe").unwrap();
  let passes: Vec<bool> = probe.iterations.iter().map(|i| i.success).collect();
  assert_eq!(passes, vec![true, false, true]);
  assert_eq!(state.node_status("end"), Some(NodeStatus::Completed));
}

#[tokio::test]
async fn test_nested_loop_records_its_own_passes() {
  let def = WorkflowDef::new("wf-nested", "Racks and hosts")
    .with_node(NodeDef::new("start", "start"))
    .with_node(NodeDef::new("racks", "loop").with_parameter("items", json!(["r1", "r2"])))
    .with_node(NodeDef::new("hosts", "loop").with_parameter("items", json!(["a", "b", "c"])))
    .with_node(NodeDef::new("probe", "ping").with_parameter("host", "{{ $loop.item }}"))
    .with_node(NodeDef::new("end", "end"))
    .with_edge(EdgeDef::new("e1", "start", "racks"))
    .with_edge(EdgeDef::new("e2", "racks", "hosts").from_channel("iteration"))
    .with_edge(EdgeDef::new("e3", "hosts", "probe").from_channel("iteration"))
    .with_edge(EdgeDef::new("e4", "probe", "hosts").from_channel("pass").into_channel("next"))
    .with_edge(EdgeDef::new("e5", "hosts", "racks").from_channel("complete").into_channel("next"))
    .with_edge(EdgeDef::new("e6", "racks", "end").from_channel("complete"));
  let executor = ScriptedExecutor::echo();

  let state = engine(executor.clone()).execute(compile(&def), &no_vars()).await.unwrap();

  assert_eq!(state.status, RunStatus::Completed);
  let hosts: Vec<Value> = executor.calls().iter().map(|c| c.parameters["host"].clone()).collect();
  assert_eq!(hosts, vec!["a", "b", "c", "a", "b", "c"]);

  let inner = state.result("hosts").unwrap();
  let passes: Vec<(usize, &Value)> = inner.iterations.iter().map(|i| (i.sequence, &i.item)).collect();
  assert_eq!(passes, vec![(0, &json!("a")), (1, &json!("b")), (2, &json!("c"))]);
  assert_eq!(state.result("probe").unwrap().iterations.len(), 3);

  let outer = state.result("racks").unwrap();
  let racks: Vec<&Value> = outer.iterations.iter().map(|i| &i.item).collect();
  assert_eq!(racks, vec!["r1", "r2"]);
  assert_eq!(outer.iterations[1].output["outputs"]["hosts"]["count"], 3);
  assert_eq!(state.result("end").unwrap().output["count"], 2);
}

fn gated_loop() -> WorkflowDef {
  WorkflowDef::new("wf-gated-loop", "Gated loop")
    .with_node(NodeDef::new("start", "start"))
    .with_node(NodeDef::new("each", "loop").with_parameter("items", json!(["a", "b", "c"])))
    .with_node(NodeDef::new("probe", "ping").with_parameter("host", "{{ $loop.item }}"))
    .with_node(NodeDef::new("end", "end"))
    .with_edge(EdgeDef::new("e1", "start", "each"))
    .with_edge(EdgeDef::new("e2", "each", "probe").from_channel("iteration"))
    .with_edge(EdgeDef::new("e3", "probe", "each").from_channel("pass").into_channel("next"))
    .with_edge(EdgeDef::new("e4", "each", "end").from_channel("complete"))
}

#[tokio::test]
async fn test_cancel_between_iterations() {
  let executor = GatedExecutor::new();
  let handle = engine(executor.clone())
    .launch(compile(&gated_loop()), &no_vars(), RunControl::new())
    .unwrap();

  executor.wait_entered(1).await;
  handle.control().cancel();
  executor.release(1);
  let state = tokio::time::timeout(Duration::from_secs(5), handle.wait())
    .await
    .unwrap()
    .unwrap();

  assert_eq!(state.status, RunStatus::Cancelled);
  assert_eq!(executor.calls(), vec!["probe"]);
  assert_eq!(state.node_status("each"), Some(NodeStatus::Skipped));
  assert_eq!(state.result("each").unwrap().iterations.len(), 1);
  assert_eq!(state.node_status("end"), Some(NodeStatus::Pending));
}

#[tokio::test]
async fn test_pause_between_iterations() {
  let executor = GatedExecutor::new();
  let handle = engine(executor.clone())
    .launch(compile(&gated_loop()), &no_vars(), RunControl::new())
    .unwrap();

  executor.wait_entered(1).await;
  handle.control().pause();
  executor.release(1);
  let mut snapshots = handle.subscribe();
  tokio::time::timeout(Duration::from_secs(5), snapshots.wait_for(|s| s.status == RunStatus::Paused))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(executor.calls().len(), 1);
  assert_eq!(handle.snapshot().result("each").unwrap().iterations.len(), 1);

  executor.release(2);
  handle.control().resume();
  let state = tokio::time::timeout(Duration::from_secs(5), handle.wait())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(state.status, RunStatus::Completed);
  assert_eq!(executor.calls().len(), 3);
  assert_eq!(state.result("each").unwrap().iterations.len(), 3);
}
