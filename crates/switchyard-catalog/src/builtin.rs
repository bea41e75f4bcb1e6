//! The block table shipped with Switchyard.

use serde_json::json;

use crate::block::{BlockDefinition, BlockKind};
use crate::catalog::BlockCatalog;
use crate::parameter::{ParameterKind, ParameterSpec};

pub const BUILTIN_VERSION: &str = "2026.10";

pub(crate) fn catalog() -> BlockCatalog {
  let mut catalog = BlockCatalog::new(BUILTIN_VERSION);
  for definition in definitions() {
    catalog.insert_trusted(definition);
  }
  catalog
}

fn definitions() -> Vec<BlockDefinition> {
  vec![
    // control
    BlockDefinition::new("start", "Start", "control", BlockKind::Start)
      .describe("Entry point of a workflow. Emits the workflow variables."),
    BlockDefinition::new("end", "End", "control", BlockKind::End)
      .describe("Terminates a branch, carrying the previous node's output."),
    BlockDefinition::new("loop", "Loop", "control", BlockKind::Loop)
      .describe("Runs its body once per item, then fires `complete`.")
      .with_parameter(
        ParameterSpec::new("mode", ParameterKind::Enum)
          .with_options(&["array", "count"])
          .with_default("array"),
      )
      .with_parameter(
        ParameterSpec::new("items", ParameterKind::Json).describe("Array to iterate in array mode"),
      )
      .with_parameter(
        ParameterSpec::new("count", ParameterKind::Number).describe("Number of passes in count mode"),
      ),
    BlockDefinition::new("variable-set", "Set Variable", "control", BlockKind::VariableSet)
      .with_parameter(ParameterSpec::new("name", ParameterKind::String).required())
      .with_parameter(ParameterSpec::new("value", ParameterKind::Json).with_default(json!(null))),
    BlockDefinition::new("compare", "Compare", "control", BlockKind::Compare)
      .with_parameter(ParameterSpec::new("left", ParameterKind::Json).required())
      .with_parameter(
        ParameterSpec::new("operator", ParameterKind::Enum)
          .with_options(&[
            "equals",
            "notEquals",
            "greaterThan",
            "lessThan",
            "greaterOrEqual",
            "lessOrEqual",
            "contains",
            "truthy",
          ])
          .with_default("equals"),
      )
      .with_parameter(ParameterSpec::new("right", ParameterKind::Json).with_default(json!(null))),
    // discovery
    BlockDefinition::new("ping", "Ping", "discovery", BlockKind::Conditional)
      .describe("ICMP echo; passes when the host answers.")
      .with_parameter(ParameterSpec::new("host", ParameterKind::String).required())
      .with_parameter(ParameterSpec::new("count", ParameterKind::Number).with_default(4))
      .with_parameter(ParameterSpec::new("timeoutMs", ParameterKind::Number).with_default(1000)),
    BlockDefinition::new("dns-lookup", "DNS Lookup", "discovery", BlockKind::Action)
      .with_parameter(ParameterSpec::new("name", ParameterKind::String).required())
      .with_parameter(
        ParameterSpec::new("recordType", ParameterKind::Enum)
          .with_options(&["A", "AAAA", "CNAME", "MX", "TXT", "PTR"])
          .with_default("A"),
      )
      .with_parameter(ParameterSpec::new("server", ParameterKind::String)),
    BlockDefinition::new("port-scan", "Port Scan", "discovery", BlockKind::Action)
      .with_parameter(ParameterSpec::new("host", ParameterKind::String).required())
      .with_parameter(ParameterSpec::new("ports", ParameterKind::String).with_default("1-1024"))
      .with_parameter(ParameterSpec::new("timeoutMs", ParameterKind::Number).with_default(500)),
    BlockDefinition::new("service-detect", "Service Detect", "discovery", BlockKind::Action)
      .with_parameter(ParameterSpec::new("host", ParameterKind::String).required())
      .with_parameter(ParameterSpec::new("port", ParameterKind::Number).required()),
    // remote access
    BlockDefinition::new("ssh-command", "SSH Command", "remote", BlockKind::Action)
      .with_parameter(ParameterSpec::new("host", ParameterKind::String).required())
      .with_parameter(ParameterSpec::new("port", ParameterKind::Number).with_default(22))
      .with_parameter(ParameterSpec::new("username", ParameterKind::String).required())
      .with_parameter(ParameterSpec::new("password", ParameterKind::Secret))
      .with_parameter(ParameterSpec::new("credential", ParameterKind::CredentialRef))
      .with_parameter(ParameterSpec::new("command", ParameterKind::String).required()),
    BlockDefinition::new("ftp-list", "FTP List", "remote", BlockKind::Action)
      .with_parameter(ParameterSpec::new("host", ParameterKind::String).required())
      .with_parameter(ParameterSpec::new("port", ParameterKind::Number).with_default(21))
      .with_parameter(ParameterSpec::new("username", ParameterKind::String).with_default("anonymous"))
      .with_parameter(ParameterSpec::new("password", ParameterKind::Secret))
      .with_parameter(ParameterSpec::new("path", ParameterKind::String).with_default("/")),
    BlockDefinition::new("http-request", "HTTP Request", "remote", BlockKind::Action)
      .with_parameter(ParameterSpec::new("url", ParameterKind::String).required())
      .with_parameter(
        ParameterSpec::new("method", ParameterKind::Enum)
          .with_options(&["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"])
          .with_default("GET"),
      )
      .with_parameter(ParameterSpec::new("headers", ParameterKind::Json).with_default(json!({})))
      .with_parameter(ParameterSpec::new("body", ParameterKind::Json))
      .with_parameter(ParameterSpec::new("expectStatus", ParameterKind::Number)),
    // output
    BlockDefinition::new("notify", "Notify", "output", BlockKind::Action)
      .with_parameter(
        ParameterSpec::new("channel", ParameterKind::Enum)
          .with_options(&["log", "email", "webhook"])
          .with_default("log"),
      )
      .with_parameter(ParameterSpec::new("target", ParameterKind::String))
      .with_parameter(ParameterSpec::new("message", ParameterKind::String).required()),
  ]
}
