use std::fmt;

use serde::{Deserialize, Serialize};

/// Default input port every non-start block accepts.
pub const INPUT_PORT: &str = "in";

/// Input port a loop header accepts back-edges on.
pub const LOOP_BACK_PORT: &str = "next";

/// An output channel a block may fire when it settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
  Out,
  Pass,
  Fail,
  Iteration,
  Complete,
}

impl Channel {
  pub const ALL: [Channel; 5] = [
    Channel::Out,
    Channel::Pass,
    Channel::Fail,
    Channel::Iteration,
    Channel::Complete,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Channel::Out => "out",
      Channel::Pass => "pass",
      Channel::Fail => "fail",
      Channel::Iteration => "iteration",
      Channel::Complete => "complete",
    }
  }

  pub fn parse(name: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|c| c.as_str() == name)
  }
}

impl fmt::Display for Channel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
