/// Settings for one [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
  /// Entries kept in each run's event log before the oldest are evicted.
  pub event_log_capacity: usize,
  /// Upper bound on passes a single loop header may run.
  pub max_loop_iterations: usize,
  /// Stop dispatching new levels after the first unrecoverable failure.
  pub fail_fast: bool,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      event_log_capacity: 1000,
      max_loop_iterations: 10_000,
      fail_fast: false,
    }
  }
}
