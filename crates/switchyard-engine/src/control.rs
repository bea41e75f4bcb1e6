use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Advisory cancel and pause flags for one run.
///
/// The engine polls them at level boundaries and before each loop iteration;
/// in-flight executor calls always run to completion.
#[derive(Debug, Clone)]
pub struct RunControl {
  cancel: CancellationToken,
  paused: Arc<watch::Sender<bool>>,
}

impl Default for RunControl {
  fn default() -> Self {
    Self::new()
  }
}

impl RunControl {
  pub fn new() -> Self {
    Self::with_token(CancellationToken::new())
  }

  /// Control whose cancellation also follows `cancel`, e.g. a child token.
  pub fn with_token(cancel: CancellationToken) -> Self {
    let (paused, _) = watch::channel(false);
    Self {
      cancel,
      paused: Arc::new(paused),
    }
  }

  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// Returns false if the run was already paused.
  pub fn pause(&self) -> bool {
    self.paused.send_if_modified(|paused| !std::mem::replace(paused, true))
  }

  /// Returns false if the run was not paused.
  pub fn resume(&self) -> bool {
    self.paused.send_if_modified(|paused| std::mem::replace(paused, false))
  }

  pub fn is_paused(&self) -> bool {
    *self.paused.borrow()
  }

  /// Wait until resumed or cancelled. Returns immediately when not paused.
  pub async fn wait_while_paused(&self) {
    let mut paused = self.paused.subscribe();
    tokio::select! {
      _ = paused.wait_for(|p| !*p) => {}
      _ = self.cancel.cancelled() => {}
    }
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  #[test]
  fn test_pause_resume_flags() {
    let control = RunControl::new();
    assert!(!control.is_paused());
    assert!(control.pause());
    assert!(!control.pause());
    assert!(control.is_paused());
    assert!(control.resume());
    assert!(!control.resume());
  }

  #[tokio::test]
  async fn test_wait_while_paused_released_by_resume() {
    let control = RunControl::new();
    control.pause();

    let waiter = {
      let control = control.clone();
      tokio::spawn(async move { control.wait_while_paused().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!waiter.is_finished());

    control.resume();
    tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
  }

  #[tokio::test]
  async fn test_wait_while_paused_released_by_cancel() {
    let control = RunControl::new();
    control.pause();
    control.cancel();
    tokio::time::timeout(Duration::from_secs(1), control.wait_while_paused())
      .await
      .unwrap();
  }

  #[test]
  fn test_parent_token_cancels_child_control() {
    let parent = CancellationToken::new();
    let control = RunControl::with_token(parent.child_token());
    assert!(!control.is_cancelled());
    parent.cancel();
    assert!(control.is_cancelled());
  }
}
