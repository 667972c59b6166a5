use std::time::Duration;

use tokio::runtime::Handle;

use super::{Scheduler, Task};
use crate::{error::MaybeError, subscription::SubscriptionHandle};

/// Spawns tasks onto a tokio runtime and waits out delays with
/// `tokio::time::sleep`.
#[derive(Clone, Debug)]
pub struct TokioScheduler(Handle);

impl TokioScheduler {
  pub fn new(handle: Handle) -> Self { Self(handle) }

  /// A scheduler on the runtime the caller is running in.
  pub fn current() -> Result<Self, MaybeError> {
    Handle::try_current()
      .map(Self)
      .map_err(|err| MaybeError::msg(err.to_string()))
  }
}

impl Scheduler for TokioScheduler {
  fn schedule(&self, delay: Duration, task: Task) -> SubscriptionHandle {
    let join = self.0.spawn(async move {
      if !delay.is_zero() {
        tokio::time::sleep(delay).await;
      }
      task();
    });
    SubscriptionHandle::from_fn(move || join.abort())
  }
}
