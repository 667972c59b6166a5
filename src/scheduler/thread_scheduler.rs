use std::{thread, time::Duration};

use super::{Scheduler, Task};
use crate::subscription::{Subscription, SubscriptionHandle};

/// Runs every task on a thread of its own.
///
/// A cancelled task's thread still sleeps out its delay, it just skips the
/// task afterwards.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
  fn schedule(&self, delay: Duration, task: Task) -> SubscriptionHandle {
    let cancelled = SubscriptionHandle::flag();
    let flag = cancelled.clone();
    let spawned = thread::Builder::new()
      .name("rxmaybe-task".to_owned())
      .spawn(move || {
        if !delay.is_zero() {
          thread::sleep(delay);
        }
        if !flag.is_closed() {
          task();
        }
      });
    if let Err(err) = spawned {
      tracing::warn!(error = %err, "failed to spawn a scheduler thread, the task is dropped");
      cancelled.unsubscribe();
    }
    cancelled
  }
}

#[cfg(test)]
mod tests {
  use std::sync::mpsc::channel;

  use super::*;

  #[rxmaybe_macro::test]
  fn runs_on_another_thread() {
    let (tx, rx) = channel();
    let caller = thread::current().id();
    ThreadScheduler.schedule(
      Duration::from_millis(1),
      Box::new(move || tx.send(thread::current().id()).unwrap()),
    );
    let ran_on = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_ne!(ran_on, caller);
  }

  #[rxmaybe_macro::test]
  fn cancelled_before_delay_is_skipped() {
    let (tx, rx) = channel::<()>();
    let handle =
      ThreadScheduler.schedule(Duration::from_millis(50), Box::new(move || tx.send(()).unwrap()));
    handle.unsubscribe();
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
  }
}
