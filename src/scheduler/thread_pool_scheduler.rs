use std::time::Duration;

use futures::{
  executor::ThreadPool,
  future::{abortable, FutureExt},
  task::SpawnExt,
};
use once_cell::sync::Lazy;

use super::{Scheduler, Task};
use crate::{error::MaybeError, subscription::SubscriptionHandle};

static DEFAULT_POOL: Lazy<Result<ThreadPool, String>> =
  Lazy::new(|| ThreadPool::new().map_err(|err| err.to_string()));

/// Runs tasks on a `futures` thread pool, waiting out delays with
/// `futures-time` timers.
#[derive(Clone)]
pub struct ThreadPoolScheduler(ThreadPool);

impl ThreadPoolScheduler {
  pub fn new(pool: ThreadPool) -> Self { Self(pool) }

  /// A scheduler on the lazily created pool shared by the whole process.
  pub fn shared() -> Result<Self, MaybeError> {
    match &*DEFAULT_POOL {
      Ok(pool) => Ok(Self(pool.clone())),
      Err(err) => Err(MaybeError::msg(format!("failed to start the default thread pool: {err}"))),
    }
  }
}

impl Scheduler for ThreadPoolScheduler {
  fn schedule(&self, delay: Duration, task: Task) -> SubscriptionHandle {
    let work = async move {
      if !delay.is_zero() {
        futures_time::task::sleep(delay.into()).await;
      }
      task();
    };
    let (work, abort) = abortable(work);
    match self.0.spawn(work.map(|_| ())) {
      Ok(()) => SubscriptionHandle::from_fn(move || abort.abort()),
      Err(err) => {
        tracing::warn!(error = %err, "failed to spawn onto the thread pool, the task is dropped");
        SubscriptionHandle::closed()
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::mpsc::channel;

  use super::*;
  use crate::subscription::Subscription;

  #[rxmaybe_macro::test]
  fn runs_delayed_task() {
    let scheduler = ThreadPoolScheduler::shared().unwrap();
    let (tx, rx) = channel();
    scheduler.schedule(Duration::from_millis(5), Box::new(move || tx.send(7).unwrap()));
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
  }

  #[rxmaybe_macro::test]
  fn abort_stops_pending_task() {
    let scheduler = ThreadPoolScheduler::new(ThreadPool::new().unwrap());
    let (tx, rx) = channel::<()>();
    let handle =
      scheduler.schedule(Duration::from_millis(100), Box::new(move || tx.send(()).unwrap()));
    handle.unsubscribe();
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
  }
}
