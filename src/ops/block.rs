//! Blocking bridge
//!
//! Subscribes and parks the calling thread on a latch until the terminal
//! signal arrives. Meant for synchronous call sites and tests; the
//! combinators themselves never block.

use std::{
  sync::Arc,
  time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use crate::{
  error::MaybeError,
  maybe::Maybe,
  observer::MaybeObserver,
  subscription::{Subscription, SubscriptionHandle},
};

type Outcome<Item> = Result<Option<Item>, MaybeError>;

struct Latch<Item> {
  outcome: Mutex<Option<Outcome<Item>>>,
  opened: Condvar,
}

impl<Item> Latch<Item> {
  fn open(&self, outcome: Outcome<Item>) {
    *self.outcome.lock() = Some(outcome);
    self.opened.notify_all();
  }
}

struct LatchObserver<Item> {
  latch: Arc<Latch<Item>>,
  subscription: Arc<Mutex<Option<SubscriptionHandle>>>,
}

impl<Item: Send> MaybeObserver<Item> for LatchObserver<Item> {
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) {
    *self.subscription.lock() = Some(subscription);
  }

  fn on_success(self, value: Item) { self.latch.open(Ok(Some(value))) }

  fn on_error(self, err: MaybeError) { self.latch.open(Err(err)) }

  fn on_complete(self) { self.latch.open(Ok(None)) }
}

impl<Item: Send + 'static> Maybe<Item> {
  /// Wait for the outcome: `Ok(Some(v))` on success, `Ok(None)` on an empty
  /// completion.
  pub fn block_for_result(&self) -> Result<Option<Item>, MaybeError> {
    let (latch, _) = self.start_latch();
    let mut outcome = latch.outcome.lock();
    loop {
      if let Some(result) = outcome.take() {
        return result;
      }
      latch.opened.wait(&mut outcome);
    }
  }

  /// Like [`Maybe::block_for_result`], but gives up after `timeout`,
  /// disposes the subscription and fails with [`MaybeError::Timeout`].
  pub fn block_for_result_timeout(&self, timeout: Duration) -> Result<Option<Item>, MaybeError> {
    let deadline = Instant::now() + timeout;
    let (latch, subscription) = self.start_latch();
    let mut outcome = latch.outcome.lock();
    loop {
      if let Some(result) = outcome.take() {
        return result;
      }
      if latch.opened.wait_until(&mut outcome, deadline).timed_out() {
        if let Some(result) = outcome.take() {
          return result;
        }
        drop(outcome);
        let handle = subscription.lock().take();
        if let Some(handle) = handle {
          handle.unsubscribe();
        }
        return Err(MaybeError::Timeout);
      }
    }
  }

  #[allow(clippy::type_complexity)]
  fn start_latch(&self) -> (Arc<Latch<Item>>, Arc<Mutex<Option<SubscriptionHandle>>>) {
    let latch = Arc::new(Latch { outcome: Mutex::new(None), opened: Condvar::new() });
    let subscription = Arc::new(Mutex::new(None));
    self.subscribe_with(LatchObserver { latch: latch.clone(), subscription: subscription.clone() });
    (latch, subscription)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{factory::MaybeEmitter, subject::MaybeSubject};

  #[rxmaybe_macro::test]
  fn waits_for_another_thread() {
    let source = Maybe::create(|emitter: MaybeEmitter<i32>| {
      std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(10));
        emitter.success(8);
      });
    });
    assert_eq!(source.block_for_result().unwrap(), Some(8));
  }

  #[rxmaybe_macro::test]
  fn empty_and_error() {
    assert_eq!(Maybe::<i32>::empty().block_for_result().unwrap(), None);
    let err = Maybe::<i32>::error(MaybeError::msg("bad")).block_for_result().unwrap_err();
    assert_eq!(err.to_string(), "bad");
  }

  #[rxmaybe_macro::test]
  fn timeout_disposes_the_subscription() {
    let subject = MaybeSubject::<i32>::new();
    let err = subject
      .to_maybe()
      .block_for_result_timeout(Duration::from_millis(20))
      .unwrap_err();
    assert!(err.is_timeout());
    assert!(!subject.has_observers());
  }
}
