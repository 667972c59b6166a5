use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::{Subscription, SubscriptionHandle};

/// Holds the "current" subscription and releases the previous one whenever a
/// new one replaces it.
///
/// Used by operators that run one inner subscription at a time: retry,
/// repeat, switch-map, timeout's fallback.
#[derive(Default)]
pub struct SerialSubscription {
  current: Mutex<Option<SubscriptionHandle>>,
  closed: AtomicBool,
}

impl SerialSubscription {
  pub fn new() -> Self { Self::default() }

  /// Install `next` and release the handle it replaces. When already closed,
  /// `next` is released instead.
  pub fn replace(&self, next: SubscriptionHandle) {
    let prev = {
      let mut current = self.current.lock();
      if self.is_closed() {
        None
      } else {
        Some(current.replace(next.clone()))
      }
    };
    match prev {
      Some(Some(prev)) => prev.unsubscribe(),
      Some(None) => {}
      None => next.unsubscribe(),
    }
  }

  /// Install `next` without touching the handle it replaces.
  pub fn set(&self, next: SubscriptionHandle) {
    let rejected = {
      let mut current = self.current.lock();
      if self.is_closed() {
        true
      } else {
        *current = Some(next.clone());
        false
      }
    };
    if rejected {
      next.unsubscribe();
    }
  }
}

impl Subscription for SerialSubscription {
  fn unsubscribe(&self) {
    let prev = {
      let mut current = self.current.lock();
      self.closed.store(true, Ordering::Release);
      current.take()
    };
    if let Some(prev) = prev {
      prev.unsubscribe();
    }
  }

  fn is_closed(&self) -> bool { self.closed.load(Ordering::Acquire) }
}
