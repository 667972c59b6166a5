use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::{DynamicSubscriptions, Subscription, SubscriptionHandle};

/// A tracked set of subscriptions released together.
///
/// The lock only guards insertion, removal, and taking the whole set; the
/// handles themselves are always released after the lock is dropped.
#[derive(Default)]
pub struct CompositeSubscription {
  entries: Mutex<DynamicSubscriptions<SubscriptionHandle>>,
  closed: AtomicBool,
}

impl CompositeSubscription {
  pub fn new() -> Self { Self::default() }

  /// Track `handle`, returning the key to remove it with. If the composite is
  /// already closed, `handle` is released and `None` is returned.
  pub fn add(&self, handle: SubscriptionHandle) -> Option<usize> {
    {
      let mut entries = self.entries.lock();
      if !self.is_closed() {
        return Some(entries.add(handle));
      }
    }
    handle.unsubscribe();
    None
  }

  /// Stop tracking `key` without releasing it.
  pub fn remove(&self, key: usize) -> Option<SubscriptionHandle> { self.entries.lock().remove(key) }

  /// Stop tracking `key` and release it.
  pub fn delete(&self, key: usize) {
    if let Some(handle) = self.remove(key) {
      handle.unsubscribe();
    }
  }

  pub fn len(&self) -> usize { self.entries.lock().len() }

  pub fn is_empty(&self) -> bool { self.entries.lock().is_empty() }
}

impl Subscription for CompositeSubscription {
  fn unsubscribe(&self) {
    let taken = {
      let mut entries = self.entries.lock();
      if self.closed.swap(true, Ordering::AcqRel) {
        return;
      }
      entries.take_all()
    };
    for handle in taken {
      handle.unsubscribe();
    }
  }

  fn is_closed(&self) -> bool { self.closed.load(Ordering::Acquire) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[rxmaybe_macro::test]
  fn unsubscribe_releases_everything_once() {
    let composite = CompositeSubscription::new();
    let handles: Vec<_> = (0..3).map(|_| SubscriptionHandle::flag()).collect();
    for h in &handles {
      composite.add(h.clone());
    }
    assert_eq!(composite.len(), 3);

    composite.unsubscribe();
    composite.unsubscribe();
    assert!(handles.iter().all(Subscription::is_closed));
    assert!(composite.is_empty());
  }

  #[rxmaybe_macro::test]
  fn remove_does_not_release() {
    let composite = CompositeSubscription::new();
    let h = SubscriptionHandle::flag();
    let key = composite.add(h.clone()).unwrap();
    composite.remove(key);
    composite.unsubscribe();
    assert!(!h.is_closed());
  }

  #[rxmaybe_macro::test]
  fn add_after_close_releases() {
    let composite = CompositeSubscription::new();
    composite.unsubscribe();
    let h = SubscriptionHandle::flag();
    assert!(composite.add(h.clone()).is_none());
    assert!(h.is_closed());
  }
}
