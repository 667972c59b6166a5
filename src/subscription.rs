//! Cancellation handles.
//!
//! A [`Subscription`] is the handle a source gives its observer through
//! `on_subscribe`. Unsubscribing is idempotent, may happen from any thread,
//! and synchronously releases whatever the handle guards (a scheduled task,
//! an inner subscription, a whole coordinator).

use std::{
  fmt::{Debug, Formatter},
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
};

use parking_lot::Mutex;

mod composite;
mod dynamic;
mod serial;
mod set_once;

pub use composite::CompositeSubscription;
pub use dynamic::DynamicSubscriptions;
pub use serial::SerialSubscription;
pub use set_once::SetOnceSubscription;

/// A handle that can be released exactly once.
///
/// Implementations must tolerate repeated and concurrent `unsubscribe` calls:
/// only the first one has an effect.
pub trait Subscription: Send + Sync {
  fn unsubscribe(&self);

  fn is_closed(&self) -> bool;
}

impl<T: Subscription + ?Sized> Subscription for Arc<T> {
  #[inline]
  fn unsubscribe(&self) { (**self).unsubscribe() }

  #[inline]
  fn is_closed(&self) -> bool { (**self).is_closed() }
}

impl<T: Subscription + ?Sized> Subscription for Box<T> {
  #[inline]
  fn unsubscribe(&self) { (**self).unsubscribe() }

  #[inline]
  fn is_closed(&self) -> bool { (**self).is_closed() }
}

// ============================================================================
// SubscriptionHandle
// ============================================================================

/// Type-erased, cheaply cloneable subscription.
///
/// Clones share the same underlying handle, so unsubscribing any clone
/// releases the resource for all of them.
#[derive(Clone)]
pub struct SubscriptionHandle(Arc<dyn Subscription>);

impl SubscriptionHandle {
  pub fn new(subscription: impl Subscription + 'static) -> Self { Self(Arc::new(subscription)) }

  /// A fresh, open handle that guards nothing but its own flag.
  pub fn flag() -> Self { Self::new(BooleanSubscription::default()) }

  /// A handle that is already closed.
  pub fn closed() -> Self {
    let flag = BooleanSubscription::default();
    flag.unsubscribe();
    Self::new(flag)
  }

  /// Run `action` on the first `unsubscribe`.
  pub fn from_fn(action: impl FnOnce() + Send + 'static) -> Self {
    Self::new(ActionSubscription::new(action))
  }

  /// Activates "RAII" behavior: the returned guard unsubscribes when dropped.
  pub fn unsubscribe_when_dropped(self) -> SubscriptionGuard { SubscriptionGuard::new(self) }

  /// Whether both handles share the same underlying subscription.
  pub fn ptr_eq(&self, other: &SubscriptionHandle) -> bool { Arc::ptr_eq(&self.0, &other.0) }
}

impl<T: Subscription + 'static> From<Arc<T>> for SubscriptionHandle {
  fn from(subscription: Arc<T>) -> Self { Self(subscription) }
}

impl Subscription for SubscriptionHandle {
  #[inline]
  fn unsubscribe(&self) { self.0.unsubscribe() }

  #[inline]
  fn is_closed(&self) -> bool { self.0.is_closed() }
}

impl Debug for SubscriptionHandle {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SubscriptionHandle")
      .field("is_closed", &self.is_closed())
      .finish()
  }
}

// ============================================================================
// Leaf subscriptions
// ============================================================================

/// A subscription that only records whether it was released.
#[derive(Debug, Default)]
pub struct BooleanSubscription(AtomicBool);

impl Subscription for BooleanSubscription {
  #[inline]
  fn unsubscribe(&self) { self.0.store(true, Ordering::Release); }

  #[inline]
  fn is_closed(&self) -> bool { self.0.load(Ordering::Acquire) }
}

/// Runs an action the first time it is unsubscribed.
pub struct ActionSubscription {
  action: Mutex<Option<Box<dyn FnOnce() + Send>>>,
  closed: AtomicBool,
}

impl ActionSubscription {
  pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
    Self { action: Mutex::new(Some(Box::new(action))), closed: AtomicBool::new(false) }
  }
}

impl Subscription for ActionSubscription {
  fn unsubscribe(&self) {
    if !self.closed.swap(true, Ordering::AcqRel) {
      let action = self.action.lock().take();
      if let Some(action) = action {
        action();
      }
    }
  }

  fn is_closed(&self) -> bool { self.closed.load(Ordering::Acquire) }
}

// ============================================================================
// SubscriptionGuard
// ============================================================================

/// An RAII implementation of a "scoped subscribed" of a subscription.
/// When this structure is dropped (falls out of scope), the subscription will
/// be unsubscribed.
///
/// If you want to drop it immediately, wrap it in its own scope
#[derive(Debug)]
#[must_use]
pub struct SubscriptionGuard(Option<SubscriptionHandle>);

impl SubscriptionGuard {
  pub fn new(subscription: SubscriptionHandle) -> Self { SubscriptionGuard(Some(subscription)) }

  /// Give up the guard without unsubscribing.
  pub fn into_inner(mut self) -> SubscriptionHandle {
    self
      .0
      .take()
      .unwrap_or_else(SubscriptionHandle::closed)
  }
}

impl Drop for SubscriptionGuard {
  #[inline]
  fn drop(&mut self) {
    if let Some(handle) = self.0.take() {
      handle.unsubscribe();
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::AtomicUsize;

  use super::*;

  #[rxmaybe_macro::test]
  fn action_runs_once() {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    let handle = SubscriptionHandle::from_fn(move || {
      c.fetch_add(1, Ordering::SeqCst);
    });

    assert!(!handle.is_closed());
    handle.unsubscribe();
    handle.clone().unsubscribe();
    handle.unsubscribe();
    assert!(handle.is_closed());
    assert_eq!(count.load(Ordering::SeqCst), 1);
  }

  #[rxmaybe_macro::test]
  fn action_runs_once_across_threads() {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    let handle = SubscriptionHandle::from_fn(move || {
      c.fetch_add(1, Ordering::SeqCst);
    });

    let threads: Vec<_> = (0..8)
      .map(|_| {
        let handle = handle.clone();
        std::thread::spawn(move || handle.unsubscribe())
      })
      .collect();
    for t in threads {
      t.join().unwrap();
    }
    assert_eq!(count.load(Ordering::SeqCst), 1);
  }

  #[rxmaybe_macro::test]
  fn closed_handle() {
    assert!(SubscriptionHandle::closed().is_closed());
    assert!(!SubscriptionHandle::flag().is_closed());
  }

  #[rxmaybe_macro::test]
  fn guard_unsubscribes_on_drop() {
    let handle = SubscriptionHandle::flag();
    {
      let _guard = handle.clone().unsubscribe_when_dropped();
      assert!(!handle.is_closed());
    }
    assert!(handle.is_closed());
  }

  #[rxmaybe_macro::test]
  fn guard_into_inner_keeps_subscription() {
    let handle = SubscriptionHandle::flag();
    let inner = handle.clone().unsubscribe_when_dropped().into_inner();
    assert!(!handle.is_closed());
    assert!(inner.ptr_eq(&handle));
  }
}
