//! Hot sources driven by hand.
//!
//! A subject is both ends of a pipe: code pushes signals into it and every
//! subscribed observer receives them.
//!
//! - [`MaybeSubject`] delivers one terminal outcome and replays it to late
//!   subscribers.
//! - [`PublishSubject`] multicasts a flow of items to its current observers.
//!
//! Both expose `has_observers()`, which is how tests check that an operator
//! released its upstream.

use std::sync::Weak;

use parking_lot::Mutex;

use crate::subscription::Subscription;

mod maybe_subject;
mod publish_subject;

pub use maybe_subject::MaybeSubject;
pub use publish_subject::PublishSubject;

/// Where a subject subscription removes its observer from.
pub(crate) trait ObserverRegistry: Send + Sync {
  fn remove(&self, id: usize);
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum SubscriptionState {
  /// Handed to the observer, not registered yet.
  Pending,
  /// Registered under this id.
  Ready(usize),
  Cancelled,
}

/// Subscription handle for a subject observer.
///
/// The observer receives the handle before it is registered, so unsubscribing
/// may race with registration; whichever side comes second removes the entry.
pub(crate) struct SubjectSubscription<R> {
  registry: Weak<R>,
  state: Mutex<SubscriptionState>,
}

impl<R: ObserverRegistry> SubjectSubscription<R> {
  pub(crate) fn new(registry: Weak<R>) -> Self {
    Self { registry, state: Mutex::new(SubscriptionState::Pending) }
  }

  /// Record the registration id. Returns `false` when the handle was
  /// cancelled in the meantime; the caller then drops the entry itself.
  pub(crate) fn ready(&self, id: usize) -> bool {
    let mut state = self.state.lock();
    if *state == SubscriptionState::Pending {
      *state = SubscriptionState::Ready(id);
      true
    } else {
      false
    }
  }
}

impl<R: ObserverRegistry> Subscription for SubjectSubscription<R> {
  fn unsubscribe(&self) {
    let prev = std::mem::replace(&mut *self.state.lock(), SubscriptionState::Cancelled);
    if let SubscriptionState::Ready(id) = prev {
      if let Some(registry) = self.registry.upgrade() {
        registry.remove(id);
      }
    }
  }

  fn is_closed(&self) -> bool { *self.state.lock() == SubscriptionState::Cancelled }
}
