use parking_lot::Mutex;

use super::{Subscription, SubscriptionHandle};

enum SetOnceState {
  Empty,
  Set(SubscriptionHandle),
  Closed,
}

/// A slot that accepts its subscription at most once.
///
/// Coordinators hand one of these to every inner observer before subscribing
/// it. If the coordinator is unsubscribed before the inner source acknowledges
/// with `on_subscribe`, the late handle is released on arrival instead of
/// leaking.
pub struct SetOnceSubscription {
  state: Mutex<SetOnceState>,
}

impl Default for SetOnceSubscription {
  fn default() -> Self { Self { state: Mutex::new(SetOnceState::Empty) } }
}

impl SetOnceSubscription {
  pub fn new() -> Self { Self::default() }

  /// Store `handle`. Returns `false` if the slot already held a handle or was
  /// closed; a handle arriving after close is unsubscribed immediately.
  pub fn set(&self, handle: SubscriptionHandle) -> bool {
    let mut state = self.state.lock();
    match &*state {
      SetOnceState::Empty => {
        *state = SetOnceState::Set(handle);
        true
      }
      SetOnceState::Set(_) => {
        drop(state);
        tracing::warn!("on_subscribe called more than once, releasing the extra handle");
        handle.unsubscribe();
        false
      }
      SetOnceState::Closed => {
        drop(state);
        handle.unsubscribe();
        false
      }
    }
  }
}

impl Subscription for SetOnceSubscription {
  fn unsubscribe(&self) {
    let prev = std::mem::replace(&mut *self.state.lock(), SetOnceState::Closed);
    if let SetOnceState::Set(handle) = prev {
      handle.unsubscribe();
    }
  }

  fn is_closed(&self) -> bool {
    match &*self.state.lock() {
      SetOnceState::Empty => false,
      SetOnceState::Set(handle) => handle.is_closed(),
      SetOnceState::Closed => true,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[rxmaybe_macro::test]
  fn releases_late_handle() {
    let slot = SetOnceSubscription::new();
    slot.unsubscribe();

    let late = SubscriptionHandle::flag();
    assert!(!slot.set(late.clone()));
    assert!(late.is_closed());
  }

  #[rxmaybe_macro::test]
  fn second_set_is_rejected() {
    let slot = SetOnceSubscription::new();
    let first = SubscriptionHandle::flag();
    let second = SubscriptionHandle::flag();
    assert!(slot.set(first.clone()));
    assert!(!slot.set(second.clone()));
    assert!(second.is_closed());
    assert!(!first.is_closed());

    slot.unsubscribe();
    assert!(first.is_closed());
    assert!(slot.is_closed());
  }
}
