//! Delay operator
//!
//! Shifts the success value and the empty completion by a fixed duration on
//! a scheduler. Errors are delivered as soon as they arrive.
//!
//! ```rust
//! use std::time::Duration;
//! use rxmaybe::prelude::*;
//!
//! let value = Maybe::just(1)
//!   .delay(Duration::from_millis(5), ThreadScheduler)
//!   .block_for_result();
//! assert_eq!(value.unwrap(), Some(1));
//! ```

use std::{
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
  time::Duration,
};

use crate::{
  coordinator::MaybeDownstream,
  error::MaybeError,
  maybe::{Maybe, MaybeSource},
  observer::{BoxedMaybeObserver, MaybeObserver},
  scheduler::{Scheduler, SharedScheduler},
  subscription::{SetOnceSubscription, Subscription, SubscriptionHandle},
};

impl<Item: Send + 'static> Maybe<Item> {
  /// Deliver the success value or the empty completion `delay` later.
  pub fn delay(&self, delay: Duration, scheduler: impl Scheduler + 'static) -> Maybe<Item> {
    Maybe::new(DelayOp {
      source: self.clone(),
      delay,
      scheduler: Arc::new(scheduler),
      delay_error: false,
    })
  }
}

/// Hands the terminal signal to the scheduler. `observe_on` is the zero
/// delay variant that moves errors as well.
pub(crate) struct DelayOp<Item> {
  pub(crate) source: Maybe<Item>,
  pub(crate) delay: Duration,
  pub(crate) scheduler: SharedScheduler,
  pub(crate) delay_error: bool,
}

impl<Item: Send + 'static> MaybeSource<Item> for DelayOp<Item> {
  fn subscribe(&self, mut observer: BoxedMaybeObserver<Item>) {
    let state = Arc::new(DelayState {
      upstream: SetOnceSubscription::new(),
      timer: SetOnceSubscription::new(),
      disposed: AtomicBool::new(false),
      downstream: MaybeDownstream::new(),
    });
    observer.on_subscribe(state.clone().into());
    if state.is_closed() {
      return;
    }
    state.downstream.set(observer);
    self.source.subscribe(Box::new(DelayObserver {
      state,
      delay: self.delay,
      scheduler: self.scheduler.clone(),
      delay_error: self.delay_error,
    }));
  }
}

struct DelayState<Item> {
  upstream: SetOnceSubscription,
  timer: SetOnceSubscription,
  disposed: AtomicBool,
  downstream: MaybeDownstream<Item>,
}

impl<Item: Send> Subscription for DelayState<Item> {
  fn unsubscribe(&self) {
    if !self.disposed.swap(true, Ordering::AcqRel) {
      self.upstream.unsubscribe();
      self.timer.unsubscribe();
      self.downstream.clear();
    }
  }

  fn is_closed(&self) -> bool { self.disposed.load(Ordering::Acquire) }
}

struct DelayObserver<Item> {
  state: Arc<DelayState<Item>>,
  delay: Duration,
  scheduler: SharedScheduler,
  delay_error: bool,
}

impl<Item: Send + 'static> DelayObserver<Item> {
  fn later(self, deliver: impl FnOnce(&MaybeDownstream<Item>) + Send + 'static) {
    let state = self.state.clone();
    let timer = self
      .scheduler
      .schedule(self.delay, Box::new(move || deliver(&state.downstream)));
    self.state.timer.set(timer);
  }
}

impl<Item: Send + 'static> MaybeObserver<Item> for DelayObserver<Item> {
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) {
    self.state.upstream.set(subscription);
  }

  fn on_success(self, value: Item) { self.later(move |downstream| downstream.success(value)) }

  fn on_error(self, err: MaybeError) {
    if self.delay_error {
      self.later(move |downstream| downstream.error(err))
    } else {
      self.state.downstream.error(err)
    }
  }

  fn on_complete(self) { self.later(|downstream| downstream.complete()) }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{scheduler::TestScheduler, testing::TestMaybeObserver};

  const DELAY: Duration = Duration::from_millis(100);

  #[rxmaybe_macro::test]
  fn success_is_shifted() {
    let scheduler = TestScheduler::new();
    let test = TestMaybeObserver::new();
    Maybe::just(1)
      .delay(DELAY, scheduler.clone())
      .subscribe_with(test.clone());

    scheduler.advance_by(Duration::from_millis(99));
    test.assert_not_terminated();
    scheduler.advance_by(Duration::from_millis(1));
    test.assert_value(1);
  }

  #[rxmaybe_macro::test]
  fn empty_is_shifted() {
    let scheduler = TestScheduler::new();
    let test = TestMaybeObserver::<i32>::new();
    Maybe::empty()
      .delay(DELAY, scheduler.clone())
      .subscribe_with(test.clone());
    test.assert_not_terminated();
    scheduler.flush();
    test.assert_empty();
  }

  #[rxmaybe_macro::test]
  fn error_is_not_delayed() {
    let scheduler = TestScheduler::new();
    let test = TestMaybeObserver::<i32>::new();
    Maybe::error(MaybeError::msg("now"))
      .delay(DELAY, scheduler.clone())
      .subscribe_with(test.clone());
    test.assert_error_message("now");
    assert_eq!(scheduler.pending_count(), 0);
  }

  #[rxmaybe_macro::test]
  fn dispose_cancels_pending_delivery() {
    let scheduler = TestScheduler::new();
    let test = TestMaybeObserver::new();
    Maybe::just(1)
      .delay(DELAY, scheduler.clone())
      .subscribe_with(test.clone());
    assert_eq!(scheduler.pending_count(), 1);

    test.dispose();
    assert_eq!(scheduler.pending_count(), 0);
    scheduler.flush();
    test.assert_not_terminated();
  }
}
