use std::{
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
  time::Duration,
};

use crate::{
  error::MaybeError,
  maybe::{Maybe, MaybeSource},
  observer::{BoxedMaybeObserver, MaybeObserver},
  scheduler::{Scheduler, SharedScheduler},
  subscription::{SetOnceSubscription, Subscription, SubscriptionHandle},
};

impl<Item: Send + 'static> Maybe<Item> {
  /// Release the upstream from a task on `scheduler` when the downstream
  /// disposes.
  ///
  /// Signals pass through unchanged; only the upstream `unsubscribe` call is
  /// moved, which helps when releasing the upstream is slow or must happen on
  /// a particular thread.
  pub fn unsubscribe_on(&self, scheduler: impl Scheduler + 'static) -> Maybe<Item> {
    Maybe::new(UnsubscribeOnOp { source: self.clone(), scheduler: Arc::new(scheduler) })
  }
}

struct UnsubscribeOnOp<Item> {
  source: Maybe<Item>,
  scheduler: SharedScheduler,
}

impl<Item: Send + 'static> MaybeSource<Item> for UnsubscribeOnOp<Item> {
  fn subscribe(&self, observer: BoxedMaybeObserver<Item>) {
    let state = Arc::new(UnsubscribeOnState {
      upstream: Arc::new(SetOnceSubscription::new()),
      disposed: AtomicBool::new(false),
      scheduler: self.scheduler.clone(),
    });
    self.source.subscribe(Box::new(UnsubscribeOnObserver { observer, state }));
  }
}

struct UnsubscribeOnState {
  upstream: Arc<SetOnceSubscription>,
  disposed: AtomicBool,
  scheduler: SharedScheduler,
}

impl Subscription for UnsubscribeOnState {
  fn unsubscribe(&self) {
    if !self.disposed.swap(true, Ordering::AcqRel) {
      let upstream = self.upstream.clone();
      self
        .scheduler
        .schedule(Duration::ZERO, Box::new(move || upstream.unsubscribe()));
    }
  }

  fn is_closed(&self) -> bool { self.disposed.load(Ordering::Acquire) }
}

struct UnsubscribeOnObserver<O> {
  observer: O,
  state: Arc<UnsubscribeOnState>,
}

impl<Item, O: MaybeObserver<Item>> MaybeObserver<Item> for UnsubscribeOnObserver<O> {
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) {
    self.state.upstream.set(subscription);
    self.observer.on_subscribe(self.state.clone().into());
  }

  fn on_success(self, value: Item) { self.observer.on_success(value) }

  fn on_error(self, err: MaybeError) { self.observer.on_error(err) }

  fn on_complete(self) { self.observer.on_complete() }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{scheduler::TestScheduler, subject::MaybeSubject, testing::TestMaybeObserver};

  #[rxmaybe_macro::test]
  fn upstream_is_released_on_the_scheduler() {
    let scheduler = TestScheduler::new();
    let subject = MaybeSubject::<i32>::new();
    let test = TestMaybeObserver::new();
    subject
      .to_maybe()
      .unsubscribe_on(scheduler.clone())
      .subscribe_with(test.clone());

    test.dispose();
    assert!(subject.has_observers());
    scheduler.flush();
    assert!(!subject.has_observers());
  }

  #[rxmaybe_macro::test]
  fn signals_pass_through() {
    let scheduler = TestScheduler::new();
    let test = TestMaybeObserver::new();
    Maybe::just(2)
      .unsubscribe_on(scheduler.clone())
      .subscribe_with(test.clone());
    test.assert_value(2);
    assert_eq!(scheduler.pending_count(), 0);
  }
}
