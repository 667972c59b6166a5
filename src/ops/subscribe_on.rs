//! SubscribeOn operator
//!
//! Performs the upstream subscription on a scheduler. Disposing before the
//! scheduled subscription ran cancels it; disposing afterwards releases the
//! upstream.

use std::{sync::Arc, time::Duration};

use crate::{
  error::MaybeError,
  maybe::{CaptureHandle, Maybe, MaybeSource},
  observer::{BoxedMaybeObserver, MaybeObserver},
  scheduler::{Scheduler, SharedScheduler},
  subscription::{SetOnceSubscription, Subscription, SubscriptionHandle},
};

impl<Item: Send + 'static> Maybe<Item> {
  /// Subscribe to the upstream from a task on `scheduler`.
  pub fn subscribe_on(&self, scheduler: impl Scheduler + 'static) -> Maybe<Item> {
    Maybe::new(SubscribeOnOp { source: self.clone(), scheduler: Arc::new(scheduler) })
  }
}

struct SubscribeOnOp<Item> {
  source: Maybe<Item>,
  scheduler: SharedScheduler,
}

impl<Item: Send + 'static> MaybeSource<Item> for SubscribeOnOp<Item> {
  fn subscribe(&self, mut observer: BoxedMaybeObserver<Item>) {
    let state = Arc::new(SubscribeOnState {
      task: SetOnceSubscription::new(),
      upstream: Arc::new(SetOnceSubscription::new()),
    });
    observer.on_subscribe(state.clone().into());
    if state.is_closed() {
      return;
    }

    let source = self.source.clone();
    let slot = state.upstream.clone();
    let task = self.scheduler.schedule(
      Duration::ZERO,
      Box::new(move || source.subscribe_with(CaptureHandle { slot, inner: Forward(observer) })),
    );
    state.task.set(task);
  }
}

/// The scheduled task and the upstream it subscribed live in separate slots,
/// so the upstream handle never races with storing the task handle.
struct SubscribeOnState {
  task: SetOnceSubscription,
  upstream: Arc<SetOnceSubscription>,
}

impl Subscription for SubscribeOnState {
  fn unsubscribe(&self) {
    self.task.unsubscribe();
    self.upstream.unsubscribe();
  }

  fn is_closed(&self) -> bool { self.upstream.is_closed() && self.task.is_closed() }
}

/// Passes signals on but not the upstream handle, which the downstream
/// already received in wrapped form.
struct Forward<O>(O);

impl<Item, O: MaybeObserver<Item>> MaybeObserver<Item> for Forward<O> {
  fn on_subscribe(&mut self, _subscription: SubscriptionHandle) {}

  fn on_success(self, value: Item) { self.0.on_success(value) }

  fn on_error(self, err: MaybeError) { self.0.on_error(err) }

  fn on_complete(self) { self.0.on_complete() }
}
