//! Conversions between [`Maybe`] and [`Flow`].
//!
//! `to_flow` emits the success value as the only item; `first_or_empty`
//! takes the first item of a flow and releases the rest of it.

use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};

use crate::{
  coordinator::MaybeDownstream,
  error::MaybeError,
  flow::{Flow, FlowSource},
  maybe::{Maybe, MaybeSource},
  observer::{
    BoxedFlowObserver, BoxedMaybeObserver, FlowObserver, MaybeObserver, MaybeToFlowObserver,
  },
  subscription::{SetOnceSubscription, Subscription, SubscriptionHandle},
};

impl<Item: Send + 'static> Maybe<Item> {
  /// A flow of zero or one item followed by the terminal signal.
  pub fn to_flow(&self) -> Flow<Item> { Flow::new(ToFlow(self.clone())) }
}

impl<Item: Send + 'static> Flow<Item> {
  /// Succeed with the first item and release the flow; complete empty when
  /// the flow completes without items.
  pub fn first_or_empty(&self) -> Maybe<Item> { Maybe::new(FirstOrEmpty(self.clone())) }
}

struct ToFlow<Item>(Maybe<Item>);

impl<Item: Send + 'static> FlowSource<Item> for ToFlow<Item> {
  fn subscribe(&self, observer: BoxedFlowObserver<Item>) {
    self.0.subscribe_with(MaybeToFlowObserver(observer))
  }
}

struct FirstOrEmpty<Item>(Flow<Item>);

impl<Item: Send + 'static> MaybeSource<Item> for FirstOrEmpty<Item> {
  fn subscribe(&self, mut observer: BoxedMaybeObserver<Item>) {
    let state = Arc::new(FirstState {
      upstream: SetOnceSubscription::new(),
      disposed: AtomicBool::new(false),
      downstream: MaybeDownstream::new(),
    });
    observer.on_subscribe(state.clone().into());
    if state.is_closed() {
      return;
    }
    state.downstream.set(observer);
    self.0.subscribe_with(FirstObserver(state));
  }
}

struct FirstState<Item> {
  upstream: SetOnceSubscription,
  disposed: AtomicBool,
  downstream: MaybeDownstream<Item>,
}

impl<Item: Send> Subscription for FirstState<Item> {
  fn unsubscribe(&self) {
    if !self.disposed.swap(true, Ordering::AcqRel) {
      self.upstream.unsubscribe();
      self.downstream.clear();
    }
  }

  fn is_closed(&self) -> bool { self.disposed.load(Ordering::Acquire) }
}

struct FirstObserver<Item>(Arc<FirstState<Item>>);

impl<Item: Send> FlowObserver<Item> for FirstObserver<Item> {
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) {
    self.0.upstream.set(subscription);
  }

  fn on_next(&mut self, value: Item) {
    if let Some(observer) = self.0.downstream.take() {
      self.0.upstream.unsubscribe();
      observer.on_success(value);
    }
  }

  fn on_error(self, err: MaybeError) { self.0.downstream.error(err) }

  fn on_complete(self) { self.0.downstream.complete() }
}
