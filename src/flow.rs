//! Push streams of zero or more items.
//!
//! [`Flow`] is the output of the combinators that turn many Maybe sources
//! into a sequence (`concat`, `merge`, `flat_map`, `repeat`...), and the
//! input of the mapping combinators that turn a sequence back into inner
//! Maybe sources.

use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};

use parking_lot::Mutex;

use crate::{
  error::MaybeError,
  observer::{BoxedFlowObserver, FlowObserver, FnFlowObserver},
  subscription::{SerialSubscription, SetOnceSubscription, Subscription, SubscriptionHandle},
};

/// A producer of a sequence of items followed by at most one terminal signal.
pub trait FlowSource<Item>: Send + Sync {
  fn subscribe(&self, observer: BoxedFlowObserver<Item>);
}

/// Shared handle to a [`FlowSource`].
pub struct Flow<Item>(Arc<dyn FlowSource<Item>>);

impl<Item> Clone for Flow<Item> {
  #[inline]
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<Item> FlowSource<Item> for Flow<Item> {
  #[inline]
  fn subscribe(&self, observer: BoxedFlowObserver<Item>) { self.0.subscribe(observer) }
}

impl<Item: Send + 'static> Flow<Item> {
  pub fn new(source: impl FlowSource<Item> + 'static) -> Self { Self(Arc::new(source)) }

  pub fn subscribe_with(&self, observer: impl FlowObserver<Item> + 'static) {
    self.0.subscribe(Box::new(observer))
  }

  /// Subscribe with closures and get back the cancellation handle.
  pub fn subscribe_callbacks<N, E, C>(&self, next: N, error: E, complete: C) -> SubscriptionHandle
  where
    N: FnMut(Item) + Send + 'static,
    E: FnOnce(MaybeError) + Send + 'static,
    C: FnOnce() + Send + 'static,
  {
    let slot = Arc::new(SetOnceSubscription::new());
    self.subscribe_with(CaptureFlowHandle {
      slot: slot.clone(),
      inner: FnFlowObserver { next, error, complete },
    });
    slot.into()
  }

  /// Emit every item of `items`, then complete.
  ///
  /// The iterable is cloned for each subscription.
  pub fn from_iter<I>(items: I) -> Self
  where
    I: IntoIterator<Item = Item> + Clone + Send + Sync + 'static,
  {
    Self::new(FromIter(items))
  }

  pub fn empty() -> Self { Self::from_iter(std::iter::empty()) }

  pub fn error(err: MaybeError) -> Self { Self::new(FlowError(err)) }

  /// Build a flow from a function driving a [`FlowEmitter`].
  ///
  /// ```rust
  /// use rxmaybe::prelude::*;
  ///
  /// let flow = Flow::create(|emitter: FlowEmitter<i32>| {
  ///   emitter.next(1);
  ///   emitter.next(2);
  ///   emitter.complete();
  /// });
  /// let test = TestFlowObserver::new();
  /// flow.subscribe_with(test.clone());
  /// test.assert_values(&[1, 2]);
  /// test.assert_completed();
  /// ```
  pub fn create<F>(producer: F) -> Self
  where
    F: Fn(FlowEmitter<Item>) + Send + Sync + 'static,
  {
    Self::new(FlowCreate(producer))
  }
}

struct CaptureFlowHandle<O> {
  slot: Arc<SetOnceSubscription>,
  inner: O,
}

impl<Item, O: FlowObserver<Item>> FlowObserver<Item> for CaptureFlowHandle<O> {
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) {
    self.slot.set(subscription.clone());
    self.inner.on_subscribe(subscription);
  }

  fn on_next(&mut self, value: Item) { self.inner.on_next(value) }

  fn on_error(self, err: MaybeError) { self.inner.on_error(err) }

  fn on_complete(self) { self.inner.on_complete() }
}

struct FromIter<I>(I);

impl<Item, I> FlowSource<Item> for FromIter<I>
where
  I: IntoIterator<Item = Item> + Clone + Send + Sync,
{
  fn subscribe(&self, mut observer: BoxedFlowObserver<Item>) {
    let flag = SubscriptionHandle::flag();
    observer.on_subscribe(flag.clone());
    for v in self.0.clone() {
      if flag.is_closed() {
        return;
      }
      observer.on_next(v);
    }
    if !flag.is_closed() {
      observer.on_complete();
    }
  }
}

struct FlowError(MaybeError);

impl<Item> FlowSource<Item> for FlowError {
  fn subscribe(&self, mut observer: BoxedFlowObserver<Item>) {
    observer.on_subscribe(SubscriptionHandle::flag());
    observer.on_error(self.0.clone());
  }
}

struct FlowCreate<F>(F);

impl<Item, F> FlowSource<Item> for FlowCreate<F>
where
  Item: Send + 'static,
  F: Fn(FlowEmitter<Item>) + Send + Sync,
{
  fn subscribe(&self, mut observer: BoxedFlowObserver<Item>) {
    let state = Arc::new(FlowEmitterState {
      observer: Mutex::new(None),
      pending: Mutex::new(None),
      closed: AtomicBool::new(false),
      cancel: SerialSubscription::new(),
    });
    observer.on_subscribe(state.clone().into());
    if state.is_closed() {
      return;
    }
    *state.observer.lock() = Some(observer);
    (self.0)(FlowEmitter(state));
  }
}

// ============================================================================
// FlowEmitter
// ============================================================================

/// The producer side handed to [`Flow::create`].
///
/// Calls after a terminal signal or after the downstream unsubscribed are
/// ignored. The emitter is cloneable so producers may move it across
/// threads, but callers must not emit concurrently.
pub struct FlowEmitter<Item>(Arc<FlowEmitterState<Item>>);

impl<Item> Clone for FlowEmitter<Item> {
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

struct FlowEmitterState<Item> {
  observer: Mutex<Option<BoxedFlowObserver<Item>>>,
  /// Terminal signal raised from inside `on_next`, delivered once it returns.
  pending: Mutex<Option<Option<MaybeError>>>,
  closed: AtomicBool,
  cancel: SerialSubscription,
}

impl<Item: Send> FlowEmitter<Item> {
  pub fn next(&self, value: Item) {
    if self.0.is_closed() {
      return;
    }
    // The observer is taken out for the call so a reentrant emission finds
    // the slot empty instead of deadlocking.
    let observer = self.0.observer.lock().take();
    let Some(mut observer) = observer else { return };
    observer.on_next(value);
    if !self.0.is_closed() {
      *self.0.observer.lock() = Some(observer);
      return;
    }
    match self.0.pending.lock().take() {
      Some(Some(err)) => observer.on_error(err),
      Some(None) => observer.on_complete(),
      None => {}
    }
  }

  pub fn error(&self, err: MaybeError) { self.0.finish(Some(err)) }

  pub fn complete(&self) { self.0.finish(None) }

  /// Whether the downstream went away or a terminal signal was sent.
  pub fn is_disposed(&self) -> bool { self.0.is_closed() }

  /// Release `resource` when the downstream unsubscribes.
  pub fn set_cancellation(&self, resource: SubscriptionHandle) { self.0.cancel.replace(resource) }
}

impl<Item> FlowEmitterState<Item> {
  fn finish(&self, terminal: Option<MaybeError>) {
    if self.closed.swap(true, Ordering::AcqRel) {
      return;
    }
    let observer = self.observer.lock().take();
    match (observer, terminal) {
      (Some(observer), Some(err)) => observer.on_error(err),
      (Some(observer), None) => observer.on_complete(),
      (None, terminal) => *self.pending.lock() = Some(terminal),
    }
    self.cancel.unsubscribe();
  }
}

impl<Item: Send> Subscription for FlowEmitterState<Item> {
  fn unsubscribe(&self) {
    if !self.closed.swap(true, Ordering::AcqRel) {
      let observer = self.observer.lock().take();
      drop(observer);
      self.cancel.unsubscribe();
    }
  }

  fn is_closed(&self) -> bool { self.closed.load(Ordering::Acquire) }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::TestFlowObserver;

  #[rxmaybe_macro::test]
  fn from_iter_is_cold() {
    let flow = Flow::from_iter(vec![1, 2, 3]);
    for _ in 0..2 {
      let test = TestFlowObserver::new();
      flow.subscribe_with(test.clone());
      test.assert_values(&[1, 2, 3]);
      test.assert_completed();
    }
  }

  #[rxmaybe_macro::test]
  fn emitter_ignores_signals_after_terminal() {
    let flow = Flow::create(|emitter: FlowEmitter<i32>| {
      emitter.next(1);
      emitter.complete();
      emitter.next(2);
      emitter.error(MaybeError::msg("late"));
    });
    let test = TestFlowObserver::new();
    flow.subscribe_with(test.clone());
    test.assert_values(&[1]);
    test.assert_completed();
  }

  #[rxmaybe_macro::test]
  fn emitter_releases_resource_on_unsubscribe() {
    let resource = SubscriptionHandle::flag();
    let r = resource.clone();
    let emitter_slot = Arc::new(Mutex::new(None));
    let slot = emitter_slot.clone();
    let flow = Flow::create(move |emitter: FlowEmitter<i32>| {
      emitter.set_cancellation(r.clone());
      *slot.lock() = Some(emitter);
    });

    let handle = flow.subscribe_callbacks(|_| {}, |_| {}, || {});
    assert!(!resource.is_closed());
    handle.unsubscribe();
    assert!(resource.is_closed());
    let emitter = emitter_slot.lock().take().unwrap();
    assert!(emitter.is_disposed());
  }
}
