//! Observer traits and implementations
//!
//! Two observer shapes exist:
//!
//! - [`MaybeObserver`] consumes a Maybe source: `on_subscribe` at most once
//!   and first, then exactly one of `on_success`, `on_error`, `on_complete`.
//! - [`FlowObserver`] consumes a push stream: `on_subscribe`, any number of
//!   `on_next`, then at most one of `on_error` / `on_complete`.
//!
//! Terminal callbacks take `self` by value, so an observer value can never be
//! terminated twice. Coordinators that share a downstream across threads keep
//! it in a slot and take it out exactly once.

use crate::{error::MaybeError, subscription::SubscriptionHandle};

// ============================================================================
// MaybeObserver
// ============================================================================

/// The consumer of a Maybe source.
pub trait MaybeObserver<Item>: Send {
  /// Receive the handle that cancels this subscription.
  fn on_subscribe(&mut self, subscription: SubscriptionHandle);

  fn on_success(self, value: Item);

  fn on_error(self, err: MaybeError);

  /// The source terminated without a value.
  fn on_complete(self);
}

/// Object-safe mirror of [`MaybeObserver`].
///
/// `MaybeObserver` takes `self` by value in its terminal methods, which makes
/// it unusable behind `dyn`. This trait adapts those methods to `Box<Self>`
/// receivers so observers can be boxed and passed through `dyn MaybeSource`.
pub trait DynMaybeObserver<Item>: Send {
  fn box_on_subscribe(&mut self, subscription: SubscriptionHandle);
  fn box_on_success(self: Box<Self>, value: Item);
  fn box_on_error(self: Box<Self>, err: MaybeError);
  fn box_on_complete(self: Box<Self>);
}

impl<T, Item> DynMaybeObserver<Item> for T
where
  T: MaybeObserver<Item>,
{
  fn box_on_subscribe(&mut self, subscription: SubscriptionHandle) {
    self.on_subscribe(subscription)
  }
  fn box_on_success(self: Box<Self>, value: Item) { (*self).on_success(value) }
  fn box_on_error(self: Box<Self>, err: MaybeError) { (*self).on_error(err) }
  fn box_on_complete(self: Box<Self>) { (*self).on_complete() }
}

/// Boxed Maybe observer, the form every `MaybeSource` receives.
pub type BoxedMaybeObserver<Item> = Box<dyn DynMaybeObserver<Item>>;

impl<Item> MaybeObserver<Item> for BoxedMaybeObserver<Item> {
  #[inline]
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) {
    (**self).box_on_subscribe(subscription)
  }

  #[inline]
  fn on_success(self, value: Item) { self.box_on_success(value) }

  #[inline]
  fn on_error(self, err: MaybeError) { self.box_on_error(err) }

  #[inline]
  fn on_complete(self) { self.box_on_complete() }
}

// ============================================================================
// FlowObserver
// ============================================================================

/// The consumer of a push stream of zero or more items.
pub trait FlowObserver<Item>: Send {
  fn on_subscribe(&mut self, subscription: SubscriptionHandle);

  fn on_next(&mut self, value: Item);

  fn on_error(self, err: MaybeError);

  fn on_complete(self);
}

/// Object-safe mirror of [`FlowObserver`].
pub trait DynFlowObserver<Item>: Send {
  fn box_on_subscribe(&mut self, subscription: SubscriptionHandle);
  fn box_on_next(&mut self, value: Item);
  fn box_on_error(self: Box<Self>, err: MaybeError);
  fn box_on_complete(self: Box<Self>);
}

impl<T, Item> DynFlowObserver<Item> for T
where
  T: FlowObserver<Item>,
{
  fn box_on_subscribe(&mut self, subscription: SubscriptionHandle) {
    self.on_subscribe(subscription)
  }
  fn box_on_next(&mut self, value: Item) { self.on_next(value) }
  fn box_on_error(self: Box<Self>, err: MaybeError) { (*self).on_error(err) }
  fn box_on_complete(self: Box<Self>) { (*self).on_complete() }
}

/// Boxed flow observer, the form every `FlowSource` receives.
pub type BoxedFlowObserver<Item> = Box<dyn DynFlowObserver<Item>>;

impl<Item> FlowObserver<Item> for BoxedFlowObserver<Item> {
  #[inline]
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) {
    (**self).box_on_subscribe(subscription)
  }

  #[inline]
  fn on_next(&mut self, value: Item) { (**self).box_on_next(value) }

  #[inline]
  fn on_error(self, err: MaybeError) { self.box_on_error(err) }

  #[inline]
  fn on_complete(self) { self.box_on_complete() }
}

// ============================================================================
// Closure adapters
// ============================================================================

/// Maybe observer built from three closures.
///
/// The subscription handle is ignored; callers that need it use
/// `Maybe::subscribe_callbacks`, which captures it separately.
pub struct FnMaybeObserver<S, E, C> {
  pub success: S,
  pub error: E,
  pub complete: C,
}

impl<Item, S, E, C> MaybeObserver<Item> for FnMaybeObserver<S, E, C>
where
  S: FnOnce(Item) + Send,
  E: FnOnce(MaybeError) + Send,
  C: FnOnce() + Send,
{
  fn on_subscribe(&mut self, _subscription: SubscriptionHandle) {}

  fn on_success(self, value: Item) { (self.success)(value) }

  fn on_error(self, err: MaybeError) { (self.error)(err) }

  fn on_complete(self) { (self.complete)() }
}

/// Flow observer built from three closures.
pub struct FnFlowObserver<N, E, C> {
  pub next: N,
  pub error: E,
  pub complete: C,
}

impl<Item, N, E, C> FlowObserver<Item> for FnFlowObserver<N, E, C>
where
  N: FnMut(Item) + Send,
  E: FnOnce(MaybeError) + Send,
  C: FnOnce() + Send,
{
  fn on_subscribe(&mut self, _subscription: SubscriptionHandle) {}

  fn on_next(&mut self, value: Item) { (self.next)(value) }

  fn on_error(self, err: MaybeError) { (self.error)(err) }

  fn on_complete(self) { (self.complete)() }
}

/// Forwards a Maybe signal to a flow observer: a success becomes one item
/// followed by completion.
pub(crate) struct MaybeToFlowObserver<O>(pub(crate) O);

impl<Item, O> MaybeObserver<Item> for MaybeToFlowObserver<O>
where
  O: FlowObserver<Item>,
{
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) { self.0.on_subscribe(subscription) }

  fn on_success(mut self, value: Item) {
    self.0.on_next(value);
    self.0.on_complete();
  }

  fn on_error(self, err: MaybeError) { self.0.on_error(err) }

  fn on_complete(self) { self.0.on_complete() }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use super::*;

  #[rxmaybe_macro::test]
  fn boxed_observer_forwards_terminal() {
    let seen = Arc::new(Mutex::new(None));
    let s = seen.clone();
    let observer: BoxedMaybeObserver<i32> = Box::new(FnMaybeObserver {
      success: move |v: i32| *s.lock().unwrap() = Some(v),
      error: |_: MaybeError| {},
      complete: || {},
    });

    observer.on_success(7);
    assert_eq!(*seen.lock().unwrap(), Some(7));
  }

  #[rxmaybe_macro::test]
  fn maybe_to_flow_emits_item_then_completes() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (n, c) = (log.clone(), log.clone());
    let flow = FnFlowObserver {
      next: move |v: i32| n.lock().unwrap().push(format!("next {v}")),
      error: |_: MaybeError| {},
      complete: move || c.lock().unwrap().push("complete".to_owned()),
    };

    MaybeToFlowObserver(flow).on_success(3);
    assert_eq!(*log.lock().unwrap(), vec!["next 3", "complete"]);
  }
}
