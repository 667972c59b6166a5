//! Maybe factories
//!
//! Constructors for the leaf sources every pipeline starts from. They live
//! as associated functions on [`Maybe`], so a pipeline reads as
//! `Maybe::just(1).map(..)`.
//!
//! ## Trivial sources
//!
//! | Method | Signal on subscribe |
//! |--------|---------------------|
//! | `just(v)` | success with a clone of `v` |
//! | `empty()` | completion without a value |
//! | `never()` | nothing, until unsubscribed |
//! | `error(e)` | the error `e` |
//!
//! ```rust
//! use rxmaybe::prelude::*;
//!
//! let test = TestMaybeObserver::new();
//! Maybe::<i32>::empty().subscribe_with(test.clone());
//! test.assert_empty();
//! ```
//!
//! ## Computed sources
//!
//! `from_fn`, `defer` and `create` run user code on every subscription, which
//! is what makes `retry` and `repeat` meaningful for them: each resubscription
//! performs the work again.

use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};

use parking_lot::Mutex;

use crate::{
  error::MaybeError,
  maybe::{Maybe, MaybeSource},
  observer::{BoxedMaybeObserver, MaybeObserver},
  subscription::{SerialSubscription, Subscription, SubscriptionHandle},
};

impl<Item: Send + 'static> Maybe<Item> {
  /// Succeeds with a clone of `value` on every subscription.
  pub fn just(value: Item) -> Self
  where
    Item: Clone + Sync,
  {
    Self::new(Just(value))
  }

  /// Completes without a value.
  pub fn empty() -> Self { Self::new(Empty) }

  /// Never signals. The subscription stays open until unsubscribed.
  pub fn never() -> Self { Self::new(Never) }

  /// Fails with a clone of `err` on every subscription.
  pub fn error(err: MaybeError) -> Self { Self::new(Fail(err)) }

  /// Runs `f` on every subscription: `Ok(Some(v))` succeeds, `Ok(None)`
  /// completes empty, `Err(e)` fails.
  ///
  /// ```rust
  /// use rxmaybe::prelude::*;
  ///
  /// let parsed = Maybe::from_fn(|| "42".parse::<i32>().map(Some).map_err(MaybeError::new));
  /// assert_eq!(parsed.block_for_result().unwrap(), Some(42));
  /// ```
  pub fn from_fn<F>(f: F) -> Self
  where
    F: Fn() -> Result<Option<Item>, MaybeError> + Send + Sync + 'static,
  {
    Self::new(FromFn(f))
  }

  /// Builds a fresh source for every subscription.
  ///
  /// A factory error is delivered to the subscriber as the terminal error.
  pub fn defer<F>(factory: F) -> Self
  where
    F: Fn() -> Result<Maybe<Item>, MaybeError> + Send + Sync + 'static,
  {
    Self::new(Defer(factory))
  }

  /// Creates a source from a function driving a [`MaybeEmitter`].
  ///
  /// The emitter may be moved to another thread and signal later; only the
  /// first terminal signal is delivered.
  ///
  /// ```rust
  /// use rxmaybe::prelude::*;
  ///
  /// let source = Maybe::create(|emitter: MaybeEmitter<i32>| {
  ///   std::thread::spawn(move || emitter.success(1));
  /// });
  /// assert_eq!(source.block_for_result().unwrap(), Some(1));
  /// ```
  pub fn create<F>(producer: F) -> Self
  where
    F: Fn(MaybeEmitter<Item>) + Send + Sync + 'static,
  {
    Self::new(Create(producer))
  }
}

// ============================================================================
// Trivial sources
// ============================================================================

struct Just<Item>(Item);

impl<Item: Clone + Send + Sync> MaybeSource<Item> for Just<Item> {
  fn subscribe(&self, mut observer: BoxedMaybeObserver<Item>) {
    let flag = SubscriptionHandle::flag();
    observer.on_subscribe(flag.clone());
    if !flag.is_closed() {
      observer.on_success(self.0.clone());
    }
  }
}

struct Empty;

impl<Item> MaybeSource<Item> for Empty {
  fn subscribe(&self, mut observer: BoxedMaybeObserver<Item>) {
    let flag = SubscriptionHandle::flag();
    observer.on_subscribe(flag.clone());
    if !flag.is_closed() {
      observer.on_complete();
    }
  }
}

struct Never;

impl<Item: 'static> MaybeSource<Item> for Never {
  fn subscribe(&self, mut observer: BoxedMaybeObserver<Item>) {
    // The observer stays alive until unsubscribed, so whatever waits on it
    // keeps waiting.
    let parked = Arc::new(Mutex::new(None));
    let release = parked.clone();
    let handle = SubscriptionHandle::from_fn(move || drop(release.lock().take()));
    observer.on_subscribe(handle.clone());
    if !handle.is_closed() {
      *parked.lock() = Some(observer);
    }
  }
}

struct Fail(MaybeError);

impl<Item> MaybeSource<Item> for Fail {
  fn subscribe(&self, mut observer: BoxedMaybeObserver<Item>) {
    let flag = SubscriptionHandle::flag();
    observer.on_subscribe(flag.clone());
    if !flag.is_closed() {
      observer.on_error(self.0.clone());
    }
  }
}

// ============================================================================
// Computed sources
// ============================================================================

struct FromFn<F>(F);

impl<Item, F> MaybeSource<Item> for FromFn<F>
where
  F: Fn() -> Result<Option<Item>, MaybeError> + Send + Sync,
{
  fn subscribe(&self, mut observer: BoxedMaybeObserver<Item>) {
    let flag = SubscriptionHandle::flag();
    observer.on_subscribe(flag.clone());
    if flag.is_closed() {
      return;
    }
    match (self.0)() {
      Ok(Some(v)) => observer.on_success(v),
      Ok(None) => observer.on_complete(),
      Err(err) => observer.on_error(err),
    }
  }
}

struct Defer<F>(F);

impl<Item, F> MaybeSource<Item> for Defer<F>
where
  F: Fn() -> Result<Maybe<Item>, MaybeError> + Send + Sync,
{
  fn subscribe(&self, mut observer: BoxedMaybeObserver<Item>) {
    match (self.0)() {
      Ok(source) => source.subscribe(observer),
      Err(err) => {
        observer.on_subscribe(SubscriptionHandle::flag());
        observer.on_error(err);
      }
    }
  }
}

struct Create<F>(F);

impl<Item, F> MaybeSource<Item> for Create<F>
where
  Item: Send + 'static,
  F: Fn(MaybeEmitter<Item>) + Send + Sync,
{
  fn subscribe(&self, mut observer: BoxedMaybeObserver<Item>) {
    let state = Arc::new(EmitterState {
      observer: Mutex::new(None),
      closed: AtomicBool::new(false),
      cancel: SerialSubscription::new(),
    });
    observer.on_subscribe(state.clone().into());
    if state.is_closed() {
      return;
    }
    *state.observer.lock() = Some(observer);
    (self.0)(MaybeEmitter(state));
  }
}

/// The producer side handed to [`Maybe::create`].
///
/// Only the first terminal call has an effect; calls after the downstream
/// unsubscribed are ignored.
pub struct MaybeEmitter<Item>(Arc<EmitterState<Item>>);

impl<Item> Clone for MaybeEmitter<Item> {
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

struct EmitterState<Item> {
  observer: Mutex<Option<BoxedMaybeObserver<Item>>>,
  closed: AtomicBool,
  cancel: SerialSubscription,
}

impl<Item> MaybeEmitter<Item> {
  pub fn success(&self, value: Item) {
    if let Some(observer) = self.0.finish() {
      observer.on_success(value);
    }
  }

  pub fn error(&self, err: MaybeError) {
    if let Some(observer) = self.0.finish() {
      observer.on_error(err);
    }
  }

  pub fn complete(&self) {
    if let Some(observer) = self.0.finish() {
      observer.on_complete();
    }
  }

  /// Forward a computed outcome: `Ok(Some)` succeeds, `Ok(None)` completes.
  pub fn emit(&self, outcome: Result<Option<Item>, MaybeError>) {
    match outcome {
      Ok(Some(v)) => self.success(v),
      Ok(None) => self.complete(),
      Err(err) => self.error(err),
    }
  }

  /// Whether the downstream went away or a terminal signal was sent.
  pub fn is_disposed(&self) -> bool { self.0.closed.load(Ordering::Acquire) }

  /// Release `resource` when the downstream unsubscribes or a terminal
  /// signal is sent.
  pub fn set_cancellation(&self, resource: SubscriptionHandle) { self.0.cancel.replace(resource) }
}

impl<Item> EmitterState<Item> {
  fn finish(&self) -> Option<BoxedMaybeObserver<Item>> {
    if self.closed.swap(true, Ordering::AcqRel) {
      return None;
    }
    let observer = self.observer.lock().take();
    self.cancel.unsubscribe();
    observer
  }
}

impl<Item: Send> Subscription for EmitterState<Item> {
  fn unsubscribe(&self) {
    // Dropping the observer releases everything the downstream holds.
    drop(self.finish());
  }

  fn is_closed(&self) -> bool { self.closed.load(Ordering::Acquire) }
}
