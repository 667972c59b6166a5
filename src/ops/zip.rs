//! Zip operator
//!
//! Waits for every source to succeed, then calls the combiner with the
//! collected values (in source order) and emits its result.
//!
//! - Fail-fast: the first empty completion or error terminates the zip and
//!   disposes every other source.
//! - Delay-errors: every source runs to its end. Recorded errors win, then an
//!   empty completion, and only then the combiner runs.
//!
//! No sources is an [`MaybeError::OutOfRange`] error; a single source is
//! mapped directly through the combiner.
//!
//! ```rust
//! use rxmaybe::prelude::*;
//!
//! let sum = Maybe::zip(
//!   vec![Maybe::just(1), Maybe::just(10)],
//!   |v: Vec<i32>| Ok(v.iter().sum::<i32>()),
//!   false,
//! );
//! assert_eq!(sum.block_for_result().unwrap(), Some(11));
//! ```

use std::{
  marker::PhantomData,
  sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
  },
};

use parking_lot::Mutex;

use crate::{
  coordinator::MaybeDownstream,
  error::{ErrorAggregator, MaybeError},
  maybe::{IntoSourceSlot, Maybe, MaybeSource, SourceSlot},
  observer::{BoxedMaybeObserver, MaybeObserver},
  subscription::{SetOnceSubscription, Subscription, SubscriptionHandle},
};

impl<Item: Send + 'static> Maybe<Item> {
  /// Combine the successes of all `sources` once each of them succeeded.
  pub fn zip<I, R, F>(sources: I, combiner: F, delay_errors: bool) -> Maybe<R>
  where
    I: IntoIterator + Clone + Send + Sync + 'static,
    I::Item: IntoSourceSlot<Item>,
    R: Send + 'static,
    F: Fn(Vec<Item>) -> Result<R, MaybeError> + Send + Sync + 'static,
  {
    Maybe::new(Zip {
      sources,
      combiner: Arc::new(combiner),
      delay_errors,
      _item: PhantomData,
    })
  }
}

struct Zip<Item, I, F> {
  sources: I,
  combiner: Arc<F>,
  delay_errors: bool,
  _item: PhantomData<fn() -> Item>,
}

impl<Item, R, I, F> MaybeSource<R> for Zip<Item, I, F>
where
  Item: Send + 'static,
  R: Send + 'static,
  I: IntoIterator + Clone + Send + Sync,
  I::Item: IntoSourceSlot<Item>,
  F: Fn(Vec<Item>) -> Result<R, MaybeError> + Send + Sync + 'static,
{
  fn subscribe(&self, mut observer: BoxedMaybeObserver<R>) {
    let mut slots = Vec::new();
    for slot in self.sources.clone() {
      match slot.into_slot() {
        SourceSlot::Failed(err) => {
          observer.on_subscribe(SubscriptionHandle::flag());
          observer.on_error(err);
          return;
        }
        slot => slots.push(slot),
      }
    }

    match slots.len() {
      0 => {
        observer.on_subscribe(SubscriptionHandle::flag());
        observer.on_error(MaybeError::OutOfRange("zip requires at least one source"));
      }
      1 => match slots.pop().map(|slot| slot.into_source(0)) {
        Some(Ok(source)) => source.subscribe(Box::new(ZipOne {
          observer,
          combiner: self.combiner.clone(),
        })),
        Some(Err(err)) => {
          observer.on_subscribe(SubscriptionHandle::flag());
          observer.on_error(err);
        }
        None => {}
      },
      n => ZipState::start(slots, n, self.combiner.clone(), self.delay_errors, observer),
    }
  }
}

/// A single zipped source is a plain map through the combiner.
struct ZipOne<R, F> {
  observer: BoxedMaybeObserver<R>,
  combiner: Arc<F>,
}

impl<Item, R, F> MaybeObserver<Item> for ZipOne<R, F>
where
  R: Send + 'static,
  F: Fn(Vec<Item>) -> Result<R, MaybeError> + Send + Sync,
{
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) {
    self.observer.on_subscribe(subscription)
  }

  fn on_success(self, value: Item) {
    match (self.combiner)(vec![value]) {
      Ok(v) => self.observer.on_success(v),
      Err(err) => self.observer.on_error(err),
    }
  }

  fn on_error(self, err: MaybeError) { self.observer.on_error(err) }

  fn on_complete(self) { self.observer.on_complete() }
}

struct ZipState<Item, R, F> {
  values: Vec<Mutex<Option<Item>>>,
  /// Sources that have not terminated yet.
  remaining: AtomicUsize,
  inners: Vec<SetOnceSubscription>,
  done: AtomicBool,
  empty_seen: AtomicBool,
  errors: ErrorAggregator,
  combiner: Arc<F>,
  downstream: MaybeDownstream<R>,
}

impl<Item, R, F> ZipState<Item, R, F>
where
  Item: Send + 'static,
  R: Send + 'static,
  F: Fn(Vec<Item>) -> Result<R, MaybeError> + Send + Sync + 'static,
{
  fn start(
    slots: Vec<SourceSlot<Item>>,
    n: usize,
    combiner: Arc<F>,
    delay_errors: bool,
    mut observer: BoxedMaybeObserver<R>,
  ) {
    let state = Arc::new(ZipState {
      values: (0..n).map(|_| Mutex::new(None)).collect(),
      remaining: AtomicUsize::new(n),
      inners: (0..n).map(|_| SetOnceSubscription::new()).collect(),
      done: AtomicBool::new(false),
      empty_seen: AtomicBool::new(false),
      errors: ErrorAggregator::new(delay_errors),
      combiner,
      downstream: MaybeDownstream::new(),
    });
    observer.on_subscribe(state.clone().into());
    if state.is_closed() {
      return;
    }
    state.downstream.set(observer);

    for (index, slot) in slots.into_iter().enumerate() {
      if state.done.load(Ordering::Acquire) {
        break;
      }
      let inner = ZipObserver { state: state.clone(), index };
      match slot.into_source(index) {
        Ok(source) => source.subscribe(Box::new(inner)),
        Err(err) => inner.on_error(err),
      }
    }
  }

  /// Commit the terminal signal, returning the downstream when this caller
  /// won. Every source is disposed first.
  fn terminate(&self) -> Option<BoxedMaybeObserver<R>> {
    if self.done.swap(true, Ordering::AcqRel) {
      return None;
    }
    for inner in &self.inners {
      inner.unsubscribe();
    }
    self.downstream.take()
  }

  fn count_down(&self) {
    if self.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
      return;
    }
    let Some(observer) = self.terminate() else { return };
    if let Some(err) = self.errors.take() {
      observer.on_error(err);
    } else if self.empty_seen.load(Ordering::Acquire) {
      observer.on_complete();
    } else {
      let values: Option<Vec<Item>> = self.values.iter().map(|v| v.lock().take()).collect();
      match values {
        Some(values) => match (self.combiner)(values) {
          Ok(v) => observer.on_success(v),
          Err(err) => observer.on_error(err),
        },
        None => observer.on_complete(),
      }
    }
  }
}

impl<Item: Send, R: Send, F: Send + Sync> Subscription for ZipState<Item, R, F> {
  fn unsubscribe(&self) {
    if !self.done.swap(true, Ordering::AcqRel) {
      for inner in &self.inners {
        inner.unsubscribe();
      }
      self.downstream.clear();
      for value in &self.values {
        value.lock().take();
      }
    }
  }

  fn is_closed(&self) -> bool { self.done.load(Ordering::Acquire) }
}

struct ZipObserver<Item, R, F> {
  state: Arc<ZipState<Item, R, F>>,
  index: usize,
}

impl<Item, R, F> MaybeObserver<Item> for ZipObserver<Item, R, F>
where
  Item: Send + 'static,
  R: Send + 'static,
  F: Fn(Vec<Item>) -> Result<R, MaybeError> + Send + Sync + 'static,
{
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) {
    self.state.inners[self.index].set(subscription);
  }

  fn on_success(self, value: Item) {
    *self.state.values[self.index].lock() = Some(value);
    self.state.count_down();
  }

  fn on_error(self, err: MaybeError) {
    if self.state.errors.delays_errors() {
      self.state.errors.add(err);
      self.state.count_down();
      return;
    }
    match self.state.terminate() {
      Some(observer) => {
        tracing::debug!(index = self.index, "zip: aborting on first error");
        observer.on_error(err)
      }
      None => tracing::debug!(error = %err, "zip: undeliverable error after termination"),
    }
  }

  fn on_complete(self) {
    if self.state.errors.delays_errors() {
      self.state.empty_seen.store(true, Ordering::Release);
      self.state.count_down();
      return;
    }
    if let Some(observer) = self.state.terminate() {
      tracing::trace!(index = self.index, "zip: source completed empty");
      observer.on_complete();
    }
  }
}
