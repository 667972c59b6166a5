//! Concat operator
//!
//! Subscribes to the sources one after another and emits every success as an
//! item of the resulting [`Flow`]. The next source is only subscribed once
//! the previous one terminated; an empty source advances without emitting.
//!
//! With `delay_errors` an error is recorded and the sequence continues; the
//! recorded errors are reported once every source ran. Otherwise the first
//! error ends the flow.

use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};

use parking_lot::Mutex;

use crate::{
  coordinator::{FlowDownstream, WorkInProgress},
  error::{ErrorAggregator, MaybeError},
  flow::{Flow, FlowSource},
  maybe::{IntoSourceSlot, Maybe, MaybeSource, SourceSlot},
  observer::{BoxedFlowObserver, FlowObserver, MaybeObserver},
  subscription::{SerialSubscription, Subscription, SubscriptionHandle},
};

impl<Item: Send + 'static> Maybe<Item> {
  /// Run `sources` one at a time and emit their successes in order.
  ///
  /// ```rust
  /// use rxmaybe::prelude::*;
  ///
  /// let test = TestFlowObserver::new();
  /// Maybe::concat(vec![Maybe::just(1), Maybe::empty(), Maybe::just(3)], false)
  ///   .subscribe_with(test.clone());
  /// test.assert_values(&[1, 3]);
  /// test.assert_completed();
  /// ```
  pub fn concat<I>(sources: I, delay_errors: bool) -> Flow<Item>
  where
    I: IntoIterator + Clone + Send + Sync + 'static,
    I::IntoIter: Send + 'static,
    I::Item: IntoSourceSlot<Item>,
  {
    Flow::new(Concat { sources, delay_errors })
  }
}

struct Concat<I> {
  sources: I,
  delay_errors: bool,
}

impl<Item, I> FlowSource<Item> for Concat<I>
where
  Item: Send + 'static,
  I: IntoIterator + Clone + Send + Sync,
  I::IntoIter: Send + 'static,
  I::Item: IntoSourceSlot<Item>,
{
  fn subscribe(&self, mut observer: BoxedFlowObserver<Item>) {
    let state = Arc::new(ConcatState {
      wip: WorkInProgress::new(),
      sources: Mutex::new(Some(Box::new(
        self.sources.clone().into_iter().map(|slot| slot.into_slot()),
      ))),
      index: Mutex::new(0),
      current: SerialSubscription::new(),
      active: AtomicBool::new(false),
      item: Mutex::new(None),
      errors: ErrorAggregator::new(self.delay_errors),
      disposed: AtomicBool::new(false),
      downstream: FlowDownstream::new(),
    });
    observer.on_subscribe(state.clone().into());
    if state.is_closed() {
      return;
    }
    state.downstream.set(observer);
    state.drain();
  }
}

type SlotIter<Item> = Box<dyn Iterator<Item = SourceSlot<Item>> + Send>;

struct ConcatState<Item> {
  wip: WorkInProgress,
  /// `None` once the sequence is exhausted or abandoned.
  sources: Mutex<Option<SlotIter<Item>>>,
  index: Mutex<usize>,
  current: SerialSubscription,
  active: AtomicBool,
  item: Mutex<Option<Item>>,
  errors: ErrorAggregator,
  disposed: AtomicBool,
  downstream: FlowDownstream<Item>,
}

impl<Item: Send + 'static> ConcatState<Item> {
  fn drain(self: &Arc<Self>) { self.wip.drain(|| self.pass()) }

  fn pass(self: &Arc<Self>) {
    loop {
      if self.disposed.load(Ordering::Acquire) {
        self.release();
        return;
      }
      if !self.errors.delays_errors() && self.errors.has_error() {
        self.fail();
        return;
      }
      if self.active.load(Ordering::Acquire) {
        return;
      }

      let item = self.item.lock().take();
      if let Some(v) = item {
        self.downstream.next(v, || !self.disposed.load(Ordering::Acquire));
        continue;
      }

      match self.next_slot() {
        None => {
          self.disposed.store(true, Ordering::Release);
          self.downstream.finish(self.errors.take());
          return;
        }
        Some((_, SourceSlot::Ready(source))) => {
          self.active.store(true, Ordering::Release);
          source.subscribe(Box::new(ConcatObserver(self.clone())));
        }
        Some((index, SourceSlot::Missing)) => {
          self.errors.add(MaybeError::MissingSource { index });
        }
        Some((_, SourceSlot::Failed(err))) => {
          // The sequence itself broke: nothing after this point is pulled.
          self.sources.lock().take();
          self.errors.add(err);
        }
      }
    }
  }

  fn next_slot(&self) -> Option<(usize, SourceSlot<Item>)> {
    // The iterator is taken out while it runs so user code never executes
    // under the lock.
    let mut sources = self.sources.lock().take()?;
    let slot = sources.next();
    if slot.is_some() {
      let mut sources_slot = self.sources.lock();
      if !self.disposed.load(Ordering::Acquire) {
        *sources_slot = Some(sources);
      }
    }
    let mut index = self.index.lock();
    let at = *index;
    *index += 1;
    slot.map(|slot| (at, slot))
  }

  fn fail(&self) {
    self.disposed.store(true, Ordering::Release);
    self.current.unsubscribe();
    self.sources.lock().take();
    tracing::debug!("concat: aborting on first error");
    let err = self.errors.take();
    self.downstream.finish(err);
  }

  fn release(&self) {
    self.current.unsubscribe();
    self.sources.lock().take();
    self.item.lock().take();
    self.downstream.clear();
  }

  fn inner_done(self: &Arc<Self>) {
    self.active.store(false, Ordering::Release);
    self.drain();
  }
}

impl<Item: Send + 'static> Subscription for ConcatState<Item> {
  fn unsubscribe(&self) {
    if !self.disposed.swap(true, Ordering::AcqRel) {
      self.current.unsubscribe();
      self.wip.drain(|| self.release());
    }
  }

  fn is_closed(&self) -> bool { self.disposed.load(Ordering::Acquire) }
}

struct ConcatObserver<Item>(Arc<ConcatState<Item>>);

impl<Item: Send + 'static> MaybeObserver<Item> for ConcatObserver<Item> {
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) {
    self.0.current.replace(subscription)
  }

  fn on_success(self, value: Item) {
    *self.0.item.lock() = Some(value);
    self.0.inner_done();
  }

  fn on_error(self, err: MaybeError) {
    if !self.0.errors.add(err) {
      tracing::debug!("concat: undeliverable error after the first one");
    }
    self.0.inner_done();
  }

  fn on_complete(self) { self.0.inner_done() }
}
