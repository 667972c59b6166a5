//! Bounded-window merge coordinator.
//!
//! Keeps up to `max_concurrency` inner sources subscribed, pulling the next
//! pending one from its [`SourceSupply`] whenever an active one terminates.
//! The flow completes once the supply is exhausted, no inner source is active
//! and every buffered result was emitted.
//!
//! Results are either emitted in arrival order ([`Emission::Unordered`]) or
//! in subscription order ([`Emission::Ordered`]): the ordered mode keeps one
//! slot per subscribed source and only emits from the front of that queue.

use std::{
  collections::VecDeque,
  sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
  },
};

use parking_lot::Mutex;

use super::{FlowDownstream, WorkInProgress};
use crate::{
  error::{ErrorAggregator, MaybeError},
  maybe::{Maybe, MaybeSource, SourceSlot},
  observer::{BoxedFlowObserver, FlowObserver, MaybeObserver},
  subscription::{
    CompositeSubscription, SetOnceSubscription, Subscription, SubscriptionHandle,
  },
};

/// What a supply hands out when the coordinator asks for the next source.
pub(crate) enum Pull<Item> {
  Ready(Maybe<Item>),
  /// The supply broke; no further sources are pulled.
  Failed(MaybeError),
  /// Nothing right now, more may arrive later.
  Pending,
  Done,
}

/// Where the sources of a merge come from.
pub(crate) trait SourceSupply<Item>: Send {
  fn pull(&mut self) -> Pull<Item>;
}

/// Pulls lazily from an iterator of source slots.
pub(crate) struct IterSupply<It> {
  iter: It,
  index: usize,
}

impl<It> IterSupply<It> {
  pub(crate) fn new(iter: It) -> Self { Self { iter, index: 0 } }
}

impl<Item, It> SourceSupply<Item> for IterSupply<It>
where
  It: Iterator<Item = SourceSlot<Item>> + Send,
{
  fn pull(&mut self) -> Pull<Item> {
    let index = self.index;
    self.index += 1;
    match self.iter.next() {
      Some(slot) => match slot.into_source(index) {
        Ok(source) => Pull::Ready(source),
        Err(err) => Pull::Failed(err),
      },
      None => Pull::Done,
    }
  }
}

/// Sources pushed by an outer flow, see `flat_map`.
pub(crate) struct QueueSupply<Item> {
  queue: VecDeque<Maybe<Item>>,
  done: bool,
}

impl<Item> QueueSupply<Item> {
  pub(crate) fn new() -> Self { Self { queue: VecDeque::new(), done: false } }

  pub(crate) fn push(&mut self, source: Maybe<Item>) { self.queue.push_back(source); }

  pub(crate) fn finish(&mut self) { self.done = true; }
}

impl<Item: Send> SourceSupply<Item> for QueueSupply<Item> {
  fn pull(&mut self) -> Pull<Item> {
    match self.queue.pop_front() {
      Some(source) => Pull::Ready(source),
      None if self.done => Pull::Done,
      None => Pull::Pending,
    }
  }
}

/// Emission order policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Emission {
  Unordered,
  Ordered,
}

struct EagerSlot<Item> {
  value: Mutex<Option<Item>>,
  done: AtomicBool,
}

enum Results<Item> {
  Unordered(Mutex<VecDeque<Item>>),
  Ordered(Mutex<VecDeque<Arc<EagerSlot<Item>>>>),
}

impl<Item> Results<Item> {
  fn is_empty(&self) -> bool {
    match self {
      Results::Unordered(queue) => queue.lock().is_empty(),
      Results::Ordered(slots) => slots.lock().is_empty(),
    }
  }

  fn clear(&self) {
    match self {
      Results::Unordered(queue) => queue.lock().clear(),
      Results::Ordered(slots) => slots.lock().clear(),
    }
  }

  /// The next result ready for emission. `Some(None)` is a finished slot
  /// without a value.
  fn pop_ready(&self) -> Option<Option<Item>> {
    match self {
      Results::Unordered(queue) => queue.lock().pop_front().map(Some),
      Results::Ordered(slots) => {
        let mut slots = slots.lock();
        if !slots.front()?.done.load(Ordering::Acquire) {
          return None;
        }
        let slot = slots.pop_front()?;
        drop(slots);
        let value = slot.value.lock().take();
        Some(value)
      }
    }
  }
}

/// State shared by the downstream handle and every inner observer.
pub(crate) struct MergeState<Item, S> {
  wip: WorkInProgress,
  supply: Mutex<S>,
  max_concurrency: usize,
  active: AtomicUsize,
  inners: CompositeSubscription,
  /// The outer flow feeding a [`QueueSupply`], if any.
  upstream: SetOnceSubscription,
  no_more_sources: AtomicBool,
  results: Results<Item>,
  errors: ErrorAggregator,
  disposed: AtomicBool,
  downstream: FlowDownstream<Item>,
}

impl<Item, S> MergeState<Item, S>
where
  Item: Send + 'static,
  S: SourceSupply<Item> + 'static,
{
  pub(crate) fn new(
    supply: S,
    max_concurrency: usize,
    delay_errors: bool,
    emission: Emission,
  ) -> Arc<Self> {
    let results = match emission {
      Emission::Unordered => Results::Unordered(Mutex::new(VecDeque::new())),
      Emission::Ordered => Results::Ordered(Mutex::new(VecDeque::new())),
    };
    Arc::new(MergeState {
      wip: WorkInProgress::new(),
      supply: Mutex::new(supply),
      max_concurrency: max_concurrency.max(1),
      active: AtomicUsize::new(0),
      inners: CompositeSubscription::new(),
      upstream: SetOnceSubscription::new(),
      no_more_sources: AtomicBool::new(false),
      results,
      errors: ErrorAggregator::new(delay_errors),
      disposed: AtomicBool::new(false),
      downstream: FlowDownstream::new(),
    })
  }

  /// Hand the state to `observer` as its subscription and keep the observer.
  ///
  /// Returns `false` when the observer disposed during `on_subscribe`.
  pub(crate) fn attach(self: &Arc<Self>, mut observer: BoxedFlowObserver<Item>) -> bool {
    observer.on_subscribe(self.clone().into());
    if self.is_closed() {
      return false;
    }
    self.downstream.set(observer);
    true
  }

  pub(crate) fn set_upstream(&self, subscription: SubscriptionHandle) {
    self.upstream.set(subscription);
  }

  pub(crate) fn is_accepting(&self) -> bool {
    !self.no_more_sources.load(Ordering::Acquire) && !self.disposed.load(Ordering::Acquire)
  }

  /// Run `f` on the supply, then drain.
  pub(crate) fn supply_with(self: &Arc<Self>, f: impl FnOnce(&mut S)) {
    f(&mut self.supply.lock());
    self.drain();
  }

  /// A failure that ends the supply: recorded, nothing more is pulled.
  pub(crate) fn fatal(self: &Arc<Self>, err: MaybeError) {
    self.errors.add(err);
    self.stop_supply();
    self.drain();
  }

  /// An error from the supplying flow. In delay-errors mode the sources
  /// already subscribed still run.
  pub(crate) fn upstream_error(self: &Arc<Self>, err: MaybeError) {
    self.errors.add(err);
    self.no_more_sources.store(true, Ordering::Release);
    self.drain();
  }

  fn stop_supply(&self) {
    self.no_more_sources.store(true, Ordering::Release);
    self.upstream.unsubscribe();
  }

  pub(crate) fn drain(self: &Arc<Self>) { self.wip.drain(|| self.pass()) }

  fn pass(self: &Arc<Self>) {
    loop {
      if self.disposed.load(Ordering::Acquire) {
        self.release();
        return;
      }
      if self.fail_fast_pending() {
        self.fail();
        return;
      }

      if let Some(ready) = self.results.pop_ready() {
        if let Some(v) = ready {
          self.downstream.next(v, || !self.disposed.load(Ordering::Acquire));
        }
        continue;
      }

      if self.no_more_sources.load(Ordering::Acquire) {
        if self.active.load(Ordering::Acquire) == 0 && self.results.is_empty() {
          self.disposed.store(true, Ordering::Release);
          self.upstream.unsubscribe();
          self.downstream.finish(self.errors.take());
        }
        return;
      }
      if self.active.load(Ordering::Acquire) >= self.max_concurrency {
        return;
      }

      let next = self.supply.lock().pull();
      match next {
        Pull::Ready(source) => self.subscribe_inner(source),
        Pull::Failed(err) => {
          tracing::debug!(error = %err, "merge: source supply failed");
          self.errors.add(err);
          self.stop_supply();
        }
        Pull::Pending => return,
        Pull::Done => self.no_more_sources.store(true, Ordering::Release),
      }
    }
  }

  fn fail_fast_pending(&self) -> bool { !self.errors.delays_errors() && self.errors.has_error() }

  fn subscribe_inner(self: &Arc<Self>, source: Maybe<Item>) {
    let handle = Arc::new(SetOnceSubscription::new());
    let Some(key) = self.inners.add(handle.clone().into()) else { return };
    let slot = match &self.results {
      Results::Unordered(_) => None,
      Results::Ordered(slots) => {
        let slot = Arc::new(EagerSlot { value: Mutex::new(None), done: AtomicBool::new(false) });
        slots.lock().push_back(slot.clone());
        Some(slot)
      }
    };
    self.active.fetch_add(1, Ordering::AcqRel);
    source.subscribe(Box::new(MergeObserver { state: self.clone(), handle, key, slot }));
  }

  fn fail(&self) {
    self.disposed.store(true, Ordering::Release);
    self.stop_supply();
    self.inners.unsubscribe();
    self.results.clear();
    tracing::debug!("merge: aborting on first error");
    self.downstream.finish(self.errors.take());
  }

  fn release(&self) {
    self.stop_supply();
    self.inners.unsubscribe();
    self.results.clear();
    self.downstream.clear();
  }

  fn inner_done(self: &Arc<Self>, key: usize) {
    self.inners.remove(key);
    self.active.fetch_sub(1, Ordering::AcqRel);
    self.drain();
  }
}

impl<Item, S> Subscription for MergeState<Item, S>
where
  Item: Send + 'static,
  S: SourceSupply<Item> + 'static,
{
  fn unsubscribe(&self) {
    if !self.disposed.swap(true, Ordering::AcqRel) {
      self.stop_supply();
      self.inners.unsubscribe();
      self.wip.drain(|| {
        self.results.clear();
        self.downstream.clear();
      });
    }
  }

  fn is_closed(&self) -> bool { self.disposed.load(Ordering::Acquire) }
}

struct MergeObserver<Item, S> {
  state: Arc<MergeState<Item, S>>,
  handle: Arc<SetOnceSubscription>,
  key: usize,
  slot: Option<Arc<EagerSlot<Item>>>,
}

impl<Item, S> MaybeObserver<Item> for MergeObserver<Item, S>
where
  Item: Send + 'static,
  S: SourceSupply<Item> + 'static,
{
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) { self.handle.set(subscription); }

  fn on_success(self, value: Item) {
    match (&self.slot, &self.state.results) {
      (Some(slot), _) => {
        *slot.value.lock() = Some(value);
        slot.done.store(true, Ordering::Release);
      }
      (None, Results::Unordered(queue)) => queue.lock().push_back(value),
      (None, Results::Ordered(_)) => {}
    }
    self.state.inner_done(self.key);
  }

  fn on_error(self, err: MaybeError) {
    if !self.state.errors.add(err) {
      tracing::debug!("merge: undeliverable error after the first one");
    }
    self.finish_slot();
    self.state.inner_done(self.key);
  }

  fn on_complete(self) {
    self.finish_slot();
    self.state.inner_done(self.key);
  }
}

impl<Item, S> MergeObserver<Item, S> {
  fn finish_slot(&self) {
    if let Some(slot) = &self.slot {
      slot.done.store(true, Ordering::Release);
    }
  }
}

/// Subscribe `observer` to a merge over `supply`.
pub(crate) fn subscribe_merge<Item, S>(
  supply: S,
  max_concurrency: usize,
  delay_errors: bool,
  emission: Emission,
  observer: BoxedFlowObserver<Item>,
) where
  Item: Send + 'static,
  S: SourceSupply<Item> + 'static,
{
  let state = MergeState::new(supply, max_concurrency, delay_errors, emission);
  if state.attach(observer) {
    state.drain();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::TestFlowObserver;

  #[rxmaybe_macro::test]
  fn queue_supply_waits_for_more() {
    let mut supply = QueueSupply::<i32>::new();
    assert!(matches!(supply.pull(), Pull::Pending));
    supply.push(Maybe::just(1));
    assert!(matches!(supply.pull(), Pull::Ready(_)));
    supply.finish();
    assert!(matches!(supply.pull(), Pull::Done));
  }

  #[rxmaybe_macro::test]
  fn iter_supply_reports_missing_index() {
    let slots = vec![SourceSlot::Ready(Maybe::just(1)), SourceSlot::Missing];
    let mut supply = IterSupply::new(slots.into_iter());
    assert!(matches!(supply.pull(), Pull::Ready(_)));
    match supply.pull() {
      Pull::Failed(MaybeError::MissingSource { index }) => assert_eq!(index, 1),
      _ => panic!("expected a missing source"),
    }
  }

  #[rxmaybe_macro::test]
  fn ordered_results_wait_for_the_front() {
    let test = TestFlowObserver::new();
    let supply = IterSupply::new(
      vec![SourceSlot::Ready(Maybe::never()), SourceSlot::Ready(Maybe::just(2))].into_iter(),
    );
    subscribe_merge(supply, usize::MAX, false, Emission::Ordered, Box::new(test.clone()));
    assert_eq!(test.value_count(), 0);
    test.assert_not_terminated();
  }
}
