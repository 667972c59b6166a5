//! SwitchMap operator
//!
//! Maps each outer item to an inner Maybe source and switches to it,
//! disposing whichever inner source was running before, even mid-flight. At
//! most one inner subscription is active at any time and only the current one
//! may emit; signals from a superseded inner source are dropped.
//!
//! The flow terminates once the outer flow completed and the current inner
//! source terminated. Errors follow the usual modes: fail-fast reports the
//! first error immediately, delay-errors reports every error at the end.
//!
//! ```rust
//! use rxmaybe::prelude::*;
//!
//! let outer = PublishSubject::new();
//! let test = TestFlowObserver::new();
//! outer
//!   .to_flow()
//!   .switch_map(|v: i32| Maybe::just(v * 2), false)
//!   .subscribe_with(test.clone());
//!
//! outer.on_next(1);
//! outer.on_next(2);
//! outer.on_complete();
//! test.assert_values(&[2, 4]);
//! test.assert_completed();
//! ```

use std::sync::{
  atomic::{AtomicBool, AtomicU64, Ordering},
  Arc,
};

use parking_lot::Mutex;

use crate::{
  coordinator::{FlowDownstream, WorkInProgress},
  error::{ErrorAggregator, MaybeError},
  flow::{Flow, FlowSource},
  maybe::{IntoSourceSlot, MaybeSource},
  observer::{BoxedFlowObserver, FlowObserver, MaybeObserver},
  subscription::{SerialSubscription, SetOnceSubscription, Subscription, SubscriptionHandle},
};

/// No inner source is current.
const NONE: u64 = 0;

impl<Item: Send + 'static> Flow<Item> {
  /// Map items to inner sources, keeping only the latest one subscribed.
  pub fn switch_map<R, M, F>(&self, mapper: F, delay_errors: bool) -> Flow<R>
  where
    R: Send + 'static,
    M: IntoSourceSlot<R>,
    F: Fn(Item) -> M + Send + Sync + 'static,
  {
    Flow::new(SwitchMap { source: self.clone(), mapper: Arc::new(mapper), delay_errors })
  }
}

struct SwitchMap<Item, F> {
  source: Flow<Item>,
  mapper: Arc<F>,
  delay_errors: bool,
}

impl<Item, R, M, F> FlowSource<R> for SwitchMap<Item, F>
where
  Item: Send + 'static,
  R: Send + 'static,
  M: IntoSourceSlot<R>,
  F: Fn(Item) -> M + Send + Sync + 'static,
{
  fn subscribe(&self, mut observer: BoxedFlowObserver<R>) {
    let state = Arc::new(SwitchState {
      wip: WorkInProgress::new(),
      current: AtomicU64::new(NONE),
      inner: SerialSubscription::new(),
      upstream: SetOnceSubscription::new(),
      outer_done: AtomicBool::new(false),
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
    self.source.subscribe(Box::new(SwitchOuter {
      state,
      mapper: self.mapper.clone(),
      last_id: NONE,
      index: 0,
    }));
  }
}

struct SwitchState<Item> {
  wip: WorkInProgress,
  /// Id of the inner source allowed to emit, `NONE` once it terminated.
  current: AtomicU64,
  inner: SerialSubscription,
  upstream: SetOnceSubscription,
  outer_done: AtomicBool,
  item: Mutex<Option<(u64, Item)>>,
  errors: ErrorAggregator,
  disposed: AtomicBool,
  downstream: FlowDownstream<Item>,
}

impl<Item: Send + 'static> SwitchState<Item> {
  fn drain(&self) { self.wip.drain(|| self.pass()) }

  fn pass(&self) {
    if self.disposed.load(Ordering::Acquire) {
      self.release();
      return;
    }
    if !self.errors.delays_errors() && self.errors.has_error() {
      self.disposed.store(true, Ordering::Release);
      self.upstream.unsubscribe();
      self.inner.unsubscribe();
      self.item.lock().take();
      tracing::debug!("switch_map: aborting on first error");
      self.downstream.finish(self.errors.take());
      return;
    }

    let item = self.item.lock().take();
    if let Some((id, v)) = item {
      // Only the still-current inner source may emit.
      if self
        .current
        .compare_exchange(id, NONE, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
      {
        self.downstream.next(v, || !self.disposed.load(Ordering::Acquire));
      } else {
        tracing::trace!(id, "switch_map: dropping value of a superseded source");
      }
      if self.disposed.load(Ordering::Acquire) {
        self.release();
        return;
      }
    }

    if self.outer_done.load(Ordering::Acquire)
      && self.current.load(Ordering::Acquire) == NONE
      && self.item.lock().is_none()
    {
      self.disposed.store(true, Ordering::Release);
      self.inner.unsubscribe();
      self.downstream.finish(self.errors.take());
    }
  }

  fn release(&self) {
    self.upstream.unsubscribe();
    self.inner.unsubscribe();
    self.item.lock().take();
    self.downstream.clear();
  }
}

impl<Item: Send + 'static> Subscription for SwitchState<Item> {
  fn unsubscribe(&self) {
    if !self.disposed.swap(true, Ordering::AcqRel) {
      self.upstream.unsubscribe();
      self.inner.unsubscribe();
      self.drain();
    }
  }

  fn is_closed(&self) -> bool { self.disposed.load(Ordering::Acquire) }
}

struct SwitchOuter<R, F> {
  state: Arc<SwitchState<R>>,
  mapper: Arc<F>,
  last_id: u64,
  index: usize,
}

impl<Item, R, M, F> FlowObserver<Item> for SwitchOuter<R, F>
where
  R: Send + 'static,
  M: IntoSourceSlot<R>,
  F: Fn(Item) -> M + Send + Sync,
{
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) {
    self.state.upstream.set(subscription);
  }

  fn on_next(&mut self, value: Item) {
    let state = &self.state;
    if state.disposed.load(Ordering::Acquire) || state.outer_done.load(Ordering::Acquire) {
      return;
    }
    self.last_id += 1;
    let id = self.last_id;
    let index = self.index;
    self.index += 1;

    state.current.store(id, Ordering::Release);
    let slot = Arc::new(SetOnceSubscription::new());
    // Disposes the previous inner source.
    state.inner.replace(slot.clone().into());

    match (self.mapper)(value).into_slot().into_source(index) {
      Ok(source) => source.subscribe(Box::new(SwitchInner { state: state.clone(), id, slot })),
      Err(err) => {
        state.current.store(NONE, Ordering::Release);
        state.errors.add(err);
        state.outer_done.store(true, Ordering::Release);
        state.upstream.unsubscribe();
        state.drain();
      }
    }
  }

  fn on_error(self, err: MaybeError) {
    self.state.errors.add(err);
    self.state.outer_done.store(true, Ordering::Release);
    self.state.drain();
  }

  fn on_complete(self) {
    self.state.outer_done.store(true, Ordering::Release);
    self.state.drain();
  }
}

struct SwitchInner<Item> {
  state: Arc<SwitchState<Item>>,
  id: u64,
  slot: Arc<SetOnceSubscription>,
}

impl<Item: Send + 'static> SwitchInner<Item> {
  fn finish_current(&self) -> bool {
    self
      .state
      .current
      .compare_exchange(self.id, NONE, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
  }
}

impl<Item: Send + 'static> MaybeObserver<Item> for SwitchInner<Item> {
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) { self.slot.set(subscription); }

  fn on_success(self, value: Item) {
    let stale = {
      let mut item = self.state.item.lock();
      // `current` never returns to a superseded id, so a stale value can
      // never replace the pending value of the current inner source.
      if self.state.current.load(Ordering::Acquire) == self.id {
        *item = Some((self.id, value));
        None
      } else {
        Some(value)
      }
    };
    if stale.is_some() {
      tracing::trace!(id = self.id, "switch_map: dropping value of a superseded source");
      return;
    }
    self.state.drain();
  }

  fn on_error(self, err: MaybeError) {
    if self.finish_current() {
      self.state.errors.add(err);
    } else {
      tracing::debug!(error = %err, "switch_map: dropping error of a superseded source");
    }
    self.state.drain();
  }

  fn on_complete(self) {
    self.finish_current();
    self.state.drain();
  }
}
