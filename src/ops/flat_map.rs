//! FlatMap, ConcatMap and ConcatMapEager operators
//!
//! Map every item of an outer [`Flow`] to an inner Maybe source and merge
//! the inner results into one flow. They share the bounded-window merge
//! coordinator with `Maybe::merge`; the outer flow feeds its queue of
//! pending sources.
//!
//! | Operator | Inner sources at once | Emission order |
//! |----------|-----------------------|----------------|
//! | `flat_map` | `max_concurrency` | completion order |
//! | `concat_map` | one | outer order |
//! | `concat_map_eager` | `max_concurrency` | outer order |
//!
//! The mapper may return a `Maybe`, an `Option<Maybe>` (`None` is a missing
//! source) or a `Result<Maybe, MaybeError>`. A missing source or a mapper
//! error is fatal: the outer flow is cancelled, and in delay-errors mode the
//! inner sources already running still finish before the composite error is
//! reported.

use std::sync::Arc;

use crate::{
  coordinator::merge::{Emission, MergeState, QueueSupply},
  error::MaybeError,
  flow::{Flow, FlowSource},
  maybe::IntoSourceSlot,
  observer::{BoxedFlowObserver, FlowObserver},
  subscription::SubscriptionHandle,
};

impl<Item: Send + 'static> Flow<Item> {
  /// Map items to inner sources, run up to `max_concurrency` of them at once
  /// and emit their successes as they arrive.
  ///
  /// ```rust
  /// use rxmaybe::prelude::*;
  ///
  /// let test = TestFlowObserver::new();
  /// Flow::from_iter(vec![1, 2, 3])
  ///   .flat_map(|v| Maybe::just(v * 10), usize::MAX, false)
  ///   .subscribe_with(test.clone());
  /// test.assert_values(&[10, 20, 30]);
  /// ```
  pub fn flat_map<R, M, F>(&self, mapper: F, max_concurrency: usize, delay_errors: bool) -> Flow<R>
  where
    R: Send + 'static,
    M: IntoSourceSlot<R>,
    F: Fn(Item) -> M + Send + Sync + 'static,
  {
    self.mapped(mapper, max_concurrency, delay_errors, Emission::Unordered)
  }

  /// Map items to inner sources and run them one at a time, in order.
  pub fn concat_map<R, M, F>(&self, mapper: F, delay_errors: bool) -> Flow<R>
  where
    R: Send + 'static,
    M: IntoSourceSlot<R>,
    F: Fn(Item) -> M + Send + Sync + 'static,
  {
    self.mapped(mapper, 1, delay_errors, Emission::Ordered)
  }

  /// Map items to inner sources, run up to `max_concurrency` of them at once
  /// and emit their successes in the order of the outer items.
  pub fn concat_map_eager<R, M, F>(
    &self,
    mapper: F,
    max_concurrency: usize,
    delay_errors: bool,
  ) -> Flow<R>
  where
    R: Send + 'static,
    M: IntoSourceSlot<R>,
    F: Fn(Item) -> M + Send + Sync + 'static,
  {
    self.mapped(mapper, max_concurrency, delay_errors, Emission::Ordered)
  }

  fn mapped<R, M, F>(
    &self,
    mapper: F,
    max_concurrency: usize,
    delay_errors: bool,
    emission: Emission,
  ) -> Flow<R>
  where
    R: Send + 'static,
    M: IntoSourceSlot<R>,
    F: Fn(Item) -> M + Send + Sync + 'static,
  {
    Flow::new(FlatMap {
      source: self.clone(),
      mapper: Arc::new(mapper),
      max_concurrency,
      delay_errors,
      emission,
    })
  }
}

struct FlatMap<Item, F> {
  source: Flow<Item>,
  mapper: Arc<F>,
  max_concurrency: usize,
  delay_errors: bool,
  emission: Emission,
}

impl<Item, R, M, F> FlowSource<R> for FlatMap<Item, F>
where
  Item: Send + 'static,
  R: Send + 'static,
  M: IntoSourceSlot<R>,
  F: Fn(Item) -> M + Send + Sync + 'static,
{
  fn subscribe(&self, observer: BoxedFlowObserver<R>) {
    let state =
      MergeState::new(QueueSupply::new(), self.max_concurrency, self.delay_errors, self.emission);
    if !state.attach(observer) {
      return;
    }
    self.source.subscribe(Box::new(OuterObserver {
      state,
      mapper: self.mapper.clone(),
      index: 0,
    }));
  }
}

struct OuterObserver<R, F> {
  state: Arc<MergeState<R, QueueSupply<R>>>,
  mapper: Arc<F>,
  index: usize,
}

impl<Item, R, M, F> FlowObserver<Item> for OuterObserver<R, F>
where
  R: Send + 'static,
  M: IntoSourceSlot<R>,
  F: Fn(Item) -> M + Send + Sync,
{
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) {
    self.state.set_upstream(subscription);
  }

  fn on_next(&mut self, value: Item) {
    if !self.state.is_accepting() {
      return;
    }
    let index = self.index;
    self.index += 1;
    match (self.mapper)(value).into_slot().into_source(index) {
      Ok(source) => self.state.supply_with(|supply| supply.push(source)),
      Err(err) => self.state.fatal(err),
    }
  }

  fn on_error(self, err: MaybeError) { self.state.upstream_error(err) }

  fn on_complete(self) { self.state.supply_with(QueueSupply::finish) }
}
