use std::sync::Arc;

use crate::{
  error::MaybeError,
  maybe::{Maybe, MaybeSource},
  observer::{BoxedMaybeObserver, MaybeObserver},
  subscription::SubscriptionHandle,
};

impl<Item: Send + 'static> Maybe<Item> {
  /// Transform the success value with `f`.
  pub fn map<R, F>(&self, f: F) -> Maybe<R>
  where
    R: Send + 'static,
    F: Fn(Item) -> R + Send + Sync + 'static,
  {
    Maybe::new(MapOp { source: self.clone(), func: Arc::new(f) })
  }

  /// Transform the success value with a fallible `f`; an `Err` becomes the
  /// terminal error.
  pub fn try_map<R, F>(&self, f: F) -> Maybe<R>
  where
    R: Send + 'static,
    F: Fn(Item) -> Result<R, MaybeError> + Send + Sync + 'static,
  {
    Maybe::new(TryMapOp { source: self.clone(), func: Arc::new(f) })
  }
}

struct MapOp<Item, F> {
  source: Maybe<Item>,
  func: Arc<F>,
}

impl<Item, R, F> MaybeSource<R> for MapOp<Item, F>
where
  Item: Send + 'static,
  R: 'static,
  F: Fn(Item) -> R + Send + Sync + 'static,
{
  fn subscribe(&self, observer: BoxedMaybeObserver<R>) {
    self.source.subscribe(Box::new(MapObserver { observer, func: self.func.clone() }))
  }
}

struct MapObserver<O, F> {
  observer: O,
  func: Arc<F>,
}

impl<Item, R, O, F> MaybeObserver<Item> for MapObserver<O, F>
where
  O: MaybeObserver<R>,
  F: Fn(Item) -> R + Send + Sync,
{
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) {
    self.observer.on_subscribe(subscription)
  }

  fn on_success(self, value: Item) { self.observer.on_success((self.func)(value)) }

  fn on_error(self, err: MaybeError) { self.observer.on_error(err) }

  fn on_complete(self) { self.observer.on_complete() }
}

struct TryMapOp<Item, F> {
  source: Maybe<Item>,
  func: Arc<F>,
}

impl<Item, R, F> MaybeSource<R> for TryMapOp<Item, F>
where
  Item: Send + 'static,
  R: 'static,
  F: Fn(Item) -> Result<R, MaybeError> + Send + Sync + 'static,
{
  fn subscribe(&self, observer: BoxedMaybeObserver<R>) {
    self.source.subscribe(Box::new(TryMapObserver { observer, func: self.func.clone() }))
  }
}

struct TryMapObserver<O, F> {
  observer: O,
  func: Arc<F>,
}

impl<Item, R, O, F> MaybeObserver<Item> for TryMapObserver<O, F>
where
  O: MaybeObserver<R>,
  F: Fn(Item) -> Result<R, MaybeError> + Send + Sync,
{
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) {
    self.observer.on_subscribe(subscription)
  }

  fn on_success(self, value: Item) {
    match (self.func)(value) {
      Ok(v) => self.observer.on_success(v),
      Err(err) => self.observer.on_error(err),
    }
  }

  fn on_error(self, err: MaybeError) { self.observer.on_error(err) }

  fn on_complete(self) { self.observer.on_complete() }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::TestMaybeObserver;

  #[rxmaybe_macro::test]
  fn primitive_type() {
    let test = TestMaybeObserver::new();
    Maybe::just(100).map(|v| v * 2).subscribe_with(test.clone());
    test.assert_value(200);
  }

  #[rxmaybe_macro::test]
  fn map_types_mixed() {
    let test = TestMaybeObserver::new();
    Maybe::just('a').map(|_| 1).map(|v| v.to_string()).subscribe_with(test.clone());
    test.assert_value("1".to_owned());
  }

  #[rxmaybe_macro::test]
  fn empty_and_error_pass_through() {
    let test = TestMaybeObserver::<i32>::new();
    Maybe::<i32>::empty().map(|v| v + 1).subscribe_with(test.clone());
    test.assert_empty();

    let test = TestMaybeObserver::<i32>::new();
    Maybe::<i32>::error(MaybeError::msg("e"))
      .map(|v| v + 1)
      .subscribe_with(test.clone());
    test.assert_error_message("e");
  }

  #[rxmaybe_macro::test]
  fn try_map_error_terminates() {
    let test = TestMaybeObserver::<i32>::new();
    Maybe::just("x")
      .try_map(|s| s.parse::<i32>().map_err(MaybeError::new))
      .subscribe_with(test.clone());
    test.assert_error_with(|err| assert!(matches!(err, MaybeError::Source(_))));
  }
}
