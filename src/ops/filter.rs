use std::sync::Arc;

use crate::{
  error::MaybeError,
  maybe::{Maybe, MaybeSource},
  observer::{BoxedMaybeObserver, MaybeObserver},
  subscription::SubscriptionHandle,
};

impl<Item: Send + 'static> Maybe<Item> {
  /// Keep the success value only if `predicate` holds, otherwise complete
  /// empty.
  pub fn filter<F>(&self, predicate: F) -> Maybe<Item>
  where
    F: Fn(&Item) -> bool + Send + Sync + 'static,
  {
    Maybe::new(FilterOp { source: self.clone(), predicate: Arc::new(predicate) })
  }
}

struct FilterOp<Item, F> {
  source: Maybe<Item>,
  predicate: Arc<F>,
}

impl<Item, F> MaybeSource<Item> for FilterOp<Item, F>
where
  Item: Send + 'static,
  F: Fn(&Item) -> bool + Send + Sync + 'static,
{
  fn subscribe(&self, observer: BoxedMaybeObserver<Item>) {
    self
      .source
      .subscribe(Box::new(FilterObserver { observer, predicate: self.predicate.clone() }))
  }
}

struct FilterObserver<O, F> {
  observer: O,
  predicate: Arc<F>,
}

impl<Item, O, F> MaybeObserver<Item> for FilterObserver<O, F>
where
  O: MaybeObserver<Item>,
  F: Fn(&Item) -> bool + Send + Sync,
{
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) {
    self.observer.on_subscribe(subscription)
  }

  fn on_success(self, value: Item) {
    if (self.predicate)(&value) {
      self.observer.on_success(value)
    } else {
      self.observer.on_complete()
    }
  }

  fn on_error(self, err: MaybeError) { self.observer.on_error(err) }

  fn on_complete(self) { self.observer.on_complete() }
}
