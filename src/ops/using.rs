//! Using operator
//!
//! Ties a resource's lifetime to one subscription: the resource is created
//! on subscribe, the source is built from it, and the resource is cleaned up
//! once the source terminates or the subscription is disposed.
//!
//! With `eager` cleanup the resource is released before the terminal signal
//! goes downstream, and a cleanup failure becomes that signal's error (or is
//! appended to it). Otherwise the signal goes first and cleanup failures are
//! only logged.
//!
//! ```rust
//! use std::sync::{atomic::{AtomicBool, Ordering}, Arc};
//! use rxmaybe::prelude::*;
//!
//! let released = Arc::new(AtomicBool::new(false));
//! let r = released.clone();
//! let source = Maybe::using(
//!   || Ok(21),
//!   |res: &i32| Ok(Maybe::just(*res * 2)),
//!   move |_| {
//!     r.store(true, Ordering::SeqCst);
//!     Ok(())
//!   },
//!   true,
//! );
//! assert_eq!(source.block_for_result().unwrap(), Some(42));
//! assert!(released.load(Ordering::SeqCst));
//! ```

use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};

use parking_lot::Mutex;

use crate::{
  coordinator::MaybeDownstream,
  error::MaybeError,
  maybe::{Maybe, MaybeSource},
  observer::{BoxedMaybeObserver, MaybeObserver},
  subscription::{SetOnceSubscription, Subscription, SubscriptionHandle},
};

impl<Item: Send + 'static> Maybe<Item> {
  /// Create a resource per subscription, build the source from it and clean
  /// it up when the subscription ends.
  pub fn using<R, RF, SF, CF>(
    resource_factory: RF, source_factory: SF, cleanup: CF, eager: bool,
  ) -> Maybe<Item>
  where
    R: Send + 'static,
    RF: Fn() -> Result<R, MaybeError> + Send + Sync + 'static,
    SF: Fn(&R) -> Result<Maybe<Item>, MaybeError> + Send + Sync + 'static,
    CF: Fn(R) -> Result<(), MaybeError> + Send + Sync + 'static,
  {
    Maybe::new(Using {
      resource_factory,
      source_factory,
      cleanup: Arc::new(cleanup),
      eager,
    })
  }
}

struct Using<RF, SF, CF> {
  resource_factory: RF,
  source_factory: SF,
  cleanup: Arc<CF>,
  eager: bool,
}

fn fail<Item>(mut observer: BoxedMaybeObserver<Item>, err: MaybeError) {
  observer.on_subscribe(SubscriptionHandle::flag());
  observer.on_error(err);
}

impl<Item, R, RF, SF, CF> MaybeSource<Item> for Using<RF, SF, CF>
where
  Item: Send + 'static,
  R: Send + 'static,
  RF: Fn() -> Result<R, MaybeError> + Send + Sync,
  SF: Fn(&R) -> Result<Maybe<Item>, MaybeError> + Send + Sync,
  CF: Fn(R) -> Result<(), MaybeError> + Send + Sync + 'static,
{
  fn subscribe(&self, mut observer: BoxedMaybeObserver<Item>) {
    let resource = match (self.resource_factory)() {
      Ok(resource) => resource,
      Err(err) => return fail(observer, err),
    };
    let source = match (self.source_factory)(&resource) {
      Ok(source) => source,
      Err(err) if self.eager => {
        let err = match (self.cleanup)(resource) {
          Ok(()) => err,
          Err(cleanup_err) => MaybeError::composite(err, cleanup_err),
        };
        return fail(observer, err);
      }
      Err(err) => {
        fail(observer, err);
        if let Err(cleanup_err) = (self.cleanup)(resource) {
          tracing::warn!(error = %cleanup_err, "using: resource cleanup failed");
        }
        return;
      }
    };

    let state = Arc::new(UsingState {
      resource: Mutex::new(Some(resource)),
      cleanup: self.cleanup.clone(),
      eager: self.eager,
      upstream: SetOnceSubscription::new(),
      disposed: AtomicBool::new(false),
      downstream: MaybeDownstream::new(),
    });
    observer.on_subscribe(state.clone().into());
    if state.is_closed() {
      return;
    }
    state.downstream.set(observer);
    source.subscribe(Box::new(UsingObserver(state)));
  }
}

struct UsingState<Item, R, CF> {
  resource: Mutex<Option<R>>,
  cleanup: Arc<CF>,
  eager: bool,
  upstream: SetOnceSubscription,
  disposed: AtomicBool,
  downstream: MaybeDownstream<Item>,
}

impl<Item, R, CF> UsingState<Item, R, CF>
where
  CF: Fn(R) -> Result<(), MaybeError>,
{
  /// Release the resource if nobody did yet.
  fn release(&self) -> Result<(), MaybeError> {
    let resource = self.resource.lock().take();
    match resource {
      Some(resource) => (self.cleanup)(resource),
      None => Ok(()),
    }
  }

  fn release_logged(&self) {
    if let Err(err) = self.release() {
      tracing::warn!(error = %err, "using: resource cleanup failed");
    }
  }

  /// Deliver the terminal outcome in the configured cleanup order.
  fn finish(&self, outcome: Result<Option<Item>, MaybeError>) {
    let Some(observer) = self.downstream.take() else { return };
    if self.eager {
      let outcome = match (outcome, self.release()) {
        (outcome, Ok(())) => outcome,
        (Ok(_), Err(cleanup_err)) => Err(cleanup_err),
        (Err(err), Err(cleanup_err)) => Err(MaybeError::composite(err, cleanup_err)),
      };
      deliver(observer, outcome);
    } else {
      deliver(observer, outcome);
      self.release_logged();
    }
  }
}

fn deliver<Item>(observer: BoxedMaybeObserver<Item>, outcome: Result<Option<Item>, MaybeError>) {
  match outcome {
    Ok(Some(v)) => observer.on_success(v),
    Ok(None) => observer.on_complete(),
    Err(err) => observer.on_error(err),
  }
}

impl<Item, R, CF> Subscription for UsingState<Item, R, CF>
where
  Item: Send,
  R: Send,
  CF: Fn(R) -> Result<(), MaybeError> + Send + Sync,
{
  fn unsubscribe(&self) {
    if !self.disposed.swap(true, Ordering::AcqRel) {
      self.upstream.unsubscribe();
      self.downstream.clear();
      self.release_logged();
    }
  }

  fn is_closed(&self) -> bool { self.disposed.load(Ordering::Acquire) }
}

struct UsingObserver<Item, R, CF>(Arc<UsingState<Item, R, CF>>);

impl<Item, R, CF> MaybeObserver<Item> for UsingObserver<Item, R, CF>
where
  Item: Send,
  R: Send,
  CF: Fn(R) -> Result<(), MaybeError> + Send + Sync,
{
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) {
    self.0.upstream.set(subscription);
  }

  fn on_success(self, value: Item) { self.0.finish(Ok(Some(value))) }

  fn on_error(self, err: MaybeError) { self.0.finish(Err(err)) }

  fn on_complete(self) { self.0.finish(Ok(None)) }
}
