//! Future bridges
//!
//! [`Maybe::into_future`] awaits a Maybe from async code; dropping the future
//! disposes the subscription. [`Maybe::from_future`] runs a future per
//! subscription on a `futures` spawner and aborts it on dispose.
//!
//! ```rust
//! use rxmaybe::prelude::*;
//!
//! let value = futures::executor::block_on(Maybe::just(3).map(|v| v * 3).into_future());
//! assert_eq!(value.unwrap(), Some(9));
//! ```

use std::{
  future::Future,
  pin::Pin,
  sync::Arc,
  task::{Context, Poll, Waker},
};

use futures::{
  future::{AbortHandle, Abortable, FutureExt},
  ready,
  task::{Spawn, SpawnExt},
};
use parking_lot::Mutex;
use pin_project_lite::pin_project;

use crate::{
  error::MaybeError,
  maybe::{CaptureHandle, Maybe, MaybeSource},
  observer::{BoxedMaybeObserver, FnMaybeObserver, MaybeObserver},
  subscription::{SetOnceSubscription, Subscription, SubscriptionHandle},
};

type Outcome<Item> = Result<Option<Item>, MaybeError>;

// ============================================================================
// MaybeFuture
// ============================================================================

struct SharedState<Item> {
  outcome: Option<Outcome<Item>>,
  waker: Option<Waker>,
}

/// A future resolving with the outcome of a Maybe subscription.
///
/// The subscription starts when the future is created. Dropping the future
/// before it resolved disposes the subscription.
pub struct MaybeFuture<Item> {
  shared: Arc<Mutex<SharedState<Item>>>,
  subscription: SubscriptionHandle,
}

impl<Item> Future for MaybeFuture<Item> {
  type Output = Outcome<Item>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let mut shared = self.shared.lock();
    match shared.outcome.take() {
      Some(outcome) => Poll::Ready(outcome),
      None => {
        shared.waker = Some(cx.waker().clone());
        Poll::Pending
      }
    }
  }
}

impl<Item> Drop for MaybeFuture<Item> {
  fn drop(&mut self) { self.subscription.unsubscribe() }
}

fn resolve<Item>(shared: &Mutex<SharedState<Item>>, outcome: Outcome<Item>) {
  let waker = {
    let mut shared = shared.lock();
    shared.outcome = Some(outcome);
    shared.waker.take()
  };
  if let Some(waker) = waker {
    waker.wake();
  }
}

impl<Item: Send + 'static> Maybe<Item> {
  /// Subscribe now and return a future of the outcome.
  pub fn into_future(&self) -> MaybeFuture<Item> {
    let shared = Arc::new(Mutex::new(SharedState { outcome: None, waker: None }));
    let slot = Arc::new(SetOnceSubscription::new());
    let (s, e, c) = (shared.clone(), shared.clone(), shared.clone());
    self.subscribe_with(CaptureHandle {
      slot: slot.clone(),
      inner: FnMaybeObserver {
        success: move |v: Item| resolve(&s, Ok(Some(v))),
        error: move |err: MaybeError| resolve(&e, Err(err)),
        complete: move || resolve(&c, Ok(None)),
      },
    });
    MaybeFuture { shared, subscription: slot.into() }
  }

  /// Run the future built by `factory` on `spawner` for every subscription.
  ///
  /// `Ok(Some(v))` succeeds, `Ok(None)` completes empty, `Err` fails.
  /// Disposing aborts the spawned task.
  pub fn from_future<F, Fut, S>(factory: F, spawner: S) -> Maybe<Item>
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome<Item>> + Send + 'static,
    S: Spawn + Send + Sync + 'static,
  {
    Maybe::new(FromFuture { factory, spawner })
  }
}

// ============================================================================
// FromFuture
// ============================================================================

struct FromFuture<F, S> {
  factory: F,
  spawner: S,
}

type ObserverSlot<Item> = Arc<Mutex<Option<BoxedMaybeObserver<Item>>>>;

pin_project! {
  struct DeliverOutcome<Fut, Item> {
    #[pin]
    future: Fut,
    observer: ObserverSlot<Item>,
  }
}

impl<Fut, Item> Future for DeliverOutcome<Fut, Item>
where
  Fut: Future<Output = Outcome<Item>>,
{
  type Output = ();

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
    let this = self.project();
    let outcome = ready!(this.future.poll(cx));
    let observer = this.observer.lock().take();
    if let Some(observer) = observer {
      match outcome {
        Ok(Some(v)) => observer.on_success(v),
        Ok(None) => observer.on_complete(),
        Err(err) => observer.on_error(err),
      }
    }
    Poll::Ready(())
  }
}

impl<Item, F, Fut, S> MaybeSource<Item> for FromFuture<F, S>
where
  Item: Send + 'static,
  F: Fn() -> Fut + Send + Sync,
  Fut: Future<Output = Outcome<Item>> + Send + 'static,
  S: Spawn + Send + Sync,
{
  fn subscribe(&self, mut observer: BoxedMaybeObserver<Item>) {
    let (abort, registration) = AbortHandle::new_pair();
    let handle = SubscriptionHandle::from_fn(move || abort.abort());
    observer.on_subscribe(handle.clone());
    if handle.is_closed() {
      return;
    }

    let slot: ObserverSlot<Item> = Arc::new(Mutex::new(Some(observer)));
    let task = Abortable::new(
      DeliverOutcome { future: (self.factory)(), observer: slot.clone() },
      registration,
    );
    if let Err(err) = self.spawner.spawn(task.map(|_| ())) {
      let observer = slot.lock().take();
      if let Some(observer) = observer {
        observer.on_error(MaybeError::msg(format!("failed to spawn the future: {err}")));
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use futures::executor::block_on;

  use super::*;
  use crate::subject::MaybeSubject;

  #[rxmaybe_macro::test]
  fn into_future_resolves_later() {
    let subject = MaybeSubject::new();
    let future = subject.to_maybe().into_future();
    let s = subject.clone();
    std::thread::spawn(move || s.on_success(5));
    assert_eq!(block_on(future).unwrap(), Some(5));
  }

  #[rxmaybe_macro::test]
  fn into_future_error_and_empty() {
    assert_eq!(block_on(Maybe::<i32>::empty().into_future()).unwrap(), None);
    let err = block_on(Maybe::<i32>::error(MaybeError::msg("x")).into_future()).unwrap_err();
    assert_eq!(err.to_string(), "x");
  }

  #[rxmaybe_macro::test]
  fn dropping_the_future_disposes() {
    let subject = MaybeSubject::<i32>::new();
    let future = subject.to_maybe().into_future();
    assert!(subject.has_observers());
    drop(future);
    assert!(!subject.has_observers());
  }

  #[cfg(feature = "futures-scheduler")]
  #[rxmaybe_macro::test]
  fn from_future_runs_on_the_spawner() {
    let pool = futures::executor::ThreadPool::new().unwrap();
    let source = Maybe::from_future(|| async { Ok(Some(6)) }, pool);
    assert_eq!(source.block_for_result().unwrap(), Some(6));
    assert_eq!(source.block_for_result().unwrap(), Some(6));
  }

  #[cfg(feature = "futures-scheduler")]
  #[rxmaybe_macro::test]
  fn from_future_abort_on_dispose() {
    use crate::testing::TestMaybeObserver;

    let pool = futures::executor::ThreadPool::new().unwrap();
    let source = Maybe::<i32>::from_future(futures::future::pending, pool);
    let test = TestMaybeObserver::new();
    source.subscribe_with(test.clone());
    test.dispose();
    assert!(!test.await_terminal(std::time::Duration::from_millis(50)));
  }
}
