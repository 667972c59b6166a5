//! Timeout operator
//!
//! Races a timer against the source. Whichever signals first wins: a source
//! signal cancels the timer, the timer disposes the source and either fails
//! with [`MaybeError::Timeout`] or switches to a fallback source.
//!
//! ```rust
//! use std::time::Duration;
//! use rxmaybe::prelude::*;
//!
//! let scheduler = TestScheduler::new();
//! let test = TestMaybeObserver::<i32>::new();
//! Maybe::never()
//!   .timeout_or(Duration::from_secs(1), scheduler.clone(), Maybe::just(0))
//!   .subscribe_with(test.clone());
//!
//! scheduler.advance_by(Duration::from_secs(1));
//! test.assert_value(0);
//! ```

use std::{
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
  time::Duration,
};

use crate::{
  coordinator::MaybeDownstream,
  error::MaybeError,
  maybe::{Maybe, MaybeSource},
  observer::{BoxedMaybeObserver, MaybeObserver},
  scheduler::{Scheduler, SharedScheduler},
  subscription::{SetOnceSubscription, Subscription, SubscriptionHandle},
};

impl<Item: Send + 'static> Maybe<Item> {
  /// Fail with [`MaybeError::Timeout`] unless the source signals within
  /// `duration`.
  pub fn timeout(&self, duration: Duration, scheduler: impl Scheduler + 'static) -> Maybe<Item> {
    Maybe::new(Timeout {
      source: self.clone(),
      duration,
      scheduler: Arc::new(scheduler),
      fallback: None,
    })
  }

  /// Switch to `fallback` unless the source signals within `duration`.
  pub fn timeout_or(
    &self, duration: Duration, scheduler: impl Scheduler + 'static, fallback: Maybe<Item>,
  ) -> Maybe<Item> {
    Maybe::new(Timeout {
      source: self.clone(),
      duration,
      scheduler: Arc::new(scheduler),
      fallback: Some(fallback),
    })
  }
}

struct Timeout<Item> {
  source: Maybe<Item>,
  duration: Duration,
  scheduler: SharedScheduler,
  fallback: Option<Maybe<Item>>,
}

impl<Item: Send + 'static> MaybeSource<Item> for Timeout<Item> {
  fn subscribe(&self, mut observer: BoxedMaybeObserver<Item>) {
    let state = Arc::new(TimeoutState {
      exclude: AtomicBool::new(false),
      disposed: AtomicBool::new(false),
      timer: SetOnceSubscription::new(),
      main: SetOnceSubscription::new(),
      fallback: SetOnceSubscription::new(),
      downstream: MaybeDownstream::new(),
    });
    observer.on_subscribe(state.clone().into());
    if state.is_closed() {
      return;
    }
    state.downstream.set(observer);

    let on_timeout = state.clone();
    let fallback = self.fallback.clone();
    let timer = self
      .scheduler
      .schedule(self.duration, Box::new(move || on_timeout.fire(fallback)));
    state.timer.set(timer);

    self.source.subscribe(Box::new(MainObserver(state)));
  }
}

struct TimeoutState<Item> {
  /// Set by whichever of the timer and the source commits first.
  exclude: AtomicBool,
  disposed: AtomicBool,
  timer: SetOnceSubscription,
  main: SetOnceSubscription,
  fallback: SetOnceSubscription,
  downstream: MaybeDownstream<Item>,
}

impl<Item: Send + 'static> TimeoutState<Item> {
  /// Claim the race for the source; `None` when the timer already won.
  fn source_wins(&self) -> Option<BoxedMaybeObserver<Item>> {
    if self.exclude.swap(true, Ordering::AcqRel) {
      return None;
    }
    self.timer.unsubscribe();
    self.downstream.take()
  }

  fn fire(self: Arc<Self>, fallback: Option<Maybe<Item>>) {
    if self.exclude.swap(true, Ordering::AcqRel) {
      return;
    }
    self.main.unsubscribe();
    match fallback {
      Some(fallback) => {
        tracing::debug!("timeout: switching to the fallback source");
        fallback.subscribe(Box::new(FallbackObserver(self)));
      }
      None => {
        tracing::debug!("timeout: no signal in time");
        self.downstream.error(MaybeError::Timeout);
      }
    }
  }
}

impl<Item: Send> Subscription for TimeoutState<Item> {
  fn unsubscribe(&self) {
    if !self.disposed.swap(true, Ordering::AcqRel) {
      self.exclude.store(true, Ordering::Release);
      self.timer.unsubscribe();
      self.main.unsubscribe();
      self.fallback.unsubscribe();
      self.downstream.clear();
    }
  }

  fn is_closed(&self) -> bool { self.disposed.load(Ordering::Acquire) }
}

struct MainObserver<Item>(Arc<TimeoutState<Item>>);

impl<Item: Send + 'static> MaybeObserver<Item> for MainObserver<Item> {
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) { self.0.main.set(subscription); }

  fn on_success(self, value: Item) {
    if let Some(observer) = self.0.source_wins() {
      observer.on_success(value);
    }
  }

  fn on_error(self, err: MaybeError) {
    match self.0.source_wins() {
      Some(observer) => observer.on_error(err),
      None => tracing::debug!(error = %err, "timeout: source error after the timer fired"),
    }
  }

  fn on_complete(self) {
    if let Some(observer) = self.0.source_wins() {
      observer.on_complete();
    }
  }
}

struct FallbackObserver<Item>(Arc<TimeoutState<Item>>);

impl<Item: Send + 'static> MaybeObserver<Item> for FallbackObserver<Item> {
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) {
    self.0.fallback.set(subscription);
  }

  fn on_success(self, value: Item) { self.0.downstream.success(value) }

  fn on_error(self, err: MaybeError) { self.0.downstream.error(err) }

  fn on_complete(self) { self.0.downstream.complete() }
}
