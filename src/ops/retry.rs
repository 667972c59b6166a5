//! Retry and Repeat operators
//!
//! Both resubscribe to the same source: `retry` after an error, `repeat`
//! after a success or an empty completion. Whether another round runs is
//! decided by a policy:
//!
//! | Policy | `retry` | `repeat` |
//! |--------|---------|----------|
//! | `n: usize` | at most `n` resubscriptions | `n` subscriptions in total |
//! | [`Always`] | until a success | forever, until unsubscribed |
//! | [`RetryWhile`] / [`RepeatWhile`] | while the closure returns `Ok(true)` | same |
//!
//! A policy closure returning `Err` ends the operator; for `retry` the
//! reported error is a composite of the source error and the policy error.
//!
//! Resubscription runs on the drain loop, so a source failing synchronously
//! any number of times never grows the stack.
//!
//! ```rust
//! use std::sync::{atomic::{AtomicUsize, Ordering}, Arc};
//! use rxmaybe::prelude::*;
//!
//! let calls = Arc::new(AtomicUsize::new(0));
//! let c = calls.clone();
//! let flaky = Maybe::from_fn(move || match c.fetch_add(1, Ordering::SeqCst) {
//!   0 => Err(MaybeError::msg("not yet")),
//!   n => Ok(Some(n)),
//! });
//! assert_eq!(flaky.retry(1).block_for_result().unwrap(), Some(1));
//! ```

use std::sync::{
  atomic::{AtomicBool, AtomicUsize, Ordering},
  Arc,
};

use crate::{
  coordinator::{FlowDownstream, MaybeDownstream, WorkInProgress},
  error::MaybeError,
  flow::{Flow, FlowSource},
  maybe::{Maybe, MaybeSource},
  observer::{BoxedFlowObserver, BoxedMaybeObserver, FlowObserver, MaybeObserver},
  subscription::{SerialSubscription, Subscription, SubscriptionHandle},
};

// ============================================================================
// Policies
// ============================================================================

/// Decides whether `retry` resubscribes after an error.
pub trait RetryPolicy: Send + Sync + 'static {
  /// `failures` counts the errors seen so far, starting at 1.
  fn should_retry(&self, err: &MaybeError, failures: usize) -> Result<bool, MaybeError>;
}

/// Decides whether `repeat` subscribes once more after a round ended without
/// error.
pub trait RepeatPolicy: Send + Sync + 'static {
  /// `rounds` counts the finished subscriptions, starting at 1.
  fn should_repeat(&self, rounds: usize) -> Result<bool, MaybeError>;
}

/// Resubscribe unconditionally.
#[derive(Clone, Copy, Debug, Default)]
pub struct Always;

/// Retry while the closure over the error and the failure count holds.
pub struct RetryWhile<F>(pub F);

/// Repeat while the closure over the finished round count holds.
pub struct RepeatWhile<F>(pub F);

impl RetryPolicy for usize {
  #[inline]
  fn should_retry(&self, _: &MaybeError, failures: usize) -> Result<bool, MaybeError> {
    Ok(failures <= *self)
  }
}

impl RetryPolicy for Always {
  #[inline]
  fn should_retry(&self, _: &MaybeError, _: usize) -> Result<bool, MaybeError> { Ok(true) }
}

impl<F> RetryPolicy for RetryWhile<F>
where
  F: Fn(&MaybeError, usize) -> Result<bool, MaybeError> + Send + Sync + 'static,
{
  fn should_retry(&self, err: &MaybeError, failures: usize) -> Result<bool, MaybeError> {
    (self.0)(err, failures)
  }
}

impl RepeatPolicy for usize {
  #[inline]
  fn should_repeat(&self, rounds: usize) -> Result<bool, MaybeError> { Ok(rounds < *self) }
}

impl RepeatPolicy for Always {
  #[inline]
  fn should_repeat(&self, _: usize) -> Result<bool, MaybeError> { Ok(true) }
}

impl<F> RepeatPolicy for RepeatWhile<F>
where
  F: Fn(usize) -> Result<bool, MaybeError> + Send + Sync + 'static,
{
  fn should_repeat(&self, rounds: usize) -> Result<bool, MaybeError> { (self.0)(rounds) }
}

impl<Item: Send + 'static> Maybe<Item> {
  /// Resubscribe after errors as long as `policy` allows it.
  pub fn retry(&self, policy: impl RetryPolicy) -> Maybe<Item> {
    Maybe::new(Retry { source: self.clone(), policy: Arc::new(policy) })
  }

  /// Subscribe again after every success or empty completion as long as
  /// `policy` allows it, emitting each success.
  pub fn repeat(&self, policy: impl RepeatPolicy) -> Flow<Item> {
    Flow::new(Repeat { source: self.clone(), policy: Arc::new(policy) })
  }
}

// ============================================================================
// Retry
// ============================================================================

struct Retry<Item, P> {
  source: Maybe<Item>,
  policy: Arc<P>,
}

impl<Item, P> MaybeSource<Item> for Retry<Item, P>
where
  Item: Send + 'static,
  P: RetryPolicy,
{
  fn subscribe(&self, mut observer: BoxedMaybeObserver<Item>) {
    let state = Arc::new(RetryState {
      source: self.source.clone(),
      policy: self.policy.clone(),
      failures: AtomicUsize::new(0),
      wip: WorkInProgress::new(),
      current: SerialSubscription::new(),
      disposed: AtomicBool::new(false),
      downstream: MaybeDownstream::new(),
    });
    observer.on_subscribe(state.clone().into());
    if state.is_closed() {
      return;
    }
    state.downstream.set(observer);
    state.resubscribe();
  }
}

struct RetryState<Item, P> {
  source: Maybe<Item>,
  policy: Arc<P>,
  failures: AtomicUsize,
  wip: WorkInProgress,
  current: SerialSubscription,
  disposed: AtomicBool,
  downstream: MaybeDownstream<Item>,
}

impl<Item: Send + 'static, P: RetryPolicy> RetryState<Item, P> {
  fn resubscribe(self: &Arc<Self>) {
    self.wip.drain(|| {
      if !self.disposed.load(Ordering::Acquire) {
        self.source.subscribe(Box::new(RetryObserver(self.clone())));
      }
    })
  }

  fn terminate(&self) -> Option<BoxedMaybeObserver<Item>> {
    if self.disposed.swap(true, Ordering::AcqRel) {
      return None;
    }
    self.downstream.take()
  }
}

impl<Item: Send, P: RetryPolicy> Subscription for RetryState<Item, P> {
  fn unsubscribe(&self) {
    if !self.disposed.swap(true, Ordering::AcqRel) {
      self.current.unsubscribe();
      self.downstream.clear();
    }
  }

  fn is_closed(&self) -> bool { self.disposed.load(Ordering::Acquire) }
}

struct RetryObserver<Item, P>(Arc<RetryState<Item, P>>);

impl<Item: Send + 'static, P: RetryPolicy> MaybeObserver<Item> for RetryObserver<Item, P> {
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) {
    self.0.current.replace(subscription)
  }

  fn on_success(self, value: Item) {
    if let Some(observer) = self.0.terminate() {
      observer.on_success(value);
    }
  }

  fn on_error(self, err: MaybeError) {
    let failures = self.0.failures.fetch_add(1, Ordering::AcqRel) + 1;
    let outcome = match self.0.policy.should_retry(&err, failures) {
      Ok(true) => {
        tracing::debug!(failures, error = %err, "retry: resubscribing");
        self.0.resubscribe();
        return;
      }
      Ok(false) => err,
      Err(policy_err) => MaybeError::composite(err, policy_err),
    };
    if let Some(observer) = self.0.terminate() {
      observer.on_error(outcome);
    }
  }

  fn on_complete(self) {
    if let Some(observer) = self.0.terminate() {
      observer.on_complete();
    }
  }
}

// ============================================================================
// Repeat
// ============================================================================

struct Repeat<Item, P> {
  source: Maybe<Item>,
  policy: Arc<P>,
}

impl<Item, P> FlowSource<Item> for Repeat<Item, P>
where
  Item: Send + 'static,
  P: RepeatPolicy,
{
  fn subscribe(&self, mut observer: BoxedFlowObserver<Item>) {
    let state = Arc::new(RepeatState {
      source: self.source.clone(),
      policy: self.policy.clone(),
      rounds: AtomicUsize::new(0),
      wip: WorkInProgress::new(),
      current: SerialSubscription::new(),
      disposed: AtomicBool::new(false),
      downstream: FlowDownstream::new(),
    });
    observer.on_subscribe(state.clone().into());
    if state.is_closed() {
      return;
    }
    state.downstream.set(observer);
    state.resubscribe();
  }
}

struct RepeatState<Item, P> {
  source: Maybe<Item>,
  policy: Arc<P>,
  rounds: AtomicUsize,
  wip: WorkInProgress,
  current: SerialSubscription,
  disposed: AtomicBool,
  downstream: FlowDownstream<Item>,
}

impl<Item: Send + 'static, P: RepeatPolicy> RepeatState<Item, P> {
  fn resubscribe(self: &Arc<Self>) {
    self.wip.drain(|| {
      if !self.disposed.load(Ordering::Acquire) {
        self.source.subscribe(Box::new(RepeatObserver(self.clone())));
      }
    })
  }

  fn round_done(self: &Arc<Self>) {
    let rounds = self.rounds.fetch_add(1, Ordering::AcqRel) + 1;
    match self.policy.should_repeat(rounds) {
      Ok(true) => self.resubscribe(),
      Ok(false) => self.finish(None),
      Err(err) => self.finish(Some(err)),
    }
  }

  fn finish(&self, err: Option<MaybeError>) {
    if !self.disposed.swap(true, Ordering::AcqRel) {
      self.downstream.finish(err);
    }
  }
}

impl<Item: Send, P: RepeatPolicy> Subscription for RepeatState<Item, P> {
  fn unsubscribe(&self) {
    if !self.disposed.swap(true, Ordering::AcqRel) {
      self.current.unsubscribe();
      self.downstream.clear();
    }
  }

  fn is_closed(&self) -> bool { self.disposed.load(Ordering::Acquire) }
}

struct RepeatObserver<Item, P>(Arc<RepeatState<Item, P>>);

impl<Item: Send + 'static, P: RepeatPolicy> MaybeObserver<Item> for RepeatObserver<Item, P> {
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) {
    self.0.current.replace(subscription)
  }

  fn on_success(self, value: Item) {
    let state = &self.0;
    state.downstream.next(value, || !state.disposed.load(Ordering::Acquire));
    if !state.disposed.load(Ordering::Acquire) {
      state.round_done();
    }
  }

  fn on_error(self, err: MaybeError) { self.0.finish(Some(err)) }

  fn on_complete(self) { self.0.round_done() }
}
