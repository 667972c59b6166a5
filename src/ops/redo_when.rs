//! RetryWhen and RepeatWhen operators
//!
//! The resubscription decision is handed to user code as a flow. Each
//! terminal signal of interest is pushed into a subject; the handler turns
//! that flow of signals into a trigger flow, and every trigger item
//! resubscribes the source.
//!
//! | | Signals pushed | Trigger error | Trigger completion |
//! |---|---|---|---|
//! | `retry_when` | each source error | ends with that error | ends with [`MaybeError::OutOfRange`] |
//! | `repeat_when` | `()` after each success or empty | ends with that error | completes the flow |
//!
//! A handler returning `Err` fails the subscription right away.
//!
//! ```rust
//! use std::sync::{atomic::{AtomicUsize, Ordering}, Arc};
//! use rxmaybe::prelude::*;
//!
//! let calls = Arc::new(AtomicUsize::new(0));
//! let c = calls.clone();
//! let flaky = Maybe::from_fn(move || match c.fetch_add(1, Ordering::SeqCst) {
//!   0 | 1 => Err(MaybeError::msg("busy")),
//!   n => Ok(Some(n)),
//! });
//!
//! // Every error triggers one more attempt.
//! let value = flaky.retry_when(|errors| Ok(errors)).block_for_result();
//! assert_eq!(value.unwrap(), Some(2));
//! ```

use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};

use crate::{
  coordinator::{MaybeDownstream, SerializedFlow, WorkInProgress},
  error::MaybeError,
  flow::{Flow, FlowSource},
  maybe::{Maybe, MaybeSource},
  observer::{BoxedFlowObserver, BoxedMaybeObserver, FlowObserver, MaybeObserver},
  subject::PublishSubject,
  subscription::{SerialSubscription, SetOnceSubscription, Subscription, SubscriptionHandle},
};

impl<Item: Send + 'static> Maybe<Item> {
  /// Resubscribe whenever the flow built by `handler` from the source errors
  /// emits an item.
  pub fn retry_when<U, F>(&self, handler: F) -> Maybe<Item>
  where
    U: Send + 'static,
    F: Fn(Flow<MaybeError>) -> Result<Flow<U>, MaybeError> + Send + Sync + 'static,
  {
    Maybe::new(RetryWhen { source: self.clone(), handler })
  }

  /// Emit each success and subscribe again whenever the flow built by
  /// `handler` from the completed rounds emits an item.
  pub fn repeat_when<U, F>(&self, handler: F) -> Flow<Item>
  where
    U: Send + 'static,
    F: Fn(Flow<()>) -> Result<Flow<U>, MaybeError> + Send + Sync + 'static,
  {
    Flow::new(RepeatWhen { source: self.clone(), handler })
  }
}

/// Drives the resubscriptions of one `retry_when`/`repeat_when` run.
trait Redo: Send + Sync {
  fn trigger_slot(&self) -> &SetOnceSubscription;

  fn resubscribe(self: Arc<Self>);

  fn trigger_error(&self, err: MaybeError);

  fn trigger_complete(&self);
}

struct TriggerObserver<S>(Arc<S>);

impl<U, S: Redo + 'static> FlowObserver<U> for TriggerObserver<S> {
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) {
    self.0.trigger_slot().set(subscription);
  }

  fn on_next(&mut self, _: U) { self.0.clone().resubscribe() }

  fn on_error(self, err: MaybeError) { self.0.trigger_error(err) }

  fn on_complete(self) { self.0.trigger_complete() }
}

// ============================================================================
// RetryWhen
// ============================================================================

struct RetryWhen<Item, F> {
  source: Maybe<Item>,
  handler: F,
}

impl<Item, U, F> MaybeSource<Item> for RetryWhen<Item, F>
where
  Item: Send + 'static,
  U: Send + 'static,
  F: Fn(Flow<MaybeError>) -> Result<Flow<U>, MaybeError> + Send + Sync,
{
  fn subscribe(&self, mut observer: BoxedMaybeObserver<Item>) {
    let errors = PublishSubject::new();
    let trigger = match (self.handler)(errors.to_flow()) {
      Ok(trigger) => trigger,
      Err(err) => {
        observer.on_subscribe(SubscriptionHandle::flag());
        observer.on_error(err);
        return;
      }
    };

    let state = Arc::new(RetryWhenState {
      source: self.source.clone(),
      errors,
      wip: WorkInProgress::new(),
      current: SerialSubscription::new(),
      trigger: SetOnceSubscription::new(),
      done: AtomicBool::new(false),
      downstream: MaybeDownstream::new(),
    });
    observer.on_subscribe(state.clone().into());
    if state.is_closed() {
      return;
    }
    state.downstream.set(observer);
    trigger.subscribe_with(TriggerObserver(state.clone()));
    state.resubscribe();
  }
}

struct RetryWhenState<Item> {
  source: Maybe<Item>,
  errors: PublishSubject<MaybeError>,
  wip: WorkInProgress,
  current: SerialSubscription,
  trigger: SetOnceSubscription,
  done: AtomicBool,
  downstream: MaybeDownstream<Item>,
}

impl<Item: Send + 'static> RetryWhenState<Item> {
  /// Commit the terminal signal and release both subscriptions.
  fn terminate(&self) -> Option<BoxedMaybeObserver<Item>> {
    if self.done.swap(true, Ordering::AcqRel) {
      return None;
    }
    self.current.unsubscribe();
    self.trigger.unsubscribe();
    self.downstream.take()
  }
}

impl<Item: Send + 'static> Redo for RetryWhenState<Item> {
  fn trigger_slot(&self) -> &SetOnceSubscription { &self.trigger }

  fn resubscribe(self: Arc<Self>) {
    self.wip.drain(|| {
      if !self.done.load(Ordering::Acquire) {
        self.source.subscribe(Box::new(RetryWhenObserver(self.clone())));
      }
    })
  }

  fn trigger_error(&self, err: MaybeError) {
    if let Some(observer) = self.terminate() {
      observer.on_error(err);
    }
  }

  fn trigger_complete(&self) {
    if let Some(observer) = self.terminate() {
      observer.on_error(MaybeError::OutOfRange("retry_when trigger completed"));
    }
  }
}

impl<Item: Send + 'static> Subscription for RetryWhenState<Item> {
  fn unsubscribe(&self) {
    if !self.done.swap(true, Ordering::AcqRel) {
      self.current.unsubscribe();
      self.trigger.unsubscribe();
      self.downstream.clear();
    }
  }

  fn is_closed(&self) -> bool { self.done.load(Ordering::Acquire) }
}

struct RetryWhenObserver<Item>(Arc<RetryWhenState<Item>>);

impl<Item: Send + 'static> MaybeObserver<Item> for RetryWhenObserver<Item> {
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) {
    self.0.current.replace(subscription)
  }

  fn on_success(self, value: Item) {
    if let Some(observer) = self.0.terminate() {
      observer.on_success(value);
    }
  }

  fn on_error(self, err: MaybeError) {
    if !self.0.done.load(Ordering::Acquire) {
      tracing::debug!(error = %err, "retry_when: signalling the handler");
      self.0.errors.on_next(err);
    }
  }

  fn on_complete(self) {
    if let Some(observer) = self.0.terminate() {
      observer.on_complete();
    }
  }
}

// ============================================================================
// RepeatWhen
// ============================================================================

struct RepeatWhen<Item, F> {
  source: Maybe<Item>,
  handler: F,
}

impl<Item, U, F> FlowSource<Item> for RepeatWhen<Item, F>
where
  Item: Send + 'static,
  U: Send + 'static,
  F: Fn(Flow<()>) -> Result<Flow<U>, MaybeError> + Send + Sync,
{
  fn subscribe(&self, mut observer: BoxedFlowObserver<Item>) {
    let rounds = PublishSubject::new();
    let trigger = match (self.handler)(rounds.to_flow()) {
      Ok(trigger) => trigger,
      Err(err) => {
        observer.on_subscribe(SubscriptionHandle::flag());
        observer.on_error(err);
        return;
      }
    };

    // The downstream is wrapped once it accepted the subscription; until
    // then this slot stands in for the state.
    let cancel = Arc::new(SetOnceSubscription::new());
    observer.on_subscribe(cancel.clone().into());
    if cancel.is_closed() {
      return;
    }
    let state = Arc::new(RepeatWhenState {
      source: self.source.clone(),
      rounds,
      wip: WorkInProgress::new(),
      current: SerialSubscription::new(),
      trigger: SetOnceSubscription::new(),
      done: AtomicBool::new(false),
      downstream: SerializedFlow::new(observer),
    });
    if !cancel.set(state.clone().into()) {
      return;
    }
    trigger.subscribe_with(TriggerObserver(state.clone()));
    state.resubscribe();
  }
}

struct RepeatWhenState<Item> {
  source: Maybe<Item>,
  rounds: PublishSubject<()>,
  wip: WorkInProgress,
  current: SerialSubscription,
  trigger: SetOnceSubscription,
  done: AtomicBool,
  downstream: Arc<SerializedFlow<Item>>,
}

impl<Item: Send + 'static> RepeatWhenState<Item> {
  fn finish(&self, err: Option<MaybeError>) {
    if self.done.swap(true, Ordering::AcqRel) {
      return;
    }
    self.current.unsubscribe();
    self.trigger.unsubscribe();
    match err {
      Some(err) => self.downstream.error(err),
      None => self.downstream.complete(),
    }
  }

  fn round_done(&self) {
    if !self.done.load(Ordering::Acquire) {
      tracing::trace!("repeat_when: signalling the handler");
      self.rounds.on_next(());
    }
  }
}

impl<Item: Send + 'static> Redo for RepeatWhenState<Item> {
  fn trigger_slot(&self) -> &SetOnceSubscription { &self.trigger }

  fn resubscribe(self: Arc<Self>) {
    self.wip.drain(|| {
      if !self.done.load(Ordering::Acquire) {
        self.source.subscribe(Box::new(RepeatWhenObserver(self.clone())));
      }
    })
  }

  fn trigger_error(&self, err: MaybeError) { self.finish(Some(err)) }

  fn trigger_complete(&self) { self.finish(None) }
}

impl<Item: Send + 'static> Subscription for RepeatWhenState<Item> {
  fn unsubscribe(&self) {
    if !self.done.swap(true, Ordering::AcqRel) {
      self.current.unsubscribe();
      self.trigger.unsubscribe();
      self.downstream.cancel();
    }
  }

  fn is_closed(&self) -> bool { self.done.load(Ordering::Acquire) }
}

struct RepeatWhenObserver<Item>(Arc<RepeatWhenState<Item>>);

impl<Item: Send + 'static> MaybeObserver<Item> for RepeatWhenObserver<Item> {
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) {
    self.0.current.replace(subscription)
  }

  fn on_success(self, value: Item) {
    if !self.0.done.load(Ordering::Acquire) {
      self.0.downstream.next(value);
    }
    self.0.round_done();
  }

  fn on_error(self, err: MaybeError) { self.0.finish(Some(err)) }

  fn on_complete(self) { self.0.round_done() }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::AtomicUsize;

  use super::*;
  use crate::{
    subject::MaybeSubject,
    testing::{TestFlowObserver, TestMaybeObserver},
  };

  fn flaky(times: usize) -> (Maybe<usize>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let source = Maybe::from_fn(move || {
      let attempt = c.fetch_add(1, Ordering::SeqCst) + 1;
      if attempt <= times {
        Err(MaybeError::msg(format!("failure {attempt}")))
      } else {
        Ok(Some(attempt))
      }
    });
    (source, calls)
  }

  #[rxmaybe_macro::test]
  fn retry_when_resubscribes_on_trigger() {
    let (source, calls) = flaky(3);
    let test = TestMaybeObserver::new();
    source.retry_when(Ok).subscribe_with(test.clone());
    test.assert_value(4);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
  }

  #[rxmaybe_macro::test]
  fn retry_when_trigger_error_ends_it() {
    let (source, calls) = flaky(10);
    let test = TestMaybeObserver::new();
    source
      .retry_when(|errors| {
        Ok(errors.concat_map(
          |err: MaybeError| {
            if err.to_string() == "failure 2" {
              Maybe::error(MaybeError::msg("give up"))
            } else {
              Maybe::just(())
            }
          },
          false,
        ))
      })
      .subscribe_with(test.clone());
    test.assert_error_message("give up");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[rxmaybe_macro::test]
  fn retry_when_trigger_completion_is_out_of_range() {
    let (source, calls) = flaky(1);
    let test = TestMaybeObserver::new();
    source.retry_when(|_| Ok(Flow::<()>::empty())).subscribe_with(test.clone());
    test.assert_error_with(|err| assert!(err.is_out_of_range()));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[rxmaybe_macro::test]
  fn retry_when_handler_failure_fails_subscription() {
    let (source, calls) = flaky(1);
    let test = TestMaybeObserver::new();
    source
      .retry_when(|_| Err::<Flow<()>, _>(MaybeError::msg("no handler")))
      .subscribe_with(test.clone());
    test.assert_error_message("no handler");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[rxmaybe_macro::test]
  fn retry_when_dispose_releases_source_and_trigger() {
    let subject = MaybeSubject::<i32>::new();
    let trigger = PublishSubject::<()>::new();
    let t = trigger.clone();
    let test = TestMaybeObserver::new();
    subject.to_maybe().retry_when(move |_| Ok(t.to_flow())).subscribe_with(test.clone());
    assert!(subject.has_observers());
    assert!(trigger.has_observers());

    test.dispose();
    assert!(!subject.has_observers());
    assert!(!trigger.has_observers());
  }

  #[rxmaybe_macro::test]
  fn repeat_when_emits_each_round() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let source = Maybe::from_fn(move || Ok(Some(c.fetch_add(1, Ordering::SeqCst))));
    let trigger = PublishSubject::<()>::new();
    let t = trigger.clone();
    let test = TestFlowObserver::new();
    source.repeat_when(move |_| Ok(t.to_flow())).subscribe_with(test.clone());

    test.assert_values(&[0]);
    trigger.on_next(());
    trigger.on_next(());
    test.assert_values(&[0, 1, 2]);
    trigger.on_complete();
    test.assert_completed();
  }

  #[rxmaybe_macro::test]
  fn repeat_when_follows_the_rounds_flow() {
    let test = TestFlowObserver::new();
    let t = test.clone();
    Maybe::just(5)
      .repeat_when(move |rounds| {
        let t = t.clone();
        Ok(rounds.concat_map(
          move |_| {
            if t.value_count() < 3 {
              Maybe::just(())
            } else {
              Maybe::error(MaybeError::msg("enough"))
            }
          },
          false,
        ))
      })
      .subscribe_with(test.clone());
    test.assert_values(&[5, 5, 5]);
    test.assert_error_message("enough");
  }

  #[rxmaybe_macro::test]
  fn repeat_when_source_error_ends_it() {
    let trigger = PublishSubject::<()>::new();
    let t = trigger.clone();
    let test = TestFlowObserver::<i32>::new();
    Maybe::<i32>::error(MaybeError::msg("broken"))
      .repeat_when(move |_| Ok(t.to_flow()))
      .subscribe_with(test.clone());
    test.assert_error_message("broken");
    assert!(!trigger.has_observers());
  }
}
