//! Merge and ConcatEager operators
//!
//! Both run up to `max_concurrency` sources at the same time (`usize::MAX`
//! for no limit) and emit their successes as one [`Flow`]:
//!
//! - `merge` emits in completion order: whichever source succeeds first is
//!   emitted first.
//! - `concat_eager` subscribes just as eagerly but emits in source order, a
//!   result waits until every earlier source was emitted.
//!
//! ```rust
//! use rxmaybe::prelude::*;
//!
//! let first = MaybeSubject::new();
//! let second = MaybeSubject::new();
//! let test = TestFlowObserver::new();
//! Maybe::concat_eager(vec![first.to_maybe(), second.to_maybe()], usize::MAX, false)
//!   .subscribe_with(test.clone());
//!
//! second.on_success(2);
//! first.on_success(1);
//! test.assert_values(&[1, 2]);
//! ```
//!
//! With `delay_errors` every error is kept until all sources terminated and
//! then reported as one composite. A missing source or a failing source
//! sequence stops pulling further sources in both modes.

use crate::{
  coordinator::merge::{subscribe_merge, Emission, IterSupply},
  flow::{Flow, FlowSource},
  maybe::{IntoSourceSlot, Maybe},
  observer::BoxedFlowObserver,
};

impl<Item: Send + 'static> Maybe<Item> {
  /// Run up to `max_concurrency` sources at once, emitting successes as they
  /// arrive.
  pub fn merge<I>(sources: I, max_concurrency: usize, delay_errors: bool) -> Flow<Item>
  where
    I: IntoIterator + Clone + Send + Sync + 'static,
    I::IntoIter: Send + 'static,
    I::Item: IntoSourceSlot<Item>,
  {
    Flow::new(Merge { sources, max_concurrency, delay_errors, emission: Emission::Unordered })
  }

  /// [`Maybe::merge`] with no concurrency limit, failing fast.
  pub fn merge_all<I>(sources: I) -> Flow<Item>
  where
    I: IntoIterator + Clone + Send + Sync + 'static,
    I::IntoIter: Send + 'static,
    I::Item: IntoSourceSlot<Item>,
  {
    Self::merge(sources, usize::MAX, false)
  }

  /// Run up to `max_concurrency` sources at once, emitting successes in
  /// source order.
  pub fn concat_eager<I>(sources: I, max_concurrency: usize, delay_errors: bool) -> Flow<Item>
  where
    I: IntoIterator + Clone + Send + Sync + 'static,
    I::IntoIter: Send + 'static,
    I::Item: IntoSourceSlot<Item>,
  {
    Flow::new(Merge { sources, max_concurrency, delay_errors, emission: Emission::Ordered })
  }
}

struct Merge<I> {
  sources: I,
  max_concurrency: usize,
  delay_errors: bool,
  emission: Emission,
}

impl<Item, I> FlowSource<Item> for Merge<I>
where
  Item: Send + 'static,
  I: IntoIterator + Clone + Send + Sync,
  I::IntoIter: Send + 'static,
  I::Item: IntoSourceSlot<Item>,
{
  fn subscribe(&self, observer: BoxedFlowObserver<Item>) {
    let slots = self.sources.clone().into_iter().map(|slot| slot.into_slot());
    subscribe_merge(
      IterSupply::new(slots),
      self.max_concurrency,
      self.delay_errors,
      self.emission,
      observer,
    );
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
  };

  use super::*;
  use crate::{
    error::MaybeError, subject::MaybeSubject, subscription::Subscription,
    testing::TestFlowObserver,
  };

  fn subjects(n: usize) -> Vec<MaybeSubject<i32>> { (0..n).map(|_| MaybeSubject::new()).collect() }

  fn maybes(subjects: &[MaybeSubject<i32>]) -> Vec<Maybe<i32>> {
    subjects.iter().map(MaybeSubject::to_maybe).collect()
  }

  #[rxmaybe_macro::test]
  fn merge_emits_in_completion_order() {
    let s = subjects(3);
    let test = TestFlowObserver::new();
    Maybe::merge(maybes(&s), usize::MAX, false).subscribe_with(test.clone());

    s[2].on_success(3);
    s[0].on_complete();
    s[1].on_success(2);
    test.assert_values(&[3, 2]);
    test.assert_completed();
  }

  #[rxmaybe_macro::test]
  fn concat_eager_preserves_source_order() {
    let s = subjects(3);
    let test = TestFlowObserver::new();
    Maybe::concat_eager(maybes(&s), usize::MAX, false).subscribe_with(test.clone());
    assert!(s.iter().all(MaybeSubject::has_observers));

    s[1].on_success(2);
    s[2].on_success(3);
    assert_eq!(test.value_count(), 0);
    s[0].on_success(1);
    test.assert_values(&[1, 2, 3]);
    test.assert_completed();
  }

  #[rxmaybe_macro::test]
  fn concat_eager_skips_empty_slots_in_order() {
    let s = subjects(3);
    let test = TestFlowObserver::new();
    Maybe::concat_eager(maybes(&s), usize::MAX, false).subscribe_with(test.clone());

    s[2].on_success(3);
    s[0].on_complete();
    test.assert_values(&[]);
    s[1].on_success(2);
    test.assert_values(&[2, 3]);
  }

  #[rxmaybe_macro::test]
  fn bounded_concurrency_holds_back_sources() {
    let s = subjects(3);
    let test = TestFlowObserver::new();
    Maybe::merge(maybes(&s), 1, false).subscribe_with(test.clone());

    assert!(s[0].has_observers());
    assert!(!s[1].has_observers());
    s[0].on_success(1);
    assert!(s[1].has_observers());
    assert!(!s[2].has_observers());
    s[1].on_complete();
    s[2].on_success(3);
    test.assert_values(&[1, 3]);
    test.assert_completed();
  }

  #[rxmaybe_macro::test]
  fn active_count_never_exceeds_the_limit() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let sources: Vec<Maybe<usize>> = (0..20)
      .map(|i| {
        let (active, peak) = (active.clone(), peak.clone());
        Maybe::create(move |emitter: crate::factory::MaybeEmitter<usize>| {
          let now = active.fetch_add(1, Ordering::SeqCst) + 1;
          peak.fetch_max(now, Ordering::SeqCst);
          let active = active.clone();
          std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(2));
            active.fetch_sub(1, Ordering::SeqCst);
            emitter.success(i);
          });
        })
      })
      .collect();

    let test = TestFlowObserver::new();
    Maybe::merge(sources, 3, false).subscribe_with(test.clone());
    assert!(test.await_terminal(std::time::Duration::from_secs(10)));
    assert_eq!(test.value_count(), 20);
    assert!(peak.load(Ordering::SeqCst) <= 3);
  }

  #[rxmaybe_macro::test]
  fn fail_fast_disposes_the_rest() {
    let s = subjects(3);
    let test = TestFlowObserver::new();
    Maybe::merge(maybes(&s), usize::MAX, false).subscribe_with(test.clone());

    s[1].on_error(MaybeError::msg("boom"));
    test.assert_error_message("boom");
    assert!(s.iter().all(|s| !s.has_observers()));
  }

  #[rxmaybe_macro::test]
  fn delay_errors_reports_composite_after_all_terminate() {
    let s = subjects(3);
    let test = TestFlowObserver::new();
    Maybe::merge(maybes(&s), usize::MAX, true).subscribe_with(test.clone());

    s[0].on_error(MaybeError::msg("first"));
    s[2].on_error(MaybeError::msg("second"));
    test.assert_not_terminated();
    s[1].on_success(7);

    test.assert_values(&[7]);
    test.assert_error_with(|err| {
      let messages: Vec<_> = err.causes().iter().map(ToString::to_string).collect();
      assert_eq!(messages, vec!["first", "second"]);
    });
  }

  #[rxmaybe_macro::test]
  fn missing_source_stops_pulling() {
    let s = subjects(1);
    let test = TestFlowObserver::new();
    let sources = vec![Some(s[0].to_maybe()), None, Some(Maybe::just(3))];
    Maybe::merge(sources, usize::MAX, true).subscribe_with(test.clone());

    test.assert_not_terminated();
    s[0].on_success(1);
    test.assert_values(&[1]);
    test.assert_error_with(|err| {
      assert!(matches!(err, MaybeError::MissingSource { index: 1 }));
    });
  }

  #[rxmaybe_macro::test]
  fn dispose_releases_all_active_sources() {
    let s = subjects(4);
    let test = TestFlowObserver::new();
    Maybe::merge(maybes(&s), usize::MAX, false).subscribe_with(test.clone());
    assert!(s.iter().all(MaybeSubject::has_observers));

    test.dispose();
    assert!(s.iter().all(|s| !s.has_observers()));
    test.assert_not_terminated();
  }

  #[rxmaybe_macro::test]
  fn no_sources_completes() {
    let test = TestFlowObserver::<i32>::new();
    let handle =
      Maybe::merge_all(Vec::<Maybe<i32>>::new()).subscribe_callbacks(|_| {}, |_| {}, || {});
    assert!(handle.is_closed());
    Maybe::merge_all(Vec::<Maybe<i32>>::new()).subscribe_with(test.clone());
    test.assert_completed();
  }
}
