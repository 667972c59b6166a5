//! Integration tests for rxmaybe
//!
//! Exercises the coordinators end to end: concurrent inner completions,
//! disposal propagation, ordering and error aggregation.

use std::{
  sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
  },
  thread,
  time::Duration,
};

use rxmaybe::prelude::*;

const WAIT: Duration = Duration::from_secs(5);

/// A source succeeding with `value` from another thread after `after`.
fn threaded(value: i32, after: Duration) -> Maybe<i32> {
  Maybe::create(move |emitter: MaybeEmitter<i32>| {
    thread::spawn(move || {
      thread::sleep(after);
      emitter.success(value);
    });
  })
}

fn threaded_error(message: &'static str, after: Duration) -> Maybe<i32> {
  Maybe::create(move |emitter: MaybeEmitter<i32>| {
    thread::spawn(move || {
      thread::sleep(after);
      emitter.error(MaybeError::msg(message));
    });
  })
}

fn subjects(n: usize) -> Vec<MaybeSubject<i32>> { (0..n).map(|_| MaybeSubject::new()).collect() }

fn sources_of(subjects: &[MaybeSubject<i32>]) -> Vec<Maybe<i32>> {
  subjects.iter().map(MaybeSubject::to_maybe).collect()
}

#[rxmaybe_macro::test]
fn exactly_one_terminal_under_concurrent_completions() {
  for _ in 0..20 {
    let sources: Vec<_> = (0..16).map(|i| threaded(i, Duration::ZERO)).collect();
    let test = TestFlowObserver::new();
    Maybe::merge(sources, usize::MAX, false).subscribe_with(test.clone());

    assert!(test.await_terminal(WAIT));
    thread::sleep(Duration::from_millis(5));
    assert_eq!(test.terminal_calls(), 1);
    let mut values = test.values();
    values.sort_unstable();
    assert_eq!(values, (0..16).collect::<Vec<_>>());
  }
}

#[rxmaybe_macro::test]
fn concurrent_errors_terminate_once() {
  for _ in 0..20 {
    let sources: Vec<_> = (0..8).map(|_| threaded_error("boom", Duration::ZERO)).collect();
    let test = TestFlowObserver::<i32>::new();
    Maybe::merge(sources, usize::MAX, false).subscribe_with(test.clone());

    assert!(test.await_terminal(WAIT));
    thread::sleep(Duration::from_millis(5));
    assert_eq!(test.terminal_calls(), 1);
    test.assert_error_message("boom");
  }
}

#[rxmaybe_macro::test]
fn amb_releases_every_source() {
  let subjects = subjects(4);
  let test = TestMaybeObserver::new();
  Maybe::amb(sources_of(&subjects)).subscribe_with(test.clone());
  assert!(subjects.iter().all(MaybeSubject::has_observers));

  subjects[2].on_success(7);
  test.assert_value(7);
  assert!(subjects.iter().all(|s| !s.has_observers()));
}

#[rxmaybe_macro::test]
fn amb_threaded_race_has_one_winner() {
  for _ in 0..20 {
    let sources: Vec<_> = (0..6).map(|i| threaded(i, Duration::ZERO)).collect();
    let test = TestMaybeObserver::new();
    Maybe::amb(sources).subscribe_with(test.clone());
    assert!(test.await_terminal(WAIT));
    thread::sleep(Duration::from_millis(5));
    assert_eq!(test.terminal_calls(), 1);
    assert!(test.value().is_some());
  }
}

#[rxmaybe_macro::test]
fn disposal_reaches_every_active_inner_source() {
  let subjects = subjects(3);
  let merged = TestFlowObserver::new();
  Maybe::merge(sources_of(&subjects), usize::MAX, true).subscribe_with(merged.clone());
  assert!(subjects.iter().all(MaybeSubject::has_observers));

  merged.dispose();
  assert!(subjects.iter().all(|s| !s.has_observers()));

  let subjects = self::subjects(3);
  let zipped = TestMaybeObserver::new();
  Maybe::zip(sources_of(&subjects), |v: Vec<i32>| Ok(v.len()), false)
    .subscribe_with(zipped.clone());
  zipped.dispose();
  assert!(subjects.iter().all(|s| !s.has_observers()));
}

#[rxmaybe_macro::test]
fn concat_eager_keeps_subscription_order() {
  let subjects = subjects(2);
  let test = TestFlowObserver::new();
  Maybe::concat_eager(sources_of(&subjects), usize::MAX, false).subscribe_with(test.clone());
  assert!(subjects.iter().all(MaybeSubject::has_observers));

  subjects[1].on_success(2);
  test.assert_values(&[]);
  subjects[0].on_success(1);
  test.assert_values(&[1, 2]);
  test.assert_completed();
}

#[rxmaybe_macro::test]
fn concat_eager_order_with_threads() {
  let sources = vec![
    threaded(1, Duration::from_millis(30)),
    threaded(2, Duration::from_millis(1)),
    threaded(3, Duration::from_millis(15)),
  ];
  let test = TestFlowObserver::new();
  Maybe::concat_eager(sources, usize::MAX, false).subscribe_with(test.clone());
  assert!(test.await_terminal(WAIT));
  test.assert_values(&[1, 2, 3]);
}

#[rxmaybe_macro::test]
fn bounded_concurrency_waits_for_a_free_slot() {
  let subjects = subjects(2);
  let test = TestFlowObserver::new();
  Maybe::merge(sources_of(&subjects), 1, false).subscribe_with(test.clone());
  assert!(subjects[0].has_observers());
  assert!(!subjects[1].has_observers());

  subjects[0].on_success(1);
  assert!(subjects[1].has_observers());
  subjects[1].on_success(2);
  test.assert_values(&[1, 2]);
  test.assert_completed();
}

#[rxmaybe_macro::test]
fn bounded_concurrency_is_never_exceeded() {
  let active = Arc::new(AtomicUsize::new(0));
  let peak = Arc::new(AtomicUsize::new(0));
  let sources: Vec<_> = (0..12)
    .map(|i| {
      let (active, peak) = (active.clone(), peak.clone());
      Maybe::create(move |emitter: MaybeEmitter<i32>| {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        let active = active.clone();
        thread::spawn(move || {
          thread::sleep(Duration::from_millis(2));
          active.fetch_sub(1, Ordering::SeqCst);
          emitter.success(i);
        });
      })
    })
    .collect();

  let test = TestFlowObserver::new();
  Maybe::merge(sources, 3, false).subscribe_with(test.clone());
  assert!(test.await_terminal(WAIT));
  assert_eq!(test.value_count(), 12);
  assert!(peak.load(Ordering::SeqCst) <= 3);
}

#[rxmaybe_macro::test]
fn delay_errors_reports_a_composite_after_everything_ran() {
  let subjects = subjects(3);
  let test = TestFlowObserver::new();
  Maybe::merge(sources_of(&subjects), usize::MAX, true).subscribe_with(test.clone());

  subjects[0].on_error(MaybeError::msg("first"));
  subjects[2].on_error(MaybeError::msg("second"));
  test.assert_not_terminated();

  subjects[1].on_success(5);
  test.assert_values(&[5]);
  test.assert_error_with(|err| {
    assert!(err.is_composite());
    let causes: Vec<_> = err.causes().iter().map(ToString::to_string).collect();
    assert_eq!(causes, vec!["first", "second"]);
  });
}

#[rxmaybe_macro::test]
fn zip_examples() {
  let sum = |v: Vec<i32>| -> Result<i32, MaybeError> { Ok(v.iter().sum()) };
  assert_eq!(
    Maybe::zip(vec![Maybe::just(1), Maybe::just(10)], sum, false)
      .block_for_result()
      .unwrap(),
    Some(11)
  );

  let err = Maybe::zip(Vec::<Maybe<i32>>::new(), sum, false)
    .block_for_result()
    .unwrap_err();
  assert!(err.is_out_of_range());

  assert_eq!(
    Maybe::zip(vec![Maybe::just(4)], |v: Vec<i32>| Ok(v[0] * 2), false)
      .block_for_result()
      .unwrap(),
    Some(8)
  );
}

#[rxmaybe_macro::test]
fn retry_limit_is_exhausted() {
  let calls = Arc::new(AtomicUsize::new(0));
  let c = calls.clone();
  let source = Maybe::from_fn(move || {
    let n = c.fetch_add(1, Ordering::SeqCst);
    if n < 4 {
      Err(MaybeError::msg(format!("failure {n}")))
    } else {
      Ok(Some(n))
    }
  });

  let err = source.retry(3).block_for_result().unwrap_err();
  assert_eq!(err.to_string(), "failure 3");
  assert_eq!(calls.load(Ordering::SeqCst), 4);

  calls.store(0, Ordering::SeqCst);
  assert_eq!(source.retry(4).block_for_result().unwrap(), Some(4));
}

#[rxmaybe_macro::test]
fn disposing_twice_is_a_no_op() {
  let subjects = subjects(2);
  let handle = Maybe::merge(sources_of(&subjects), usize::MAX, false).subscribe_callbacks(
    |_| {},
    |_| {},
    || {},
  );
  handle.unsubscribe();
  handle.unsubscribe();
  handle.clone().unsubscribe();
  assert!(handle.is_closed());
  assert!(subjects.iter().all(|s| !s.has_observers()));
}

#[rxmaybe_macro::test]
fn flat_map_switch_map_and_concat_map_together() {
  let outer = Flow::from_iter(vec![1, 2, 3]);
  let test = TestFlowObserver::new();
  outer
    .concat_map(|v| Maybe::just(v * 10), false)
    .flat_map(|v| Maybe::just(v + 1), 2, false)
    .switch_map(|v| Maybe::just(v * 2).filter(|v| *v != 42), false)
    .subscribe_with(test.clone());
  test.assert_values(&[22, 62]);
  test.assert_completed();
}

#[rxmaybe_macro::test]
fn timeout_then_retry_with_virtual_time() {
  let scheduler = TestScheduler::new();
  let attempts = Arc::new(AtomicUsize::new(0));
  let a = attempts.clone();
  let s = scheduler.clone();
  let source = Maybe::defer(move || {
    let attempt = a.fetch_add(1, Ordering::SeqCst);
    // Only the third attempt answers in time.
    let latency = if attempt < 2 { Duration::from_secs(10) } else { Duration::from_secs(1) };
    Ok(Maybe::just(attempt).delay(latency, s.clone()))
  });

  let test = TestMaybeObserver::new();
  source
    .timeout(Duration::from_secs(5), scheduler.clone())
    .retry(RetryWhile(|err: &MaybeError, _: usize| Ok(err.is_timeout())))
    .subscribe_with(test.clone());

  scheduler.advance_by(Duration::from_secs(10));
  test.assert_not_terminated();
  scheduler.advance_by(Duration::from_secs(1));
  test.assert_value(2);
  assert_eq!(attempts.load(Ordering::SeqCst), 3);
  assert_eq!(scheduler.pending_count(), 0);
}

#[rxmaybe_macro::test]
fn using_releases_the_resource_across_threads() {
  let released = Arc::new(AtomicUsize::new(0));
  let r = released.clone();
  let source = Maybe::using(
    || Ok(21),
    |resource: &i32| Ok(threaded(*resource * 2, Duration::from_millis(1))),
    move |_resource: i32| {
      r.fetch_add(1, Ordering::SeqCst);
      Ok(())
    },
    true,
  )
  .subscribe_on(ThreadScheduler);

  assert_eq!(source.block_for_result().unwrap(), Some(42));
  assert_eq!(released.load(Ordering::SeqCst), 1);

  let test = TestMaybeObserver::new();
  Maybe::using(
    || Ok(()),
    |_: &()| Ok(Maybe::<i32>::never()),
    {
      let released = released.clone();
      move |_: ()| {
        released.fetch_add(1, Ordering::SeqCst);
        Ok(())
      }
    },
    false,
  )
  .subscribe_with(test.clone());
  test.dispose();
  test.dispose();
  assert_eq!(released.load(Ordering::SeqCst), 2);
}

#[rxmaybe_macro::test(shared)]
async fn await_a_merged_first_value() {
  let first = Maybe::merge(
    vec![threaded(1, Duration::from_millis(40)), threaded(2, Duration::from_millis(1))],
    usize::MAX,
    false,
  )
  .first_or_empty();
  assert_eq!(first.into_future().await.unwrap(), Some(2));
}
