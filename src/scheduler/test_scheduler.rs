//! Virtual-time scheduler for deterministic tests of the timed operators.
//!
//! Time only moves when the test says so: `advance_by` runs every task due
//! within the advanced window in time order, `flush` runs everything that is
//! queued. Tasks run on the calling thread.
//!
//! ```rust
//! use std::time::Duration;
//! use rxmaybe::prelude::*;
//!
//! let scheduler = TestScheduler::new();
//! let test = TestMaybeObserver::new();
//! Maybe::just(1)
//!   .delay(Duration::from_millis(100), scheduler.clone())
//!   .subscribe_with(test.clone());
//!
//! scheduler.advance_by(Duration::from_millis(99));
//! test.assert_not_terminated();
//! scheduler.advance_by(Duration::from_millis(1));
//! test.assert_value(1);
//! ```

use std::{cmp::Ordering, collections::BinaryHeap, sync::Arc, time::Duration};

use parking_lot::Mutex;

use super::{Scheduler, Task};
use crate::subscription::{Subscription, SubscriptionHandle};

struct State {
  now: Duration,
  queue: BinaryHeap<ScheduledTask>,
  next_id: usize,
}

struct ScheduledTask {
  due: Duration,
  id: usize,
  task: Task,
  cancelled: SubscriptionHandle,
}

impl PartialEq for ScheduledTask {
  fn eq(&self, other: &Self) -> bool { self.due == other.due && self.id == other.id }
}

impl Eq for ScheduledTask {}

impl PartialOrd for ScheduledTask {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for ScheduledTask {
  fn cmp(&self, other: &Self) -> Ordering {
    // Min-heap: earlier times first, then FIFO by id
    other
      .due
      .cmp(&self.due)
      .then_with(|| other.id.cmp(&self.id))
  }
}

/// A scheduler driven by virtual time.
///
/// Clones share the same clock and queue.
#[derive(Clone)]
pub struct TestScheduler(Arc<Mutex<State>>);

impl Default for TestScheduler {
  fn default() -> Self {
    Self(Arc::new(Mutex::new(State { now: Duration::ZERO, queue: BinaryHeap::new(), next_id: 0 })))
  }
}

impl TestScheduler {
  pub fn new() -> Self { Self::default() }

  /// The current virtual time.
  pub fn now(&self) -> Duration { self.0.lock().now }

  /// Number of queued tasks that were not cancelled.
  pub fn pending_count(&self) -> usize {
    self
      .0
      .lock()
      .queue
      .iter()
      .filter(|t| !t.cancelled.is_closed())
      .count()
  }

  /// Move the clock forward by `by`, running every task that falls due.
  ///
  /// Tasks scheduled by a running task are run too when they fall due within
  /// the window.
  pub fn advance_by(&self, by: Duration) {
    let target = self.now() + by;
    self.run_until(Some(target));
    let mut state = self.0.lock();
    if state.now < target {
      state.now = target;
    }
  }

  /// Run every queued task, advancing the clock to each one's due time.
  pub fn flush(&self) { self.run_until(None) }

  fn run_until(&self, limit: Option<Duration>) {
    loop {
      let next = {
        let mut state = self.0.lock();
        let due = match state.queue.peek() {
          Some(peek) => limit.map_or(true, |limit| peek.due <= limit),
          None => false,
        };
        if !due {
          return;
        }
        let next = state.queue.pop();
        if let Some(task) = &next {
          state.now = task.due;
        }
        next
      };
      let Some(scheduled) = next else { return };
      if !scheduled.cancelled.is_closed() {
        scheduled.cancelled.unsubscribe();
        (scheduled.task)();
      }
    }
  }
}

impl Scheduler for TestScheduler {
  fn schedule(&self, delay: Duration, task: Task) -> SubscriptionHandle {
    let cancelled = SubscriptionHandle::flag();
    let mut state = self.0.lock();
    let id = state.next_id;
    state.next_id += 1;
    let due = state.now + delay;
    state.queue.push(ScheduledTask { due, id, task, cancelled: cancelled.clone() });
    cancelled
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Task {
    let log = log.clone();
    Box::new(move || log.lock().push(name))
  }

  #[rxmaybe_macro::test]
  fn runs_in_time_then_fifo_order() {
    let scheduler = TestScheduler::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    scheduler.schedule(Duration::from_millis(20), recorder(&log, "late"));
    scheduler.schedule(Duration::from_millis(10), recorder(&log, "first"));
    scheduler.schedule(Duration::from_millis(10), recorder(&log, "second"));

    scheduler.advance_by(Duration::from_millis(10));
    assert_eq!(*log.lock(), vec!["first", "second"]);
    assert_eq!(scheduler.now(), Duration::from_millis(10));
    assert_eq!(scheduler.pending_count(), 1);

    scheduler.flush();
    assert_eq!(*log.lock(), vec!["first", "second", "late"]);
    assert_eq!(scheduler.now(), Duration::from_millis(20));
  }

  #[rxmaybe_macro::test]
  fn cancelled_task_never_runs() {
    let scheduler = TestScheduler::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let handle = scheduler.schedule(Duration::from_millis(5), recorder(&log, "task"));
    assert_eq!(scheduler.pending_count(), 1);

    handle.unsubscribe();
    assert_eq!(scheduler.pending_count(), 0);
    scheduler.flush();
    assert!(log.lock().is_empty());
  }

  #[rxmaybe_macro::test]
  fn task_scheduled_by_task_runs_within_window() {
    let scheduler = TestScheduler::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let (s, l) = (scheduler.clone(), log.clone());
    scheduler.schedule(
      Duration::from_millis(1),
      Box::new(move || {
        l.lock().push("outer");
        s.schedule(Duration::from_millis(1), recorder(&l, "inner"));
      }),
    );

    scheduler.advance_by(Duration::from_millis(2));
    assert_eq!(*log.lock(), vec!["outer", "inner"]);
    assert_eq!(scheduler.now(), Duration::from_millis(2));
  }

  #[rxmaybe_macro::test]
  fn clock_advances_without_tasks() {
    let scheduler = TestScheduler::new();
    scheduler.advance_by(Duration::from_secs(3));
    assert_eq!(scheduler.now(), Duration::from_secs(3));
  }
}
