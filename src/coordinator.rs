//! Building blocks shared by the combining operators.
//!
//! Every coordinator serializes its downstream calls with the same drain
//! pattern: state changes are published first, then `WorkInProgress::enter`
//! is called. The caller that moves the counter away from zero owns the drain
//! and keeps looping until no more work was requested while it ran; every
//! other caller returns immediately. Synchronous completions therefore turn
//! into loop iterations instead of recursion, and the downstream observer is
//! never called from two threads at once.

pub(crate) mod merge;

use std::{
  collections::VecDeque,
  sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
  },
};

use parking_lot::Mutex;

use crate::{
  error::MaybeError,
  observer::{BoxedFlowObserver, BoxedMaybeObserver, FlowObserver, MaybeObserver},
};

/// Drain guard counting requested passes.
#[derive(Debug, Default)]
pub(crate) struct WorkInProgress(AtomicUsize);

impl WorkInProgress {
  pub(crate) fn new() -> Self { Self::default() }

  /// Request a drain pass. Returns `true` when the caller became the owner.
  #[inline]
  pub(crate) fn enter(&self) -> bool { self.0.fetch_add(1, Ordering::AcqRel) == 0 }

  /// Acknowledge `missed` passes, returning the passes requested meanwhile.
  #[inline]
  pub(crate) fn leave(&self, missed: usize) -> usize {
    self.0.fetch_sub(missed, Ordering::AcqRel) - missed
  }

  /// Run `pass` until no further pass was requested.
  ///
  /// Does nothing when another caller currently owns the drain; that owner
  /// will run the requested pass before it leaves.
  #[inline]
  pub(crate) fn drain(&self, mut pass: impl FnMut()) {
    if !self.enter() {
      return;
    }
    let mut missed = 1;
    loop {
      pass();
      missed = self.leave(missed);
      if missed == 0 {
        break;
      }
    }
  }
}

/// Slot owning a flow downstream.
///
/// Only the drain owner emits, so the observer is taken out for each call and
/// put back afterwards; no lock is held while user code runs.
pub(crate) struct FlowDownstream<Item>(Mutex<Option<BoxedFlowObserver<Item>>>);

impl<Item> FlowDownstream<Item> {
  pub(crate) fn new() -> Self { Self(Mutex::new(None)) }

  pub(crate) fn set(&self, observer: BoxedFlowObserver<Item>) { *self.0.lock() = Some(observer); }

  /// Emit one item. The observer is only put back while `keep()` holds,
  /// which lets a disposal issued from inside `on_next` release it.
  pub(crate) fn next(&self, value: Item, keep: impl FnOnce() -> bool) {
    let observer = self.0.lock().take();
    if let Some(mut observer) = observer {
      observer.on_next(value);
      if keep() {
        *self.0.lock() = Some(observer);
      }
    }
  }

  pub(crate) fn error(&self, err: MaybeError) {
    let observer = self.0.lock().take();
    if let Some(observer) = observer {
      observer.on_error(err);
    }
  }

  pub(crate) fn complete(&self) {
    let observer = self.0.lock().take();
    if let Some(observer) = observer {
      observer.on_complete();
    }
  }

  /// Terminate with the aggregated error if there is one, else complete.
  pub(crate) fn finish(&self, err: Option<MaybeError>) {
    match err {
      Some(err) => self.error(err),
      None => self.complete(),
    }
  }

  /// Release the observer without signalling it.
  pub(crate) fn clear(&self) { drop(self.0.lock().take()); }
}

/// Slot owning a Maybe downstream; the first `take` wins.
pub(crate) struct MaybeDownstream<Item>(Mutex<Option<BoxedMaybeObserver<Item>>>);

impl<Item> MaybeDownstream<Item> {
  pub(crate) fn new() -> Self { Self(Mutex::new(None)) }

  pub(crate) fn set(&self, observer: BoxedMaybeObserver<Item>) { *self.0.lock() = Some(observer); }

  pub(crate) fn take(&self) -> Option<BoxedMaybeObserver<Item>> { self.0.lock().take() }

  pub(crate) fn success(&self, value: Item) {
    if let Some(observer) = self.take() {
      observer.on_success(value);
    }
  }

  pub(crate) fn error(&self, err: MaybeError) {
    if let Some(observer) = self.take() {
      observer.on_error(err);
    }
  }

  pub(crate) fn complete(&self) {
    if let Some(observer) = self.take() {
      observer.on_complete();
    }
  }

  pub(crate) fn clear(&self) { drop(self.take()); }
}

// ============================================================================
// SerializedFlow
// ============================================================================

enum Signal<Item> {
  Next(Item),
  Error(MaybeError),
  Complete,
}

/// Flow downstream that may be signalled from several threads.
///
/// Signals are queued and delivered by whichever caller owns the drain.
/// Everything after the first terminal signal is discarded.
pub(crate) struct SerializedFlow<Item> {
  wip: WorkInProgress,
  queue: Mutex<VecDeque<Signal<Item>>>,
  downstream: FlowDownstream<Item>,
}

impl<Item> SerializedFlow<Item> {
  pub(crate) fn new(observer: BoxedFlowObserver<Item>) -> Arc<Self> {
    let downstream = FlowDownstream::new();
    downstream.set(observer);
    Arc::new(Self { wip: WorkInProgress::new(), queue: Mutex::new(VecDeque::new()), downstream })
  }

  pub(crate) fn next(&self, value: Item) { self.push(Signal::Next(value)) }

  pub(crate) fn error(&self, err: MaybeError) { self.push(Signal::Error(err)) }

  pub(crate) fn complete(&self) { self.push(Signal::Complete) }

  /// Drop the downstream without signalling it.
  pub(crate) fn cancel(&self) {
    self.queue.lock().clear();
    self.downstream.clear();
  }

  fn push(&self, signal: Signal<Item>) {
    self.queue.lock().push_back(signal);
    self.wip.drain(|| loop {
      let signal = self.queue.lock().pop_front();
      match signal {
        Some(Signal::Next(v)) => self.downstream.next(v, || true),
        Some(Signal::Error(err)) => {
          self.downstream.error(err);
          self.queue.lock().clear();
        }
        Some(Signal::Complete) => {
          self.downstream.complete();
          self.queue.lock().clear();
        }
        None => break,
      }
    });
  }
}

#[cfg(test)]
mod tests {
  use std::thread;

  use super::*;
  use crate::testing::TestFlowObserver;

  #[rxmaybe_macro::test]
  fn only_first_caller_owns_the_drain() {
    let wip = WorkInProgress::new();
    assert!(wip.enter());
    assert!(!wip.enter());
    assert!(!wip.enter());
    assert_eq!(wip.leave(1), 2);
    assert_eq!(wip.leave(2), 0);
    assert!(wip.enter());
  }

  #[rxmaybe_macro::test]
  fn reentrant_request_becomes_iteration() {
    let wip = Arc::new(WorkInProgress::new());
    let passes = Arc::new(AtomicUsize::new(0));
    let (w, p) = (wip.clone(), passes.clone());
    wip.drain(|| {
      let n = p.fetch_add(1, Ordering::SeqCst);
      if n < 3 {
        // Requested from inside the pass: runs after this pass returns.
        w.drain(|| unreachable!());
      }
    });
    assert_eq!(passes.load(Ordering::SeqCst), 4);
  }

  #[rxmaybe_macro::test]
  fn serialized_flow_delivers_everything_once() {
    let test = TestFlowObserver::new();
    let flow = SerializedFlow::new(Box::new(test.clone()));
    let threads: Vec<_> = (0..4)
      .map(|t| {
        let flow = flow.clone();
        thread::spawn(move || {
          for i in 0..100 {
            flow.next(t * 100 + i);
          }
        })
      })
      .collect();
    for t in threads {
      t.join().unwrap();
    }
    flow.complete();
    flow.next(-1);

    let mut values = test.values();
    values.sort_unstable();
    assert_eq!(values, (0..400).collect::<Vec<_>>());
    test.assert_completed();
  }
}
