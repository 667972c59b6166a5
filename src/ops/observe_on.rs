//! ObserveOn operator
//!
//! Moves the terminal signal onto a scheduler. The upstream keeps running
//! wherever it runs; only the delivery to the downstream changes thread.
//!
//! ```rust
//! use std::{sync::mpsc::channel, thread};
//! use rxmaybe::prelude::*;
//!
//! let (tx, rx) = channel();
//! Maybe::just(1)
//!   .observe_on(ThreadScheduler)
//!   .subscribe_callbacks(move |_| tx.send(thread::current().id()).unwrap(), |_| {}, || {});
//! assert_ne!(rx.recv().unwrap(), thread::current().id());
//! ```

use std::{sync::Arc, time::Duration};

use super::delay::DelayOp;
use crate::{maybe::Maybe, scheduler::Scheduler};

impl<Item: Send + 'static> Maybe<Item> {
  /// Deliver every terminal signal, errors included, through `scheduler`.
  pub fn observe_on(&self, scheduler: impl Scheduler + 'static) -> Maybe<Item> {
    Maybe::new(DelayOp {
      source: self.clone(),
      delay: Duration::ZERO,
      scheduler: Arc::new(scheduler),
      delay_error: true,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    error::MaybeError,
    scheduler::{TestScheduler, ThreadScheduler},
    testing::TestMaybeObserver,
  };

  #[rxmaybe_macro::test]
  fn signals_wait_for_the_scheduler() {
    let scheduler = TestScheduler::new();
    let test = TestMaybeObserver::<i32>::new();
    Maybe::error(MaybeError::msg("moved"))
      .observe_on(scheduler.clone())
      .subscribe_with(test.clone());
    test.assert_not_terminated();

    scheduler.flush();
    test.assert_error_message("moved");
    assert_eq!(scheduler.now(), Duration::ZERO);
  }

  #[rxmaybe_macro::test]
  fn switches_thread() {
    let test = TestMaybeObserver::new();
    Maybe::just(7)
      .observe_on(ThreadScheduler)
      .subscribe_with(test.clone());
    assert!(test.await_terminal(Duration::from_secs(5)));
    test.assert_value(7);
  }
}
