//! Schedulers
//!
//! The timed operators (`timeout`, `delay`, `subscribe_on`, `observe_on`,
//! `unsubscribe_on`) never create threads themselves; they hand work to a
//! [`Scheduler`] and keep the returned handle so the work can be cancelled.
//!
//! | Scheduler | Runs tasks on |
//! |-----------|---------------|
//! | [`TestScheduler`] | the thread calling `advance_by`/`flush`, in virtual time |
//! | [`ThreadScheduler`] | a new thread per task |
//! | `ThreadPoolScheduler` | a `futures` thread pool (`futures-scheduler` feature) |
//! | `TokioScheduler` | a tokio runtime (`tokio-scheduler` feature) |

use std::{sync::Arc, time::Duration};

use crate::subscription::SubscriptionHandle;

mod test_scheduler;
mod thread_scheduler;

#[cfg(feature = "futures-scheduler")]
mod thread_pool_scheduler;
#[cfg(feature = "tokio-scheduler")]
mod tokio_scheduler;

pub use test_scheduler::TestScheduler;
pub use thread_scheduler::ThreadScheduler;

#[cfg(feature = "futures-scheduler")]
pub use thread_pool_scheduler::ThreadPoolScheduler;
#[cfg(feature = "tokio-scheduler")]
pub use tokio_scheduler::TokioScheduler;

/// A boxed unit of scheduled work.
pub type Task = Box<dyn FnOnce() + Send>;

/// Runs tasks after a delay.
pub trait Scheduler: Send + Sync {
  /// Run `task` once `delay` has elapsed.
  ///
  /// Unsubscribing the returned handle before the task started guarantees it
  /// never runs. A zero delay still goes through the scheduler; it does not
  /// run `task` inline.
  fn schedule(&self, delay: Duration, task: Task) -> SubscriptionHandle;
}

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
  #[inline]
  fn schedule(&self, delay: Duration, task: Task) -> SubscriptionHandle {
    (**self).schedule(delay, task)
  }
}

/// Shared scheduler reference stored by the timed operators.
pub(crate) type SharedScheduler = Arc<dyn Scheduler>;
