//! # rxmaybe: composable zero-or-one-value sources
//!
//! A [`Maybe`] is a cold, asynchronous source that delivers exactly one of a
//! success value, an error, or an empty completion to each subscriber. The
//! crate's operators combine many of them while inner sources complete
//! concurrently on arbitrary threads.
//!
//! ## Quick Start
//!
//! ```rust
//! use rxmaybe::prelude::*;
//!
//! let sum = Maybe::zip(
//!   vec![Maybe::just(1), Maybe::just(10)],
//!   |values: Vec<i32>| Ok(values.iter().sum::<i32>()),
//!   false,
//! );
//! assert_eq!(sum.block_for_result().unwrap(), Some(11));
//! ```
//!
//! ## Key Concepts
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Maybe`] / [`MaybeSource`] | A source of at most one value |
//! | [`Flow`] / [`FlowSource`] | A push stream of items, output of the sequencing operators |
//! | [`MaybeObserver`] / [`FlowObserver`] | Consumers of the two source shapes |
//! | [`Subscription`] | Idempotent handle cancelling a subscription |
//! | [`Scheduler`] | Where the timed operators run their work |
//!
//! ## Operators
//!
//! | Group | Operators |
//! |-------|-----------|
//! | Race | `amb` |
//! | Sequencing | `concat`, `concat_eager`, `merge`, `merge_all` |
//! | Mapping | `flat_map`, `concat_map`, `concat_map_eager`, `switch_map` |
//! | Combining | `zip` |
//! | Resubscription | `retry`, `repeat`, `retry_when`, `repeat_when` |
//! | Wrappers | `timeout`, `timeout_or`, `using` |
//! | Scheduling | `delay`, `subscribe_on`, `observe_on`, `unsubscribe_on` |
//! | Bridges | `to_flow`, `first_or_empty`, `block_for_result`, `into_future`, `from_future` |
//!
//! Combining operators take `delay_errors`: fail-fast mode disposes every
//! sibling on the first error, delay-errors mode lets every source finish and
//! reports a single [`MaybeError::Composite`].
//!
//! ## Feature Flags
//!
//! - **`futures-scheduler`** (default): `ThreadPoolScheduler` on a `futures`
//!   thread pool
//! - **`tokio-scheduler`**: `TokioScheduler` on a tokio runtime
//!
//! [`Maybe`]: maybe::Maybe
//! [`MaybeSource`]: maybe::MaybeSource
//! [`Flow`]: flow::Flow
//! [`FlowSource`]: flow::FlowSource
//! [`MaybeObserver`]: observer::MaybeObserver
//! [`FlowObserver`]: observer::FlowObserver
//! [`Subscription`]: subscription::Subscription
//! [`Scheduler`]: scheduler::Scheduler
//! [`MaybeError::Composite`]: error::MaybeError::Composite

pub mod error;
pub mod factory;
pub mod flow;
pub mod maybe;
pub mod observer;
pub mod ops;
pub mod prelude;
pub mod scheduler;
pub mod subject;
pub mod subscription;
pub mod testing;

mod coordinator;

pub use prelude::*;

#[cfg(doctest)]
mod readme {
  #![doc = include_str!("../README.md")]
}
