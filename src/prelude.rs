//! Prelude module for convenient imports
//!
//! This module re-exports commonly used types and traits for easy access.

// Sources
pub use crate::{
  factory::MaybeEmitter,
  flow::{Flow, FlowEmitter, FlowSource},
  maybe::{IntoSourceSlot, Maybe, MaybeSource, SourceSlot},
};
// Errors
pub use crate::error::{CompositeError, ErrorAggregator, MaybeError};
// Observers
pub use crate::observer::{
  BoxedFlowObserver, BoxedMaybeObserver, FlowObserver, FnFlowObserver, FnMaybeObserver,
  MaybeObserver,
};
// Operators
pub use crate::ops::{
  future::MaybeFuture,
  retry::{Always, RepeatPolicy, RepeatWhile, RetryPolicy, RetryWhile},
};
// Schedulers
#[cfg(feature = "futures-scheduler")]
pub use crate::scheduler::ThreadPoolScheduler;
#[cfg(feature = "tokio-scheduler")]
pub use crate::scheduler::TokioScheduler;
pub use crate::scheduler::{Scheduler, TestScheduler, ThreadScheduler};
// Subjects
pub use crate::subject::*;
// Subscriptions
pub use crate::subscription::*;
// Test observers
pub use crate::testing::{TestFlowObserver, TestMaybeObserver};
