//! The Maybe source abstraction.
//!
//! A [`MaybeSource`] is a cold producer: each `subscribe` starts an
//! independent run that calls `on_subscribe` on the observer and eventually
//! delivers one terminal signal: a success value, an error, or an empty
//! completion.
//!
//! [`Maybe`] is the cheap-clone handle every operator consumes and returns.
//! Cloning it shares the same source, which is what lets retry and repeat
//! resubscribe to it.
//!
//! ```rust
//! use rxmaybe::prelude::*;
//!
//! let value = Maybe::just(20)
//!   .map(|v| v + 1)
//!   .map(|v| v * 2)
//!   .block_for_result();
//! assert_eq!(value.unwrap(), Some(42));
//! ```

use std::sync::Arc;

use crate::{
  error::MaybeError,
  observer::{BoxedMaybeObserver, FnMaybeObserver, MaybeObserver},
  subscription::{SetOnceSubscription, SubscriptionHandle},
};

/// A producer of at most one value per subscription.
pub trait MaybeSource<Item>: Send + Sync {
  /// Start a new run delivering its outcome to `observer`.
  fn subscribe(&self, observer: BoxedMaybeObserver<Item>);
}

/// Shared handle to a [`MaybeSource`].
pub struct Maybe<Item>(Arc<dyn MaybeSource<Item>>);

impl<Item> Clone for Maybe<Item> {
  #[inline]
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<Item> MaybeSource<Item> for Maybe<Item> {
  #[inline]
  fn subscribe(&self, observer: BoxedMaybeObserver<Item>) { self.0.subscribe(observer) }
}

impl<Item: Send + 'static> Maybe<Item> {
  /// Wrap a source implementation.
  pub fn new(source: impl MaybeSource<Item> + 'static) -> Self { Self(Arc::new(source)) }

  /// Subscribe `observer` to a new run of this source.
  pub fn subscribe_with(&self, observer: impl MaybeObserver<Item> + 'static) {
    self.0.subscribe(Box::new(observer))
  }

  /// Subscribe with three callbacks and get back the cancellation handle.
  ///
  /// The handle is valid even if the source acknowledges the subscription
  /// later (e.g. through `subscribe_on`); unsubscribing before that releases
  /// the subscription as soon as it arrives.
  pub fn subscribe_callbacks<S, E, C>(
    &self, success: S, error: E, complete: C,
  ) -> SubscriptionHandle
  where
    S: FnOnce(Item) + Send + 'static,
    E: FnOnce(MaybeError) + Send + 'static,
    C: FnOnce() + Send + 'static,
  {
    let slot = Arc::new(SetOnceSubscription::new());
    self.subscribe_with(CaptureHandle {
      slot: slot.clone(),
      inner: FnMaybeObserver { success, error, complete },
    });
    slot.into()
  }
}

/// Records the upstream handle in a set-once slot before forwarding.
pub(crate) struct CaptureHandle<O> {
  pub(crate) slot: Arc<SetOnceSubscription>,
  pub(crate) inner: O,
}

impl<Item, O> MaybeObserver<Item> for CaptureHandle<O>
where
  O: MaybeObserver<Item>,
{
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) {
    self.slot.set(subscription.clone());
    self.inner.on_subscribe(subscription);
  }

  fn on_success(self, value: Item) { self.inner.on_success(value) }

  fn on_error(self, err: MaybeError) { self.inner.on_error(err) }

  fn on_complete(self) { self.inner.on_complete() }
}

// ============================================================================
// Source slots
// ============================================================================

/// One entry of a source sequence handed to a combining operator.
///
/// Arrays and lazy sequences may contain holes (`None`) or fail while being
/// enumerated (`Err`); the coordinators report those as errors at the
/// position they occurred.
pub enum SourceSlot<Item> {
  Ready(Maybe<Item>),
  Missing,
  Failed(MaybeError),
}

impl<Item> Clone for SourceSlot<Item> {
  fn clone(&self) -> Self {
    match self {
      SourceSlot::Ready(m) => SourceSlot::Ready(m.clone()),
      SourceSlot::Missing => SourceSlot::Missing,
      SourceSlot::Failed(e) => SourceSlot::Failed(e.clone()),
    }
  }
}

impl<Item> SourceSlot<Item> {
  /// The source, or the error this slot stands for at `index`.
  pub fn into_source(self, index: usize) -> Result<Maybe<Item>, MaybeError> {
    match self {
      SourceSlot::Ready(source) => Ok(source),
      SourceSlot::Missing => Err(MaybeError::MissingSource { index }),
      SourceSlot::Failed(err) => Err(err),
    }
  }
}

/// Conversion into a [`SourceSlot`].
///
/// Implemented for `Maybe<Item>` (always present), `Option<Maybe<Item>>`
/// (`None` is a missing source) and `Result<Maybe<Item>, MaybeError>` (`Err`
/// is a failure of the sequence itself).
pub trait IntoSourceSlot<Item> {
  fn into_slot(self) -> SourceSlot<Item>;
}

impl<Item> IntoSourceSlot<Item> for Maybe<Item> {
  #[inline]
  fn into_slot(self) -> SourceSlot<Item> { SourceSlot::Ready(self) }
}

impl<Item> IntoSourceSlot<Item> for Option<Maybe<Item>> {
  #[inline]
  fn into_slot(self) -> SourceSlot<Item> { self.map_or(SourceSlot::Missing, SourceSlot::Ready) }
}

impl<Item> IntoSourceSlot<Item> for Result<Maybe<Item>, MaybeError> {
  #[inline]
  fn into_slot(self) -> SourceSlot<Item> {
    match self {
      Ok(source) => SourceSlot::Ready(source),
      Err(err) => SourceSlot::Failed(err),
    }
  }
}

impl<Item> IntoSourceSlot<Item> for SourceSlot<Item> {
  #[inline]
  fn into_slot(self) -> SourceSlot<Item> { self }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;
  use crate::subscription::Subscription;

  #[rxmaybe_macro::test]
  fn subscribe_callbacks_returns_handle() {
    let seen = Arc::new(Mutex::new(None));
    let s = seen.clone();
    let handle = Maybe::just(5).subscribe_callbacks(
      move |v| *s.lock().unwrap() = Some(v),
      |_| {},
      || {},
    );
    assert_eq!(*seen.lock().unwrap(), Some(5));
    handle.unsubscribe();
    assert!(handle.is_closed());
  }

  #[rxmaybe_macro::test]
  fn slots_report_their_index() {
    let missing: Option<Maybe<i32>> = None;
    let err = missing.into_slot().into_source(4).err().unwrap();
    assert_eq!(err.to_string(), "the source at index 4 is missing");

    let failed: Result<Maybe<i32>, MaybeError> = Err(MaybeError::msg("boom"));
    let err = failed.into_slot().into_source(0).err().unwrap();
    assert_eq!(err.to_string(), "boom");

    assert!(Maybe::just(1).into_slot().into_source(0).is_ok());
  }
}
