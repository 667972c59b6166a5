//! Amb operator
//!
//! Subscribes to every source and relays the first terminal signal, whatever
//! it is: a success, an error or an empty completion. All other sources are
//! disposed before the winning signal reaches the downstream, so a losing
//! source can never race with what the downstream does next.
//!
//! ```rust
//! use rxmaybe::prelude::*;
//!
//! let value = Maybe::amb(vec![Maybe::never(), Maybe::just(2)]).block_for_result();
//! assert_eq!(value.unwrap(), Some(2));
//! ```

use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

use crate::{
  coordinator::MaybeDownstream,
  error::MaybeError,
  maybe::{IntoSourceSlot, Maybe, MaybeSource, SourceSlot},
  observer::{BoxedMaybeObserver, MaybeObserver},
  subscription::{SetOnceSubscription, Subscription, SubscriptionHandle},
};

const UNSET: usize = usize::MAX;
const DISPOSED: usize = usize::MAX - 1;

impl<Item: Send + 'static> Maybe<Item> {
  /// Race `sources` and relay the first terminal signal.
  ///
  /// No sources completes empty; a single source is subscribed directly. A
  /// missing source fails its slot of the race with
  /// [`MaybeError::MissingSource`].
  pub fn amb<I>(sources: I) -> Maybe<Item>
  where
    I: IntoIterator + Clone + Send + Sync + 'static,
    I::Item: IntoSourceSlot<Item>,
  {
    Maybe::new(Amb(sources))
  }
}

struct Amb<I>(I);

impl<Item, I> MaybeSource<Item> for Amb<I>
where
  Item: Send + 'static,
  I: IntoIterator + Clone + Send + Sync,
  I::Item: IntoSourceSlot<Item>,
{
  fn subscribe(&self, mut observer: BoxedMaybeObserver<Item>) {
    let mut slots = Vec::new();
    for slot in self.0.clone() {
      match slot.into_slot() {
        SourceSlot::Failed(err) => {
          observer.on_subscribe(SubscriptionHandle::flag());
          observer.on_error(err);
          return;
        }
        slot => slots.push(slot),
      }
    }

    match slots.len() {
      0 => {
        observer.on_subscribe(SubscriptionHandle::flag());
        observer.on_complete();
      }
      1 => match slots.pop().map(|slot| slot.into_source(0)) {
        Some(Ok(source)) => source.subscribe(observer),
        Some(Err(err)) => {
          observer.on_subscribe(SubscriptionHandle::flag());
          observer.on_error(err);
        }
        None => {}
      },
      n => AmbState::start(slots, n, observer),
    }
  }
}

struct AmbState<Item> {
  winner: AtomicUsize,
  inners: Vec<SetOnceSubscription>,
  downstream: MaybeDownstream<Item>,
}

impl<Item: Send + 'static> AmbState<Item> {
  fn start(slots: Vec<SourceSlot<Item>>, n: usize, mut observer: BoxedMaybeObserver<Item>) {
    let state = Arc::new(AmbState {
      winner: AtomicUsize::new(UNSET),
      inners: (0..n).map(|_| SetOnceSubscription::new()).collect(),
      downstream: MaybeDownstream::new(),
    });
    observer.on_subscribe(state.clone().into());
    if state.is_closed() {
      return;
    }
    state.downstream.set(observer);

    for (index, slot) in slots.into_iter().enumerate() {
      if state.winner.load(Ordering::Acquire) != UNSET {
        break;
      }
      let inner = AmbObserver { state: state.clone(), index };
      match slot.into_source(index) {
        Ok(source) => source.subscribe(Box::new(inner)),
        Err(err) => inner.on_error(err),
      }
    }
  }

  /// Claim the race for `index`. The losers are disposed before the
  /// downstream is handed out.
  fn try_win(&self, index: usize) -> Option<BoxedMaybeObserver<Item>> {
    if self
      .winner
      .compare_exchange(UNSET, index, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      tracing::trace!(index, "amb: dropping signal from a losing source");
      return None;
    }
    tracing::trace!(index, "amb: source won the race");
    for inner in &self.inners {
      inner.unsubscribe();
    }
    self.downstream.take()
  }
}

impl<Item: Send> Subscription for AmbState<Item> {
  fn unsubscribe(&self) {
    if self
      .winner
      .compare_exchange(UNSET, DISPOSED, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
    {
      for inner in &self.inners {
        inner.unsubscribe();
      }
      self.downstream.clear();
    }
  }

  fn is_closed(&self) -> bool { self.winner.load(Ordering::Acquire) != UNSET }
}

struct AmbObserver<Item> {
  state: Arc<AmbState<Item>>,
  index: usize,
}

impl<Item: Send + 'static> MaybeObserver<Item> for AmbObserver<Item> {
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) {
    self.state.inners[self.index].set(subscription);
  }

  fn on_success(self, value: Item) {
    if let Some(observer) = self.state.try_win(self.index) {
      observer.on_success(value);
    }
  }

  fn on_error(self, err: MaybeError) {
    match self.state.try_win(self.index) {
      Some(observer) => observer.on_error(err),
      None => tracing::debug!(error = %err, "amb: undeliverable error from a losing source"),
    }
  }

  fn on_complete(self) {
    if let Some(observer) = self.state.try_win(self.index) {
      observer.on_complete();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{subject::MaybeSubject, testing::TestMaybeObserver};

  #[rxmaybe_macro::test]
  fn no_sources_completes_empty() {
    let test = TestMaybeObserver::<i32>::new();
    Maybe::amb(Vec::<Maybe<i32>>::new()).subscribe_with(test.clone());
    test.assert_empty();
  }

  #[rxmaybe_macro::test]
  fn single_source_passes_through() {
    let test = TestMaybeObserver::new();
    Maybe::amb(vec![Maybe::just(3)]).subscribe_with(test.clone());
    test.assert_value(3);
  }

  #[rxmaybe_macro::test]
  fn first_terminal_wins_and_losers_are_released() {
    let subjects: Vec<MaybeSubject<i32>> = (0..3).map(|_| MaybeSubject::new()).collect();
    let test = TestMaybeObserver::new();
    Maybe::amb(subjects.iter().map(|s| s.to_maybe()).collect::<Vec<_>>())
      .subscribe_with(test.clone());
    assert!(subjects.iter().all(MaybeSubject::has_observers));

    subjects[1].on_success(10);
    test.assert_value(10);
    assert!(subjects.iter().all(|s| !s.has_observers()));

    subjects[0].on_success(1);
    subjects[2].on_error(MaybeError::msg("late"));
    test.assert_value(10);
  }

  #[rxmaybe_macro::test]
  fn empty_completion_can_win() {
    let test = TestMaybeObserver::new();
    Maybe::amb(vec![Maybe::never(), Maybe::empty(), Maybe::just(1)]).subscribe_with(test.clone());
    test.assert_empty();
  }

  #[rxmaybe_macro::test]
  fn missing_source_fails_its_slot() {
    let test = TestMaybeObserver::<i32>::new();
    Maybe::amb(vec![Some(Maybe::never()), None]).subscribe_with(test.clone());
    test.assert_error_with(|err| assert!(matches!(err, MaybeError::MissingSource { index: 1 })));
  }

  #[rxmaybe_macro::test]
  fn dispose_releases_every_source() {
    let subjects: Vec<MaybeSubject<i32>> = (0..2).map(|_| MaybeSubject::new()).collect();
    let test = TestMaybeObserver::new();
    Maybe::amb(subjects.iter().map(|s| s.to_maybe()).collect::<Vec<_>>())
      .subscribe_with(test.clone());

    test.dispose();
    test.dispose();
    assert!(subjects.iter().all(|s| !s.has_observers()));
    subjects[0].on_success(1);
    test.assert_not_terminated();
  }
}
