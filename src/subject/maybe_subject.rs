use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::{ObserverRegistry, SubjectSubscription};
use crate::{
  error::MaybeError,
  maybe::{Maybe, MaybeSource},
  observer::{BoxedMaybeObserver, MaybeObserver},
  subscription::{DynamicSubscriptions, SubscriptionHandle},
};

/// A Maybe source completed by hand.
///
/// Observers subscribed before the outcome is set all receive it; later
/// observers receive the same outcome right away. Only the first of
/// `on_success`, `on_error` and `on_complete` has an effect.
///
/// ```rust
/// use rxmaybe::prelude::*;
///
/// let subject = MaybeSubject::new();
/// let test = TestMaybeObserver::new();
/// subject.to_maybe().subscribe_with(test.clone());
/// assert!(subject.has_observers());
///
/// subject.on_success(1);
/// test.assert_value(1);
/// assert!(!subject.has_observers());
/// ```
pub struct MaybeSubject<Item>(Arc<Core<Item>>);

#[derive(Clone)]
enum Outcome<Item> {
  Success(Item),
  Error(MaybeError),
  Complete,
}

struct State<Item> {
  observers: DynamicSubscriptions<BoxedMaybeObserver<Item>>,
  outcome: Option<Outcome<Item>>,
}

struct Core<Item> {
  state: Mutex<State<Item>>,
}

impl<Item> Clone for MaybeSubject<Item> {
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<Item: Clone + Send + 'static> Default for MaybeSubject<Item> {
  fn default() -> Self { Self::new() }
}

impl<Item: Clone + Send + 'static> MaybeSubject<Item> {
  pub fn new() -> Self {
    Self(Arc::new(Core {
      state: Mutex::new(State { observers: DynamicSubscriptions::new(), outcome: None }),
    }))
  }

  /// A Maybe subscribing to this subject.
  pub fn to_maybe(&self) -> Maybe<Item> { Maybe::new(self.clone()) }

  pub fn has_observers(&self) -> bool { !self.0.state.lock().observers.is_empty() }

  pub fn on_success(&self, value: Item) { self.terminate(Outcome::Success(value)) }

  pub fn on_error(&self, err: MaybeError) { self.terminate(Outcome::Error(err)) }

  pub fn on_complete(&self) { self.terminate(Outcome::Complete) }

  fn terminate(&self, outcome: Outcome<Item>) {
    let observers: SmallVec<[_; 2]> = {
      let mut state = self.0.state.lock();
      if state.outcome.is_some() {
        return;
      }
      state.outcome = Some(outcome.clone());
      state.observers.take_all()
    };
    for observer in observers {
      deliver(observer, outcome.clone());
    }
  }
}

fn deliver<Item>(observer: BoxedMaybeObserver<Item>, outcome: Outcome<Item>) {
  match outcome {
    Outcome::Success(v) => observer.on_success(v),
    Outcome::Error(err) => observer.on_error(err),
    Outcome::Complete => observer.on_complete(),
  }
}

impl<Item: Send> ObserverRegistry for Core<Item> {
  fn remove(&self, id: usize) {
    // Dropped outside the lock.
    let removed = self.state.lock().observers.remove(id);
    drop(removed);
  }
}

impl<Item: Clone + Send + 'static> MaybeSource<Item> for MaybeSubject<Item> {
  fn subscribe(&self, mut observer: BoxedMaybeObserver<Item>) {
    let handle = Arc::new(SubjectSubscription::new(Arc::downgrade(&self.0)));
    observer.on_subscribe(SubscriptionHandle::from(handle.clone()));

    let mut state = self.0.state.lock();
    if let Some(outcome) = state.outcome.clone() {
      drop(state);
      deliver(observer, outcome);
      return;
    }
    let id = state.observers.add(observer);
    if !handle.ready(id) {
      let removed = state.observers.remove(id);
      drop(state);
      drop(removed);
    }
  }
}
