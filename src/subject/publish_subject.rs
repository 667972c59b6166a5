use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::{ObserverRegistry, SubjectSubscription};
use crate::{
  error::MaybeError,
  flow::{Flow, FlowSource},
  observer::{BoxedFlowObserver, FlowObserver},
  subscription::{DynamicSubscriptions, SubscriptionHandle},
};

/// A flow multicasting the items pushed into it.
///
/// Observers only see items pushed after they subscribed. After a terminal
/// signal the subject keeps no observers, and late subscribers receive that
/// terminal signal immediately. Items are expected to be pushed from one
/// thread at a time.
///
/// ```rust
/// use rxmaybe::prelude::*;
///
/// let subject = PublishSubject::new();
/// let test = TestFlowObserver::new();
/// subject.to_flow().subscribe_with(test.clone());
///
/// subject.on_next(1);
/// subject.on_next(2);
/// subject.on_complete();
/// test.assert_values(&[1, 2]);
/// test.assert_completed();
/// ```
pub struct PublishSubject<Item>(Arc<Core<Item>>);

/// The observer is taken out while it runs, so an observer unsubscribing
/// itself from inside `on_next` never contends for the subject lock.
type Entry<Item> = Arc<Mutex<Option<BoxedFlowObserver<Item>>>>;

struct State<Item> {
  observers: DynamicSubscriptions<Entry<Item>>,
  /// `Some(None)` after completion, `Some(Some(err))` after an error.
  terminal: Option<Option<MaybeError>>,
}

struct Core<Item> {
  state: Mutex<State<Item>>,
}

impl<Item> Clone for PublishSubject<Item> {
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<Item: Clone + Send + 'static> Default for PublishSubject<Item> {
  fn default() -> Self { Self::new() }
}

impl<Item: Clone + Send + 'static> PublishSubject<Item> {
  pub fn new() -> Self {
    Self(Arc::new(Core {
      state: Mutex::new(State { observers: DynamicSubscriptions::new(), terminal: None }),
    }))
  }

  /// A flow subscribing to this subject.
  pub fn to_flow(&self) -> Flow<Item> { Flow::new(self.clone()) }

  pub fn has_observers(&self) -> bool { !self.0.state.lock().observers.is_empty() }

  pub fn on_next(&self, value: Item) {
    let entries: SmallVec<[Entry<Item>; 2]> = {
      let state = self.0.state.lock();
      if state.terminal.is_some() {
        return;
      }
      state.observers.iter().cloned().collect()
    };
    for entry in entries {
      let observer = entry.lock().take();
      if let Some(mut observer) = observer {
        observer.on_next(value.clone());
        *entry.lock() = Some(observer);
      }
    }
  }

  pub fn on_error(&self, err: MaybeError) { self.terminate(Some(err)) }

  pub fn on_complete(&self) { self.terminate(None) }

  fn terminate(&self, terminal: Option<MaybeError>) {
    let entries = {
      let mut state = self.0.state.lock();
      if state.terminal.is_some() {
        return;
      }
      state.terminal = Some(terminal.clone());
      state.observers.take_all()
    };
    for entry in entries {
      let observer = entry.lock().take();
      if let Some(observer) = observer {
        finish(observer, terminal.clone());
      }
    }
  }
}

fn finish<Item>(observer: BoxedFlowObserver<Item>, terminal: Option<MaybeError>) {
  match terminal {
    Some(err) => observer.on_error(err),
    None => observer.on_complete(),
  }
}

impl<Item: Send> ObserverRegistry for Core<Item> {
  fn remove(&self, id: usize) {
    let removed = self.state.lock().observers.remove(id);
    if let Some(entry) = removed {
      drop(entry.lock().take());
    }
  }
}

impl<Item: Clone + Send + 'static> FlowSource<Item> for PublishSubject<Item> {
  fn subscribe(&self, mut observer: BoxedFlowObserver<Item>) {
    let handle = Arc::new(SubjectSubscription::new(Arc::downgrade(&self.0)));
    observer.on_subscribe(SubscriptionHandle::from(handle.clone()));

    let mut state = self.0.state.lock();
    if let Some(terminal) = state.terminal.clone() {
      drop(state);
      finish(observer, terminal);
      return;
    }
    let id = state.observers.add(Arc::new(Mutex::new(Some(observer))));
    if !handle.ready(id) {
      let removed = state.observers.remove(id);
      drop(state);
      drop(removed);
    }
  }
}
