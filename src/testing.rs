//! Recording observers for tests.
//!
//! [`TestMaybeObserver`] and [`TestFlowObserver`] record every signal they
//! receive. Clones share the same record, so a test keeps one clone for its
//! assertions and hands the other to the source.

use std::{fmt::Debug, sync::Arc, time::Duration};

use parking_lot::{Condvar, Mutex};

use crate::{
  error::MaybeError,
  observer::{FlowObserver, MaybeObserver},
  subscription::{Subscription, SubscriptionHandle},
};

enum Terminal<Item> {
  Success(Item),
  Error(MaybeError),
  Complete,
}

struct Record<Item> {
  subscription: Option<SubscriptionHandle>,
  /// Set by `dispose`; a handle arriving afterwards is released at once.
  disposed: bool,
  subscribe_calls: usize,
  values: Vec<Item>,
  terminal: Option<Terminal<Item>>,
  terminal_calls: usize,
}

struct Shared<Item> {
  record: Mutex<Record<Item>>,
  terminated: Condvar,
}

impl<Item> Shared<Item> {
  fn new() -> Arc<Self> {
    Arc::new(Shared {
      record: Mutex::new(Record {
        subscription: None,
        disposed: false,
        subscribe_calls: 0,
        values: Vec::new(),
        terminal: None,
        terminal_calls: 0,
      }),
      terminated: Condvar::new(),
    })
  }

  fn subscribe(&self, subscription: SubscriptionHandle) {
    let disposed = {
      let mut record = self.record.lock();
      record.subscribe_calls += 1;
      record.subscription = Some(subscription.clone());
      record.disposed
    };
    if disposed {
      subscription.unsubscribe();
    }
  }

  fn terminate(&self, terminal: Terminal<Item>) {
    let mut record = self.record.lock();
    record.terminal_calls += 1;
    if record.terminal.is_none() {
      record.terminal = Some(terminal);
    }
    self.terminated.notify_all();
  }

  fn dispose(&self) {
    let subscription = {
      let mut record = self.record.lock();
      record.disposed = true;
      record.subscription.clone()
    };
    if let Some(subscription) = subscription {
      subscription.unsubscribe();
    }
  }

  fn await_terminal(&self, timeout: Duration) -> bool {
    let mut record = self.record.lock();
    if record.terminal.is_none() {
      let _ = self
        .terminated
        .wait_while_for(&mut record, |r| r.terminal.is_none(), timeout);
    }
    record.terminal.is_some()
  }

  fn describe(&self) -> String
  where
    Item: Debug,
  {
    match &self.record.lock().terminal {
      None => "no terminal signal".to_owned(),
      Some(Terminal::Success(v)) => format!("success({v:?})"),
      Some(Terminal::Error(e)) => format!("error({e})"),
      Some(Terminal::Complete) => "complete".to_owned(),
    }
  }
}

// ============================================================================
// TestMaybeObserver
// ============================================================================

/// Records the signals of one Maybe subscription.
pub struct TestMaybeObserver<Item>(Arc<Shared<Item>>);

impl<Item> Clone for TestMaybeObserver<Item> {
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<Item> Default for TestMaybeObserver<Item> {
  fn default() -> Self { Self(Shared::new()) }
}

impl<Item: Send> MaybeObserver<Item> for TestMaybeObserver<Item> {
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) { self.0.subscribe(subscription) }

  fn on_success(self, value: Item) { self.0.terminate(Terminal::Success(value)) }

  fn on_error(self, err: MaybeError) { self.0.terminate(Terminal::Error(err)) }

  fn on_complete(self) { self.0.terminate(Terminal::Complete) }
}

impl<Item> TestMaybeObserver<Item> {
  pub fn new() -> Self { Self::default() }

  /// Unsubscribe the handle received through `on_subscribe`; a handle that
  /// arrives later is unsubscribed as soon as it does.
  pub fn dispose(&self) { self.0.dispose() }

  /// Whether the received handle reports closed.
  pub fn is_disposed(&self) -> bool {
    self
      .0
      .record
      .lock()
      .subscription
      .as_ref()
      .map_or(false, Subscription::is_closed)
  }

  pub fn subscribe_calls(&self) -> usize { self.0.record.lock().subscribe_calls }

  /// How many terminal callbacks arrived in total.
  pub fn terminal_calls(&self) -> usize { self.0.record.lock().terminal_calls }

  pub fn is_terminated(&self) -> bool { self.0.record.lock().terminal.is_some() }

  pub fn error(&self) -> Option<MaybeError> {
    match &self.0.record.lock().terminal {
      Some(Terminal::Error(e)) => Some(e.clone()),
      _ => None,
    }
  }

  /// Block until a terminal signal arrives or `timeout` elapses.
  pub fn await_terminal(&self, timeout: Duration) -> bool { self.0.await_terminal(timeout) }

  pub fn assert_not_terminated(&self)
  where
    Item: Debug,
  {
    assert!(!self.is_terminated(), "expected no terminal signal, got {}", self.0.describe());
  }

  pub fn assert_empty(&self)
  where
    Item: Debug,
  {
    let ok = matches!(self.0.record.lock().terminal, Some(Terminal::Complete));
    assert!(ok, "expected complete, got {}", self.0.describe());
    self.assert_single_terminal();
  }

  pub fn assert_error_message(&self, message: &str)
  where
    Item: Debug,
  {
    let actual = self.error().map(|e| e.to_string());
    assert_eq!(actual.as_deref(), Some(message), "got {}", self.0.describe());
    self.assert_single_terminal();
  }

  /// Assert an error arrived and hand it to `check`.
  pub fn assert_error_with(&self, check: impl FnOnce(&MaybeError))
  where
    Item: Debug,
  {
    match self.error() {
      Some(err) => check(&err),
      None => panic!("expected an error, got {}", self.0.describe()),
    }
    self.assert_single_terminal();
  }

  fn assert_single_terminal(&self) {
    let calls = self.terminal_calls();
    assert_eq!(calls, 1, "expected exactly one terminal signal, got {calls}");
  }
}

impl<Item: Clone> TestMaybeObserver<Item> {
  pub fn value(&self) -> Option<Item> {
    match &self.0.record.lock().terminal {
      Some(Terminal::Success(v)) => Some(v.clone()),
      _ => None,
    }
  }
}

impl<Item: Clone + Debug + PartialEq> TestMaybeObserver<Item> {
  pub fn assert_value(&self, expected: Item) {
    assert_eq!(self.value(), Some(expected), "got {}", self.0.describe());
    self.assert_single_terminal();
  }
}

// ============================================================================
// TestFlowObserver
// ============================================================================

/// Records the items and terminal signal of one flow subscription.
pub struct TestFlowObserver<Item>(Arc<Shared<Item>>);

impl<Item> Clone for TestFlowObserver<Item> {
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<Item> Default for TestFlowObserver<Item> {
  fn default() -> Self { Self(Shared::new()) }
}

impl<Item: Send> FlowObserver<Item> for TestFlowObserver<Item> {
  fn on_subscribe(&mut self, subscription: SubscriptionHandle) { self.0.subscribe(subscription) }

  fn on_next(&mut self, value: Item) {
    let mut record = self.0.record.lock();
    assert!(record.terminal.is_none(), "item received after the terminal signal");
    record.values.push(value);
  }

  fn on_error(self, err: MaybeError) { self.0.terminate(Terminal::Error(err)) }

  fn on_complete(self) { self.0.terminate(Terminal::Complete) }
}

impl<Item> TestFlowObserver<Item> {
  pub fn new() -> Self { Self::default() }

  pub fn dispose(&self) { self.0.dispose() }

  pub fn is_terminated(&self) -> bool { self.0.record.lock().terminal.is_some() }

  pub fn is_completed(&self) -> bool {
    matches!(self.0.record.lock().terminal, Some(Terminal::Complete))
  }

  pub fn terminal_calls(&self) -> usize { self.0.record.lock().terminal_calls }

  pub fn value_count(&self) -> usize { self.0.record.lock().values.len() }

  pub fn error(&self) -> Option<MaybeError> {
    match &self.0.record.lock().terminal {
      Some(Terminal::Error(e)) => Some(e.clone()),
      _ => None,
    }
  }

  pub fn await_terminal(&self, timeout: Duration) -> bool { self.0.await_terminal(timeout) }

  pub fn assert_not_terminated(&self)
  where
    Item: Debug,
  {
    assert!(!self.is_terminated(), "expected no terminal signal, got {}", self.0.describe());
  }

  pub fn assert_completed(&self)
  where
    Item: Debug,
  {
    assert!(self.is_completed(), "expected complete, got {}", self.0.describe());
    assert_eq!(self.terminal_calls(), 1);
  }

  pub fn assert_error_message(&self, message: &str)
  where
    Item: Debug,
  {
    let actual = self.error().map(|e| e.to_string());
    assert_eq!(actual.as_deref(), Some(message), "got {}", self.0.describe());
    assert_eq!(self.terminal_calls(), 1);
  }

  pub fn assert_error_with(&self, check: impl FnOnce(&MaybeError))
  where
    Item: Debug,
  {
    match self.error() {
      Some(err) => check(&err),
      None => panic!("expected an error, got {}", self.0.describe()),
    }
    assert_eq!(self.terminal_calls(), 1);
  }
}

impl<Item: Clone> TestFlowObserver<Item> {
  pub fn values(&self) -> Vec<Item> { self.0.record.lock().values.clone() }
}

impl<Item: Clone + Debug + PartialEq> TestFlowObserver<Item> {
  pub fn assert_values(&self, expected: &[Item]) { assert_eq!(self.values(), expected); }
}
