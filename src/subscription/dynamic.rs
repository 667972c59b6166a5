use smallvec::SmallVec;

use super::Subscription;

/// ID-keyed storage for a changing set of entries.
///
/// Used wherever entries come and go independently of each other: the inner
/// subscriptions tracked by a coordinator, or the observers of a subject.
///
/// # Design
///
/// - **SmallVec Optimization**: Uses `SmallVec<[_; 2]>` to avoid heap
///   allocation for the common case of 0-2 entries.
/// - **Pre-allocation Pattern**: `reserve_id()` + `insert()` hands out the ID
///   before the entry exists, which is what an inner observer needs to remove
///   itself later.
///
/// # Examples
///
/// ```rust
/// use rxmaybe::subscription::DynamicSubscriptions;
///
/// let mut subs: DynamicSubscriptions<&str> = DynamicSubscriptions::default();
///
/// let first = subs.add("first");
/// let second = subs.reserve_id();
/// subs.insert(second, "second");
/// assert_eq!(subs.len(), 2);
///
/// assert_eq!(subs.remove(first), Some("first"));
/// assert_eq!(subs.len(), 1);
/// ```
pub struct DynamicSubscriptions<U> {
  next_id: usize,
  items: SmallVec<[(usize, U); 2]>,
}

impl<U> Default for DynamicSubscriptions<U> {
  fn default() -> Self { Self { next_id: 0, items: SmallVec::new() } }
}

impl<U> DynamicSubscriptions<U> {
  #[inline]
  pub fn new() -> Self { Self::default() }

  /// Add an entry and return its unique ID.
  #[inline]
  pub fn add(&mut self, item: U) -> usize {
    let id = self.reserve_id();
    self.items.push((id, item));
    id
  }

  /// Reserve the next ID without adding an entry.
  #[inline]
  pub fn reserve_id(&mut self) -> usize {
    let id = self.next_id;
    self.next_id += 1;
    id
  }

  /// Insert an entry under an ID obtained from `reserve_id()`.
  #[inline]
  pub fn insert(&mut self, id: usize, item: U) { self.items.push((id, item)); }

  pub fn remove(&mut self, id: usize) -> Option<U> {
    self
      .items
      .iter()
      .position(|(i, _)| *i == id)
      .map(|pos| self.items.remove(pos).1)
  }

  #[inline]
  pub fn contains(&self, id: usize) -> bool { self.items.iter().any(|(i, _)| *i == id) }

  #[inline]
  pub fn len(&self) -> usize { self.items.len() }

  #[inline]
  pub fn is_empty(&self) -> bool { self.items.is_empty() }

  /// Remove every entry, handing them out in insertion order.
  #[inline]
  pub fn take_all(&mut self) -> SmallVec<[U; 2]> {
    self.items.drain(..).map(|(_, item)| item).collect()
  }

  #[inline]
  pub fn iter(&self) -> impl Iterator<Item = &U> { self.items.iter().map(|(_, item)| item) }
}

impl<U: Subscription> DynamicSubscriptions<U> {
  pub fn all_closed(&self) -> bool { self.items.iter().all(|(_, item)| item.is_closed()) }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::subscription::SubscriptionHandle;

  #[rxmaybe_macro::test]
  fn ids_are_not_reused() {
    let mut subs = DynamicSubscriptions::new();
    let a = subs.add(1);
    subs.remove(a);
    let b = subs.add(2);
    assert_ne!(a, b);
    assert!(subs.contains(b));
    assert!(!subs.contains(a));
  }

  #[rxmaybe_macro::test]
  fn take_all_preserves_order() {
    let mut subs = DynamicSubscriptions::new();
    subs.add('a');
    subs.add('b');
    subs.add('c');
    assert_eq!(subs.take_all().as_slice(), &['a', 'b', 'c']);
    assert!(subs.is_empty());
  }

  #[rxmaybe_macro::test]
  fn all_closed_checks_every_entry() {
    let mut subs = DynamicSubscriptions::new();
    let a = SubscriptionHandle::flag();
    subs.add(a.clone());
    subs.add(SubscriptionHandle::closed());
    assert!(!subs.all_closed());
    a.unsubscribe();
    assert!(subs.all_closed());
  }
}
