//! Ordered set with change notifications.
//!
//! Used for transform children: every insertion and removal is recorded so the
//! owning scene can publish hierarchy events and invalidate cached traversal
//! orders without overriding collection primitives.

use smallvec::SmallVec;

/// A single recorded mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionChange<T> {
    Added(T),
    Removed(T),
}

/// Insertion-ordered set that records every change until drained.
///
/// Membership is checked linearly; child lists are short.
#[derive(Debug, Clone)]
pub struct ObservableSet<T: Copy + Eq> {
    items: SmallVec<[T; 4]>,
    changes: Vec<CollectionChange<T>>,
}

impl<T: Copy + Eq> Default for ObservableSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Eq> ObservableSet<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: SmallVec::new(),
            changes: Vec::new(),
        }
    }

    /// Appends `item` if absent. Returns `false` when it was already present.
    pub fn insert(&mut self, item: T) -> bool {
        if self.contains(item) {
            return false;
        }
        self.items.push(item);
        self.changes.push(CollectionChange::Added(item));
        true
    }

    /// Removes `item`, keeping the relative order of the rest.
    pub fn remove(&mut self, item: T) -> bool {
        let Some(pos) = self.items.iter().position(|&x| x == item) else {
            return false;
        };
        self.items.remove(pos);
        self.changes.push(CollectionChange::Removed(item));
        true
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, item: T) -> bool {
        self.items.contains(&item)
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.items.iter().copied()
    }

    /// Returns `true` if there are changes that have not been drained yet.
    #[inline]
    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Takes every change recorded since the last drain, oldest first.
    pub fn drain_changes(&mut self) -> impl Iterator<Item = CollectionChange<T>> + '_ {
        self.changes.drain(..)
    }
}
