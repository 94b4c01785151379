use parking_lot::RwLock;
use slotmap::{Key, SlotMap};
use std::sync::Arc;

/// Thread-safe asset container.
///
/// Assets are shared as `Arc<T>`. Replacing an asset swaps the `Arc` behind
/// the handle, so holders can detect a reload by comparing pointers.
pub struct AssetStorage<H: Key, T> {
    map: RwLock<SlotMap<H, Arc<T>>>,
}

impl<H: Key, T> Default for AssetStorage<H, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Key, T> AssetStorage<H, T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: RwLock::new(SlotMap::with_key()),
        }
    }

    /// [Write] Adds a resource and returns a Handle.
    pub fn add(&self, asset: impl Into<T>) -> H {
        self.map.write().insert(Arc::new(asset.into()))
    }

    /// [Write] Swaps in a new version of an asset (a reload).
    ///
    /// Returns the previous version, or `None` if the handle is stale.
    pub fn replace(&self, handle: H, asset: impl Into<T>) -> Option<Arc<T>> {
        let mut guard = self.map.write();
        let slot = guard.get_mut(handle)?;
        Some(std::mem::replace(slot, Arc::new(asset.into())))
    }

    /// [Write] Edits an asset copy-on-write and publishes the result as a new version.
    pub fn modify(&self, handle: H, f: impl FnOnce(&mut T)) -> bool
    where
        T: Clone,
    {
        let mut guard = self.map.write();
        let Some(slot) = guard.get_mut(handle) else {
            return false;
        };
        let mut next = T::clone(slot);
        f(&mut next);
        *slot = Arc::new(next);
        true
    }

    /// [Write] Removes an asset. Outstanding `Arc`s stay valid.
    pub fn remove(&self, handle: H) -> Option<Arc<T>> {
        self.map.write().remove(handle)
    }

    /// [Read] Gets a single resource.
    pub fn get(&self, handle: H) -> Option<Arc<T>> {
        self.map.read().get(handle).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
