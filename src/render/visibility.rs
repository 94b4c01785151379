//! Visibility registry.
//!
//! The set of render objects the renderer considers for drawing. Processors
//! register and unregister objects from rayon workers, so every operation
//! takes a short `parking_lot::Mutex` lock. Set semantics make duplicate adds
//! and removals of absent objects no-ops, which keeps reconciliation code free
//! of membership bookkeeping.

use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::scene::EntityHandle;

/// Identity of one registered render object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderObjectId(u64);

static NEXT_RENDER_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

impl RenderObjectId {
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_RENDER_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

bitflags! {
    /// Set of render groups a view draws.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct RenderGroupMask: u32 {
        const GROUP_0 = 1 << 0;
        const GROUP_1 = 1 << 1;
        const GROUP_2 = 1 << 2;
        const GROUP_3 = 1 << 3;
        const ALL = u32::MAX;
    }
}

/// One of 32 render groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RenderGroup(u8);

impl RenderGroup {
    /// Clamped to the 32 available groups.
    #[must_use]
    pub fn new(index: u8) -> Self {
        Self(index.min(31))
    }

    #[inline]
    #[must_use]
    pub fn index(self) -> u8 {
        self.0
    }

    #[inline]
    #[must_use]
    pub fn mask(self) -> RenderGroupMask {
        RenderGroupMask::from_bits_retain(1 << self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderObjectKind {
    Mesh,
    Sprite,
}

/// Registry entry. Copies of the render-relevant identity of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleObject {
    pub id: RenderObjectId,
    pub entity: EntityHandle,
    pub kind: RenderObjectKind,
    pub render_group: RenderGroup,
}

#[derive(Default)]
struct RegistryInner {
    objects: Vec<VisibleObject>,
    /// id -> position in `objects`
    index: FxHashMap<RenderObjectId, usize>,
}

impl RegistryInner {
    fn insert(&mut self, object: VisibleObject) -> bool {
        if self.index.contains_key(&object.id) {
            return false;
        }
        self.index.insert(object.id, self.objects.len());
        self.objects.push(object);
        true
    }

    fn remove(&mut self, id: RenderObjectId) -> bool {
        let Some(pos) = self.index.remove(&id) else {
            return false;
        };
        self.objects.swap_remove(pos);
        if let Some(moved) = self.objects.get(pos) {
            self.index.insert(moved.id, pos);
        }
        true
    }
}

/// Thread-safe set of visible objects.
#[derive(Default)]
pub struct VisibilityRegistry {
    inner: Mutex<RegistryInner>,
}

impl VisibilityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the object was already registered.
    pub fn add(&self, object: VisibleObject) -> bool {
        self.inner.lock().insert(object)
    }

    /// Returns `false` if the object was not registered.
    pub fn remove(&self, id: RenderObjectId) -> bool {
        self.inner.lock().remove(id)
    }

    /// Adds a group of objects under one lock. Returns how many were new.
    pub fn add_many(&self, objects: impl IntoIterator<Item = VisibleObject>) -> usize {
        let mut inner = self.inner.lock();
        objects.into_iter().filter(|o| inner.insert(*o)).count()
    }

    /// Removes a group of objects under one lock. Returns how many were present.
    pub fn remove_many(&self, ids: impl IntoIterator<Item = RenderObjectId>) -> usize {
        let mut inner = self.inner.lock();
        ids.into_iter().filter(|id| inner.remove(*id)).count()
    }

    /// Updates the render group of a registered object.
    pub fn set_render_group(&self, id: RenderObjectId, group: RenderGroup) -> bool {
        let mut inner = self.inner.lock();
        let Some(&pos) = inner.index.get(&id) else {
            return false;
        };
        inner.objects[pos].render_group = group;
        true
    }

    #[must_use]
    pub fn contains(&self, id: RenderObjectId) -> bool {
        self.inner.lock().index.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current set. Order is unspecified.
    #[must_use]
    pub fn snapshot(&self) -> Vec<VisibleObject> {
        self.inner.lock().objects.clone()
    }

    /// Objects visible to a view drawing `mask`.
    #[must_use]
    pub fn collect_visible(&self, mask: RenderGroupMask) -> Vec<VisibleObject> {
        self.inner
            .lock()
            .objects
            .iter()
            .filter(|o| mask.intersects(o.render_group.mask()))
            .copied()
            .collect()
    }

    #[must_use]
    pub fn count_for_entity(&self, entity: EntityHandle) -> usize {
        self.inner
            .lock()
            .objects
            .iter()
            .filter(|o| o.entity == entity)
            .count()
    }
}
