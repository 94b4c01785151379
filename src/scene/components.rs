//! Entity components.
//!
//! Every component kind lives in its own sparse table on the [`Scene`], keyed
//! by [`EntityHandle`]. Adding or removing a component is recorded in the
//! scene's change journal, which the render processors consume at the start of
//! each frame.

use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec2;
use rustc_hash::FxHashMap;
use slotmap::SparseSecondaryMap;

use crate::assets::{MaterialHandle, ModelHandle};
use crate::physics::RigidBodyComponent;
use crate::render::visibility::RenderGroup;
use crate::scene::skeleton::SkeletonInstance;
use crate::scene::{EntityHandle, Scene};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Transform,
    Model,
    Sprite,
    RigidBody,
}

/// Identity of one component instance.
///
/// Replacing a component with a new value yields a new id even though the
/// entity and kind are unchanged; association tables compare ids to detect it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

static NEXT_COMPONENT_ID: AtomicU64 = AtomicU64::new(1);

impl ComponentId {
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_COMPONENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Removed,
}

/// One entry of the scene's component journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentChange {
    pub entity: EntityHandle,
    pub kind: ComponentKind,
    pub change: ChangeKind,
}

/// A component stored in one of the scene's sparse tables.
pub trait Component: Send + Sync + Sized + 'static {
    const KIND: ComponentKind;

    /// Components that must be present on the entity before a processor
    /// associates this one.
    const DEPENDENCIES: &'static [ComponentKind] = &[ComponentKind::Transform];

    fn id(&self) -> ComponentId;

    fn storage(scene: &Scene) -> &SparseSecondaryMap<EntityHandle, Self>;

    fn storage_mut(scene: &mut Scene) -> &mut SparseSecondaryMap<EntityHandle, Self>;
}

// ============================================================================
// ModelComponent
// ============================================================================

/// Places a model asset on an entity.
#[derive(Debug, Clone)]
pub struct ModelComponent {
    id: ComponentId,

    pub model: Option<ModelHandle>,
    pub enabled: bool,
    pub render_group: RenderGroup,
    pub is_shadow_caster: bool,

    /// Per model-material-index overrides.
    pub materials: FxHashMap<usize, MaterialHandle>,

    pub distance_sort_fudge: Option<f32>,
    pub small_object_culling_multiplier: Option<f32>,

    pub(crate) skeleton: Option<SkeletonInstance>,
}

impl ModelComponent {
    #[must_use]
    pub fn new(model: ModelHandle) -> Self {
        Self {
            model: Some(model),
            ..Self::empty()
        }
    }

    /// Component with no model assigned yet.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            id: ComponentId::next(),
            model: None,
            enabled: true,
            render_group: RenderGroup::default(),
            is_shadow_caster: true,
            materials: FxHashMap::default(),
            distance_sort_fudge: None,
            small_object_culling_multiplier: None,
            skeleton: None,
        }
    }

    pub fn set_material_override(&mut self, index: usize, material: Option<MaterialHandle>) {
        match material {
            Some(m) => {
                self.materials.insert(index, m);
            }
            None => {
                self.materials.remove(&index);
            }
        }
    }

    /// Skeleton instance built from the current model, if the model has one.
    #[inline]
    #[must_use]
    pub fn skeleton(&self) -> Option<&SkeletonInstance> {
        self.skeleton.as_ref()
    }

    #[inline]
    pub fn skeleton_mut(&mut self) -> Option<&mut SkeletonInstance> {
        self.skeleton.as_mut()
    }
}

impl Default for ModelComponent {
    fn default() -> Self {
        Self::empty()
    }
}

impl Component for ModelComponent {
    const KIND: ComponentKind = ComponentKind::Model;

    fn id(&self) -> ComponentId {
        self.id
    }

    fn storage(scene: &Scene) -> &SparseSecondaryMap<EntityHandle, Self> {
        &scene.models
    }

    fn storage_mut(scene: &mut Scene) -> &mut SparseSecondaryMap<EntityHandle, Self> {
        &mut scene.models
    }
}

// ============================================================================
// SpriteComponent
// ============================================================================

/// Camera-facing quad.
#[derive(Debug, Clone)]
pub struct SpriteComponent {
    id: ComponentId,

    pub enabled: bool,
    pub render_group: RenderGroup,
    /// Quad size in local units.
    pub size: Vec2,
    pub material: Option<MaterialHandle>,
}

impl SpriteComponent {
    #[must_use]
    pub fn new(size: Vec2) -> Self {
        Self {
            id: ComponentId::next(),
            enabled: true,
            render_group: RenderGroup::default(),
            size,
            material: None,
        }
    }
}

impl Component for SpriteComponent {
    const KIND: ComponentKind = ComponentKind::Sprite;

    fn id(&self) -> ComponentId {
        self.id
    }

    fn storage(scene: &Scene) -> &SparseSecondaryMap<EntityHandle, Self> {
        &scene.sprites
    }

    fn storage_mut(scene: &mut Scene) -> &mut SparseSecondaryMap<EntityHandle, Self> {
        &mut scene.sprites
    }
}

impl Component for RigidBodyComponent {
    const KIND: ComponentKind = ComponentKind::RigidBody;

    fn id(&self) -> ComponentId {
        self.id
    }

    fn storage(scene: &Scene) -> &SparseSecondaryMap<EntityHandle, Self> {
        &scene.bodies
    }

    fn storage_mut(scene: &mut Scene) -> &mut SparseSecondaryMap<EntityHandle, Self> {
        &mut scene.bodies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_ids_are_unique() {
        let a = ModelComponent::empty();
        let b = ModelComponent::empty();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn clone_keeps_identity() {
        let a = SpriteComponent::new(Vec2::ONE);
        let b = a.clone();
        assert_eq!(a.id(), b.id());
    }
}
